//! Bounded photo attachment collection with live previews.
//!
//! Previews are derived resources scoped to their attachment's
//! lifetime; they are released on removal and when the draft is
//! cleared, so a long editing session cannot accumulate them without
//! bound.

use std::collections::HashMap;

use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

use crate::report::{AttachmentRef, MAX_ATTACHMENTS, ReportDraft};

/// Longest edge of a generated preview thumbnail, in pixels.
const PREVIEW_MAX_DIM: u32 = 160;

/// JPEG quality of preview thumbnails.
const PREVIEW_JPEG_QUALITY: u8 = 70;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttachmentError {
    /// Adding the batch would push the count past the cap. Existing
    /// attachments are left untouched.
    #[error("at most {MAX_ATTACHMENTS} photos may be attached ({current} present, {requested} more requested)")]
    TooManyAttachments { current: usize, requested: usize },

    #[error("attachment index {0} out of bounds")]
    IndexOutOfBounds(usize),

    #[error("could not decode image: {0}")]
    InvalidImage(String),
}

/// Opaque handle to a preview owned by the manager's preview store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewHandle(u64);

/// A newly selected file, before it becomes an [`AttachmentRef`].
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Bounded collection of photo attachments with preview thumbnails.
#[derive(Default)]
pub struct AttachmentManager {
    previews: HashMap<PreviewHandle, Vec<u8>>,
    next_handle: u64,
}

impl AttachmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly selected files to the draft's attachment sequence.
    ///
    /// The whole batch is rejected with `TooManyAttachments` when the
    /// combined count would exceed the cap, and with `InvalidImage`
    /// when any file fails to decode; in both cases the existing
    /// sequence is untouched.
    pub fn add(
        &mut self,
        draft: &mut ReportDraft,
        files: Vec<NewAttachment>,
    ) -> Result<(), AttachmentError> {
        if files.is_empty() {
            return Ok(());
        }
        let current = draft.attachments.len();
        if current + files.len() > MAX_ATTACHMENTS {
            return Err(AttachmentError::TooManyAttachments {
                current,
                requested: files.len(),
            });
        }

        // Decode every file before mutating the draft.
        let mut prepared = Vec::with_capacity(files.len());
        for file in files {
            let thumbnail = make_thumbnail(&file.bytes)?;
            prepared.push((file, thumbnail));
        }

        for (file, thumbnail) in prepared {
            let preview = self.register_preview(thumbnail);
            draft.attachments.push(AttachmentRef {
                file_name: file.file_name,
                content_type: file.content_type,
                bytes: file.bytes,
                preview: Some(preview),
            });
        }
        tracing::debug!(count = draft.attachments.len(), "attachments updated");
        Ok(())
    }

    /// Remove one attachment by position, releasing its preview. The
    /// remaining attachments stay contiguously indexed.
    pub fn remove(
        &mut self,
        draft: &mut ReportDraft,
        index: usize,
    ) -> Result<AttachmentRef, AttachmentError> {
        if index >= draft.attachments.len() {
            return Err(AttachmentError::IndexOutOfBounds(index));
        }
        let removed = draft.attachments.remove(index);
        if let Some(handle) = removed.preview {
            self.previews.remove(&handle);
        }
        Ok(removed)
    }

    /// Release every preview held for the draft's attachments. Used
    /// when the draft is discarded after a confirmed submission.
    pub fn release_all(&mut self, draft: &mut ReportDraft) {
        for attachment in &mut draft.attachments {
            if let Some(handle) = attachment.preview.take() {
                self.previews.remove(&handle);
            }
        }
    }

    /// Regenerate previews for attachments restored from storage.
    ///
    /// An attachment whose bytes no longer decode keeps working
    /// without a preview rather than failing the restore.
    pub fn restore_previews(&mut self, draft: &mut ReportDraft) {
        for attachment in &mut draft.attachments {
            if attachment.preview.is_some() {
                continue;
            }
            match make_thumbnail(&attachment.bytes) {
                Ok(thumbnail) => attachment.preview = Some(self.register_preview(thumbnail)),
                Err(err) => {
                    tracing::warn!(file = %attachment.file_name, "no preview for restored attachment: {err}");
                }
            }
        }
    }

    /// Preview bytes for a handle, if it is still live.
    pub fn preview(&self, handle: PreviewHandle) -> Option<&[u8]> {
        self.previews.get(&handle).map(Vec::as_slice)
    }

    pub fn preview_count(&self) -> usize {
        self.previews.len()
    }

    fn register_preview(&mut self, thumbnail: Vec<u8>) -> PreviewHandle {
        let handle = PreviewHandle(self.next_handle);
        self.next_handle += 1;
        self.previews.insert(handle, thumbnail);
        handle
    }
}

/// Decode, bound to `PREVIEW_MAX_DIM`, re-encode as JPEG.
fn make_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, AttachmentError> {
    let img = image::load_from_memory(bytes)
        .map_err(|err| AttachmentError::InvalidImage(err.to_string()))?;
    let thumbnail = img.thumbnail(PREVIEW_MAX_DIM, PREVIEW_MAX_DIM).to_rgb8();
    let mut out = Vec::new();
    thumbnail
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, PREVIEW_JPEG_QUALITY))
        .map_err(|err| AttachmentError::InvalidImage(err.to_string()))?;
    Ok(out)
}
