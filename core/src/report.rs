//! The in-progress report document and its submission preconditions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attachments::PreviewHandle;

/// Required length of the taxpayer registration code.
pub const REGISTRATION_ID_LEN: usize = 13;

/// Maximum number of photo attachments per report.
pub const MAX_ATTACHMENTS: usize = 4;

/// One selected photo, exclusively owned by its draft.
///
/// The preview handle points into the attachment manager's preview
/// store; it is a derived resource and is not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_name: String,
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    #[serde(skip)]
    pub preview: Option<PreviewHandle>,
}

/// Mutable working document for one field report.
///
/// Created on first form entry (restored from durable storage when
/// present), mutated field-by-field, and cleared from storage only
/// after a confirmed successful submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub merchant_name: String,
    pub address: String,
    pub registration_id: String,
    pub findings: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

/// Why a draft does not meet the submission preconditions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DraftValidationError {
    #[error("required field is empty: {0}")]
    MissingField(&'static str),

    #[error("registration id must be exactly {REGISTRATION_ID_LEN} alphanumeric characters")]
    BadRegistrationId,
}

impl ReportDraft {
    pub fn is_empty(&self) -> bool {
        self.merchant_name.is_empty()
            && self.address.is_empty()
            && self.registration_id.is_empty()
            && self.findings.is_empty()
            && self.attachments.is_empty()
    }

    /// Check the submission preconditions: every text field filled in
    /// and the registration id well-formed.
    pub fn validate_for_submission(&self) -> Result<(), DraftValidationError> {
        if self.merchant_name.trim().is_empty() {
            return Err(DraftValidationError::MissingField("merchant_name"));
        }
        if self.address.trim().is_empty() {
            return Err(DraftValidationError::MissingField("address"));
        }
        if self.findings.trim().is_empty() {
            return Err(DraftValidationError::MissingField("findings"));
        }
        if !registration_id_is_valid(&self.registration_id) {
            return Err(DraftValidationError::BadRegistrationId);
        }
        Ok(())
    }
}

/// Exactly 13 ASCII alphanumeric characters.
pub fn registration_id_is_valid(id: &str) -> bool {
    id.len() == REGISTRATION_ID_LEN && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Photo bytes are persisted as base64 strings so the draft stays a
/// plain JSON document.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD.decode(raw.as_bytes()).map_err(serde::de::Error::custom)
    }
}
