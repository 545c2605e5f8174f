//! Durable persistence for the in-progress report.
//!
//! The draft must survive navigation, reload, or crash without any
//! server round-trip. Loss of unsaved field work on a network failure
//! is the failure mode this module exists to prevent: the persisted
//! record is only ever cleared after a confirmed successful submission.
//!
//! Storage location: one JSON file per key under `$SIDAK_HOME`
//! (or `~/.sidak`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::report::ReportDraft;

/// Key under which the active report draft is stored.
pub const DRAFT_KEY: &str = "report_draft";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Synchronous durable key-value storage.
///
/// The persisted record is single-writer (the active form instance)
/// and safe to read concurrently by a reload.
pub trait DraftStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// File-backed storage: one `<key>.json` under the data directory.
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Storage under the default data directory (`$SIDAK_HOME` or
    /// `~/.sidak`).
    pub fn new() -> io::Result<Self> {
        Ok(Self::with_dir(default_data_home()?))
    }

    /// Storage under a custom directory.
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl DraftStorage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        fs::write(&path, value)?;

        // Reports can name taxpayers; keep the record user-only (Unix).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Makes a [`ReportDraft`] survive interruption.
pub struct DraftStore {
    storage: Arc<dyn DraftStorage>,
    key: String,
    last_saved: Mutex<Option<String>>,
}

impl DraftStore {
    pub fn new(storage: Arc<dyn DraftStorage>) -> Self {
        Self::with_key(storage, DRAFT_KEY)
    }

    pub fn with_key(storage: Arc<dyn DraftStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            last_saved: Mutex::new(None),
        }
    }

    /// The last persisted draft, or the empty default when none exists.
    ///
    /// A record that fails to parse is treated as "no draft", never as
    /// a fatal error.
    pub fn load(&self) -> ReportDraft {
        match self.storage.get(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(draft) => draft,
                Err(err) => {
                    tracing::warn!("discarding unparsable draft record: {err}");
                    ReportDraft::default()
                }
            },
            Ok(None) => ReportDraft::default(),
            Err(err) => {
                tracing::warn!("draft storage read failed: {err}");
                ReportDraft::default()
            }
        }
    }

    /// Persist the full draft; called on every field mutation.
    ///
    /// Saving identical content is a no-op.
    pub fn save(&self, draft: &ReportDraft) -> Result<(), StorageError> {
        let raw = serde_json::to_string(draft)?;
        let mut last = lock_or_recover(&self.last_saved);
        if last.as_deref() == Some(raw.as_str()) {
            return Ok(());
        }
        self.storage.set(&self.key, &raw)?;
        tracing::debug!(bytes = raw.len(), "draft saved");
        *last = Some(raw);
        Ok(())
    }

    /// Remove the persisted draft. Called only after the server has
    /// confirmed acceptance.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.delete(&self.key)?;
        tracing::debug!("draft cleared");
        *lock_or_recover(&self.last_saved) = None;
        Ok(())
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Data directory: `$SIDAK_HOME` when set, else `~/.sidak`.
fn default_data_home() -> io::Result<PathBuf> {
    if let Ok(home) = std::env::var("SIDAK_HOME") {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "could not determine home directory")
    })?;
    Ok(home.join(".sidak"))
}
