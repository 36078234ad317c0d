//! JSON persistence for the loader state record.
//!
//! Other processes poll this file to learn whether the extension load has
//! been attempted and how it went, so the write must never expose a partial
//! record: the snapshot goes to a temp file first and is renamed over the
//! target. Persistence is fire-and-forget from the loader's point of view;
//! failures are logged here and never propagated.

use std::path::{Path, PathBuf};

use hidsys_core::LoaderState;
use thiserror::Error;
use tracing::warn;

use crate::application::extension_loader::StatusStore;

/// Error type for status-store writes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error writing state to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writes [`LoaderState`] snapshots to a well-known JSON file.
pub struct JsonStatusStore {
    path: PathBuf,
    file_mode: u32,
    dir_mode: u32,
}

impl JsonStatusStore {
    /// Default permission bits: world-readable file in a world-traversable
    /// directory, owner-writable only.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_mode: 0o644,
            dir_mode: 0o755,
        }
    }

    pub fn with_modes(path: impl Into<PathBuf>, file_mode: u32, dir_mode: u32) -> Self {
        Self {
            path: path.into(),
            file_mode,
            dir_mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_persist(&self, state: &LoaderState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            set_mode(dir, self.dir_mode);
        }

        let content = serde_json::to_vec_pretty(state)?;

        // Write-then-rename so a concurrent reader never sees a torn record.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &content).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        set_mode(&tmp, self.file_mode);
        std::fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

impl StatusStore for JsonStatusStore {
    fn persist(&self, state: &LoaderState) {
        if let Err(e) = self.try_persist(state) {
            warn!("failed to persist loader state: {e}");
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        warn!("failed to set permissions on {}: {e}", path.display());
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hidsys_core::StatusCode;

    fn temp_store() -> (JsonStatusStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "hidsysd_store_test_{}_{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let path = dir.join("loader_state.json");
        (JsonStatusStore::new(&path), dir)
    }

    #[test]
    fn test_persist_creates_directories_and_file() {
        let (store, dir) = temp_store();

        store.persist(&LoaderState::default());

        let content = std::fs::read_to_string(store.path()).expect("state file");
        let state: LoaderState = serde_json::from_str(&content).expect("parse");
        assert_eq!(state, LoaderState::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_persist_overwrites_previous_record() {
        let (store, dir) = temp_store();

        store.persist(&LoaderState::default());
        store.persist(&LoaderState {
            attempted: true,
            last_result: Some(StatusCode::SUCCESS),
        });

        let content = std::fs::read_to_string(store.path()).expect("state file");
        let state: LoaderState = serde_json::from_str(&content).expect("parse");
        assert!(state.attempted);
        assert!(state.is_loaded());

        // No leftover temp file after a completed write.
        assert!(!store.path().with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn test_persist_applies_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (store, dir) = temp_store();
        store.persist(&LoaderState::default());

        let mode = std::fs::metadata(store.path())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_persist_failure_is_swallowed() {
        // A path under a file (not a directory) cannot be created.
        let dir = std::env::temp_dir().join(format!("hidsysd_store_block_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, b"x").expect("write blocker");

        let store = JsonStatusStore::new(blocker.join("nested/state.json"));
        // Must not panic or propagate.
        store.persist(&LoaderState::default());

        std::fs::remove_dir_all(&dir).ok();
    }
}
