use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::errors::{Result, UpdaterError};
use crate::models::UpdateState;
use crate::utils::file::write_atomic;

/// Persistent record of installed versions and the in-flight attempt.
///
/// Every mutation writes the full record back to disk under one lock, so the
/// on-disk file always reflects a state the process actually reached. Workers
/// checkpoint through this after each completed file.
#[derive(Clone)]
pub struct StateStore {
    path: PathBuf,
    state: Arc<Mutex<UpdateState>>,
}

impl StateStore {
    /// Loads the saved record, falling back to a fresh default when the file
    /// is missing or unreadable. A corrupt record is logged and discarded
    /// rather than wedging the whole updater.
    pub fn load(path: PathBuf) -> Self {
        let state = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<UpdateState>(&bytes) {
                Ok(state) => state,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Discarding corrupt update state");
                    UpdateState::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => UpdateState::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Could not read update state");
                UpdateState::default()
            }
        };

        Self {
            path,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn snapshot(&self) -> UpdateState {
        self.state
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Applies `apply` and persists the result while still holding the lock,
    /// so concurrent checkpoints cannot interleave a stale write.
    pub fn mutate<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut UpdateState),
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| UpdaterError::StateCorrupt("state lock poisoned".to_string()))?;
        apply(&mut guard);
        guard.updated_at = chrono::Utc::now().timestamp();
        let serialized = serde_json::to_vec_pretty(&*guard)?;
        write_atomic(&self.path, &serialized)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptRecord, OperationKind};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_state_path() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("patchline-state-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp directory");
        dir.join("saved_data.json")
    }

    #[test]
    fn missing_file_yields_defaults() {
        let store = StateStore::load(temp_state_path());
        let state = store.snapshot();
        assert_eq!(state.installed_launcher_version, 1);
        assert_eq!(state.installed_content_version, 0);
        assert!(!state.initial_download_complete);
        assert!(!state.attempt.partial_download);
    }

    #[test]
    fn mutations_survive_a_reload() {
        let path = temp_state_path();
        let store = StateStore::load(path.clone());

        store
            .mutate(|state| {
                state.installed_content_version = 7;
                state.attempt = AttemptRecord::fresh(8, OperationKind::GameUpdate);
                state.attempt.downloaded_files.insert("a.pak".to_string());
            })
            .expect("persist mutation");

        let reloaded = StateStore::load(path).snapshot();
        assert_eq!(reloaded.installed_content_version, 7);
        assert_eq!(reloaded.attempt.attempt_version, 8);
        assert!(reloaded.attempt.downloaded_files.contains("a.pak"));
        assert!(reloaded.updated_at > 0);
    }

    #[test]
    fn version_commit_clears_the_partial_flag() {
        let path = temp_state_path();
        let store = StateStore::load(path.clone());

        store
            .mutate(|state| {
                state.attempt = AttemptRecord::fresh(6, OperationKind::GameDownload);
                state.attempt.downloaded_files.insert("a.pak".to_string());
                state.attempt.downloaded_files.insert("b.pak".to_string());
            })
            .expect("record downloads");
        store
            .mutate(|state| {
                state.installed_content_version = state.attempt.attempt_version;
                state.attempt.partial_download = false;
            })
            .expect("commit version");

        let reloaded = StateStore::load(path).snapshot();
        assert_eq!(reloaded.installed_content_version, 6);
        assert!(!reloaded.attempt.partial_download);
        assert!(!reloaded
            .attempt
            .is_resumable(6, OperationKind::GameDownload));
    }

    #[test]
    fn corrupt_file_is_discarded() {
        let path = temp_state_path();
        std::fs::write(&path, b"{ not json").expect("write corrupt record");

        let state = StateStore::load(path).snapshot();
        assert_eq!(state.installed_content_version, 0);
    }
}
