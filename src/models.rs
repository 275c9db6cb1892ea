use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Which operation an attempt is working toward. Stored in the attempt
/// record so a resumed launch can tell whether the persisted progress still
/// applies to the work being started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    LauncherUpdate,
    GameDownload,
    GameUpdate,
}

impl OperationKind {
    pub fn display_label(&self) -> &'static str {
        match self {
            OperationKind::LauncherUpdate => "Update Launcher",
            OperationKind::GameDownload => "Download",
            OperationKind::GameUpdate => "Update",
        }
    }
}

/// One in-progress download/update toward a specific target version.
///
/// `downloaded_files` plus the byte credit in `completed_progress` are the
/// resumption checkpoints: a file listed here is never fetched again within
/// the same attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub partial_download: bool,
    pub attempt_version: u32,
    pub attempt_kind: Option<OperationKind>,
    pub total_filesize: u64,
    pub completed_progress: f64,
    pub downloaded_files: HashSet<String>,
}

impl Default for AttemptRecord {
    fn default() -> Self {
        Self {
            partial_download: false,
            attempt_version: 0,
            attempt_kind: None,
            total_filesize: 0,
            completed_progress: 0.0,
            downloaded_files: HashSet::new(),
        }
    }
}

impl AttemptRecord {
    pub fn fresh(version: u32, kind: OperationKind) -> Self {
        Self {
            partial_download: true,
            attempt_version: version,
            attempt_kind: Some(kind),
            total_filesize: 0,
            completed_progress: 0.0,
            downloaded_files: HashSet::new(),
        }
    }

    /// A persisted attempt is only worth resuming when it was interrupted
    /// mid-download AND still targets the same version and operation.
    pub fn is_resumable(&self, target_version: u32, kind: OperationKind) -> bool {
        self.partial_download
            && self.attempt_version == target_version
            && self.attempt_kind == Some(kind)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateState {
    pub installed_launcher_version: u32,
    pub installed_content_version: u32,
    pub initial_download_complete: bool,
    #[serde(default)]
    pub attempt: AttemptRecord,
    #[serde(default)]
    pub updated_at: i64,
}

impl Default for UpdateState {
    fn default() -> Self {
        Self {
            installed_launcher_version: 1,
            installed_content_version: 0,
            initial_download_complete: false,
            attempt: AttemptRecord::default(),
            updated_at: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_attempt_is_not_resumable() {
        let attempt = AttemptRecord {
            partial_download: true,
            attempt_version: 5,
            attempt_kind: Some(OperationKind::GameUpdate),
            ..AttemptRecord::default()
        };

        assert!(attempt.is_resumable(5, OperationKind::GameUpdate));
        assert!(!attempt.is_resumable(6, OperationKind::GameUpdate));
        assert!(!attempt.is_resumable(5, OperationKind::GameDownload));
    }

    #[test]
    fn completed_attempt_is_not_resumable() {
        let attempt = AttemptRecord {
            partial_download: false,
            attempt_version: 5,
            attempt_kind: Some(OperationKind::GameUpdate),
            ..AttemptRecord::default()
        };
        assert!(!attempt.is_resumable(5, OperationKind::GameUpdate));
    }

    #[test]
    fn fresh_attempt_starts_empty() {
        let attempt = AttemptRecord::fresh(6, OperationKind::GameDownload);
        assert!(attempt.partial_download);
        assert_eq!(attempt.attempt_version, 6);
        assert_eq!(attempt.total_filesize, 0);
        assert_eq!(attempt.completed_progress, 0.0);
        assert!(attempt.downloaded_files.is_empty());
    }
}
