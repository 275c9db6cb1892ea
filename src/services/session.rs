use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::UpdaterConfig;
use crate::errors::{Result, UpdaterError};
use crate::models::{AttemptRecord, OperationKind, UpdateState};
use crate::services::archive::{download_archive, extract_archive};
use crate::services::control::ControlGate;
use crate::services::delta::{fresh_install_files, update_delta, without_downloaded};
use crate::services::progress::ProgressCounter;
use crate::services::state_store::StateStore;
use crate::services::transfer::FileTransfer;
use crate::services::version_directory::{VersionDirectoryClient, VersionManifest};

pub const PROBE_BUDGET: f64 = 2.0;
pub const ARCHIVE_BUDGET: f64 = 10.0;
const LAUNCHER_ARCHIVE_BUDGET: f64 = 90.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Ready,
    Resolving,
    Transferring,
    Finalizing,
    Done,
}

/// Picks the operation a session start should run, oldest obligation first:
/// the launcher updates itself before touching content, a missing install
/// downloads fresh, an outdated one patches, and a current one is ready.
pub fn choose_operation(manifest: &VersionManifest, state: &UpdateState) -> Option<OperationKind> {
    if manifest.launcher_version > state.installed_launcher_version {
        return Some(OperationKind::LauncherUpdate);
    }
    if !state.initial_download_complete || state.installed_content_version == 0 {
        return Some(OperationKind::GameDownload);
    }
    if manifest.latest_content_version > state.installed_content_version {
        return Some(OperationKind::GameUpdate);
    }
    None
}

/// One update session: owns the shared progress counter, the pause/cancel
/// gate, and the persisted state, and drives the phase machine from resolve
/// through commit. The presentation layer holds a clone and only ever reads
/// the surface methods at its own cadence.
#[derive(Clone)]
pub struct UpdateSession {
    config: UpdaterConfig,
    directory: VersionDirectoryClient,
    store: StateStore,
    transfer: FileTransfer,
    client: reqwest::Client,
    progress: ProgressCounter,
    gate: ControlGate,
    phase: Arc<Mutex<SessionPhase>>,
    operation: Arc<Mutex<Option<OperationKind>>>,
    failed: Arc<Mutex<Vec<String>>>,
}

impl UpdateSession {
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        let client = config.build_client()?;
        let directory = VersionDirectoryClient::new(client.clone(), config.manifest_url.clone());
        let store = StateStore::load(config.state_file());
        let progress = ProgressCounter::new();
        let transfer = FileTransfer::new(
            client.clone(),
            store.clone(),
            progress.clone(),
            config.worker_count,
        );

        Ok(Self {
            config,
            directory,
            store,
            transfer,
            client,
            progress,
            gate: ControlGate::new(),
            phase: Arc::new(Mutex::new(SessionPhase::Idle)),
            operation: Arc::new(Mutex::new(None)),
            failed: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub async fn fetch_manifest(&self) -> Result<VersionManifest> {
        self.directory.fetch_manifest().await
    }

    pub fn state(&self) -> UpdateState {
        self.store.snapshot()
    }

    // Presentation-facing surface.

    pub fn progress_percent(&self) -> f64 {
        self.progress.read().clamp(0.0, 100.0)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
            .lock()
            .map(|guard| *guard)
            .unwrap_or(SessionPhase::Idle)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase(), SessionPhase::Done | SessionPhase::Ready)
    }

    pub fn display_label(&self) -> &'static str {
        let operation = self.operation.lock().map(|guard| *guard).unwrap_or(None);
        match operation {
            Some(kind) => kind.display_label(),
            None => "Play",
        }
    }

    pub fn pause(&self) {
        self.gate.pause();
    }

    pub fn resume(&self) {
        self.gate.resume();
    }

    pub fn cancel(&self) {
        self.gate.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Files that failed during the last transfer pass. A non-empty list is
    /// why a session can sit below 100 without being paused.
    pub fn failed_files(&self) -> Vec<String> {
        self.failed
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Launches the operation on the runtime and returns its handle. The
    /// caller polls the surface methods while this runs.
    pub fn start(&self, manifest: VersionManifest, kind: OperationKind) -> JoinHandle<Result<()>> {
        let session = self.clone();
        tokio::spawn(async move { session.run(manifest, kind).await })
    }

    /// Marks the session ready without spawning workers; used when both the
    /// launcher and content are already current.
    pub fn mark_ready(&self) {
        self.set_phase(SessionPhase::Ready);
        self.progress.reset_to(100.0);
    }

    pub async fn run(&self, manifest: VersionManifest, kind: OperationKind) -> Result<()> {
        let attempt_id = Uuid::new_v4();
        self.set_operation(Some(kind));
        self.set_failed(Vec::new());
        self.gate.resume();
        self.set_phase(SessionPhase::Resolving);
        info!(%attempt_id, operation = kind.display_label(), "Starting operation");

        let outcome = match kind {
            OperationKind::LauncherUpdate => self.run_launcher_update(&manifest).await,
            OperationKind::GameDownload | OperationKind::GameUpdate => {
                self.run_content_operation(&manifest, kind).await
            }
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(UpdaterError::Cancelled) => {
                info!(%attempt_id, "Operation cancelled, checkpoints kept");
                self.set_phase(SessionPhase::Idle);
                Ok(())
            }
            Err(err) => {
                error!(%attempt_id, error = %err, "Operation failed");
                self.set_phase(SessionPhase::Idle);
                Err(err)
            }
        }
    }

    async fn run_launcher_update(&self, manifest: &VersionManifest) -> Result<()> {
        let target = manifest.launcher_version;
        self.prepare_attempt(target, OperationKind::LauncherUpdate)?;
        // The archive stream is not checkpointable, so the scale restarts
        // even when the attempt record was resumable.
        self.progress.reset_to(0.0);
        self.set_phase(SessionPhase::Transferring);

        let archive_path = self.config.data_dir.join("Launcher.zip");
        let mut control = self.gate.subscribe();
        download_archive(
            &self.client,
            &manifest.launcher_archive_url(),
            &archive_path,
            &mut control,
            &self.progress,
            LAUNCHER_ARCHIVE_BUDGET,
        )
        .await?;

        self.set_phase(SessionPhase::Finalizing);
        extract_archive(&archive_path, &self.config.launcher_dir).await?;
        let _ = tokio::fs::remove_file(&archive_path).await;

        self.store.mutate(|state| {
            state.installed_launcher_version = target;
            state.attempt.partial_download = false;
        })?;
        self.progress.reset_to(100.0);
        self.set_phase(SessionPhase::Done);
        info!(version = target, "Launcher update committed");
        Ok(())
    }

    async fn run_content_operation(
        &self,
        manifest: &VersionManifest,
        kind: OperationKind,
    ) -> Result<()> {
        let target = manifest.latest_content_version;
        let state = self.prepare_attempt(target, kind)?;
        let binaries_needed = kind == OperationKind::GameUpdate
            && state.installed_content_version < manifest.binaries_version;
        let needs_initial_archive =
            kind == OperationKind::GameDownload && !state.initial_download_complete;
        let has_archive_phase = binaries_needed || kind == OperationKind::GameDownload;
        let content_budget = 100.0
            - PROBE_BUDGET
            - if has_archive_phase {
                ARCHIVE_BUDGET
            } else {
                0.0
            };

        // Resumed attempts already paid for the probe and possibly the
        // initial archive; reseed the counter so display picks up where the
        // last run stopped.
        let attempt = state.attempt.clone();
        if attempt.total_filesize > 0 {
            let archive_credit = if kind == OperationKind::GameDownload
                && state.initial_download_complete
            {
                ARCHIVE_BUDGET
            } else {
                0.0
            };
            self.progress
                .reset_to(PROBE_BUDGET + archive_credit + attempt.completed_progress);
        } else {
            self.progress.reset_to(attempt.completed_progress);
        }

        let pending = {
            let all = if state.installed_content_version == 0
                || kind == OperationKind::GameDownload
            {
                fresh_install_files(manifest)
            } else {
                update_delta(manifest, state.installed_content_version)
            };
            without_downloaded(all, &attempt.downloaded_files)
        };
        info!(
            pending = pending.len(),
            already_done = attempt.downloaded_files.len(),
            target,
            "Resolved file delta"
        );

        self.set_phase(SessionPhase::Transferring);
        let control = self.gate.subscribe();

        let total_bytes = if attempt.total_filesize > 0 {
            attempt.total_filesize
        } else {
            let total = self
                .transfer
                .probe_total_size(manifest, &pending, &control, PROBE_BUDGET)
                .await?;
            self.store
                .mutate(|state| state.attempt.total_filesize = total)?;
            total
        };

        if needs_initial_archive {
            let archive_path = self.config.data_dir.join(&manifest.initial_archive_name);
            let mut archive_control = self.gate.subscribe();
            download_archive(
                &self.client,
                &manifest.initial_archive_url(),
                &archive_path,
                &mut archive_control,
                &self.progress,
                ARCHIVE_BUDGET,
            )
            .await?;
            extract_archive(&archive_path, &self.config.install_dir).await?;
            let _ = tokio::fs::remove_file(&archive_path).await;
            self.store
                .mutate(|state| state.initial_download_complete = true)?;
        }

        let outcome = self
            .transfer
            .transfer(
                manifest,
                &pending,
                &self.config.install_dir,
                &control,
                total_bytes,
                content_budget,
            )
            .await?;

        if !outcome.failed_files.is_empty() {
            warn!(
                failed = outcome.failed_files.len(),
                "Transfer finished with failures, version not committed"
            );
            self.set_failed(outcome.failed_files);
            self.set_phase(SessionPhase::Idle);
            return Ok(());
        }

        self.set_phase(SessionPhase::Finalizing);
        if binaries_needed {
            let archive_path = self.config.data_dir.join("Binaries.zip");
            let mut archive_control = self.gate.subscribe();
            download_archive(
                &self.client,
                &manifest.binaries_archive_url(),
                &archive_path,
                &mut archive_control,
                &self.progress,
                ARCHIVE_BUDGET,
            )
            .await?;
            extract_archive(&archive_path, &self.config.install_dir).await?;
            let _ = tokio::fs::remove_file(&archive_path).await;
        }

        self.store.mutate(|state| {
            state.installed_content_version = target;
            state.initial_download_complete = true;
            state.attempt.partial_download = false;
        })?;
        self.progress.reset_to(100.0);
        self.set_phase(SessionPhase::Done);
        info!(version = target, "Content operation committed");
        Ok(())
    }

    /// Validates the persisted attempt against the work being started. A
    /// mismatched version or operation discards the old checkpoints and
    /// begins a fresh attempt.
    fn prepare_attempt(&self, target: u32, kind: OperationKind) -> Result<UpdateState> {
        let snapshot = self.store.snapshot();
        if snapshot.attempt.is_resumable(target, kind) {
            info!(
                target,
                downloaded = snapshot.attempt.downloaded_files.len(),
                "Resuming prior attempt"
            );
            return Ok(snapshot);
        }

        if snapshot.attempt.partial_download {
            info!(
                old_version = snapshot.attempt.attempt_version,
                target, "Discarding stale attempt"
            );
        }
        self.progress.reset_to(0.0);
        self.store
            .mutate(|state| state.attempt = AttemptRecord::fresh(target, kind))?;
        Ok(self.store.snapshot())
    }

    fn set_phase(&self, phase: SessionPhase) {
        if let Ok(mut guard) = self.phase.lock() {
            *guard = phase;
        }
    }

    fn set_operation(&self, operation: Option<OperationKind>) {
        if let Ok(mut guard) = self.operation.lock() {
            *guard = operation;
        }
    }

    fn set_failed(&self, failed: Vec<String>) {
        if let Ok(mut guard) = self.failed.lock() {
            *guard = failed;
        }
    }
}
