use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::errors::{Result, UpdaterError};
use crate::services::control::{wait_until_running, ControlState};
use crate::services::progress::ProgressCounter;
use crate::services::state_store::StateStore;
use crate::services::version_directory::VersionManifest;
use crate::utils::paths::is_safe_relative_path;

enum TransferEvent {
    Progress { bytes: u64 },
    FileDone { file: String, bytes: u64 },
    FileFailed { file: String, reason: String },
    Halted { error: UpdaterError },
}

pub struct TransferOutcome {
    pub failed_files: Vec<String>,
}

/// Splits `files` into one contiguous slice per worker. Order within a slice
/// is preserved so checkpoint behavior stays deterministic per worker.
pub fn partition_files(files: &[String], worker_count: usize) -> Vec<Vec<String>> {
    if files.is_empty() {
        return Vec::new();
    }
    let workers = worker_count.max(1);
    let chunk_size = files.len().div_ceil(workers);
    files
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Per-file download engine: a size probe pass that weights the progress
/// scale, then a content pass where each worker streams its slice of files
/// and checkpoints every completed file through the state store.
#[derive(Clone)]
pub struct FileTransfer {
    client: reqwest::Client,
    store: StateStore,
    progress: ProgressCounter,
    worker_count: usize,
}

impl FileTransfer {
    pub fn new(
        client: reqwest::Client,
        store: StateStore,
        progress: ProgressCounter,
        worker_count: usize,
    ) -> Self {
        Self {
            client,
            store,
            progress,
            worker_count,
        }
    }

    /// HEADs every pending file and sums the reported sizes. Files without a
    /// content length count as zero and ride along on the other weights.
    /// Each probed file credits an even share of `budget`.
    pub async fn probe_total_size(
        &self,
        manifest: &VersionManifest,
        files: &[String],
        control: &watch::Receiver<ControlState>,
        budget: f64,
    ) -> Result<u64> {
        if files.is_empty() {
            self.progress.add(budget);
            return Ok(0);
        }

        let per_file = budget / files.len() as f64;
        let mut handles = Vec::new();
        for slice in partition_files(files, self.worker_count) {
            let client = self.client.clone();
            let progress = self.progress.clone();
            let mut control = control.clone();
            let urls: Vec<(String, String)> = slice
                .iter()
                .map(|file| (file.clone(), manifest.file_url(file)))
                .collect();

            handles.push(tokio::spawn(async move {
                let mut subtotal = 0u64;
                for (file, url) in urls {
                    wait_until_running(&mut control).await?;
                    match client.head(&url).send().await {
                        Ok(response) if response.status().is_success() => {
                            let size = response.content_length().unwrap_or(0);
                            if size == 0 {
                                warn!(file, "Size probe returned no content length");
                            }
                            subtotal = subtotal.saturating_add(size);
                        }
                        Ok(response) => {
                            warn!(
                                file,
                                status = response.status().as_u16(),
                                "Size probe rejected"
                            );
                        }
                        Err(err) => {
                            warn!(file, error = %err, "Size probe failed");
                        }
                    }
                    progress.add(per_file);
                }
                Ok::<u64, UpdaterError>(subtotal)
            }));
        }

        let mut total = 0u64;
        for handle in handles {
            let subtotal = handle
                .await
                .map_err(|err| UpdaterError::Config(err.to_string()))??;
            total = total.saturating_add(subtotal);
        }
        Ok(total)
    }

    /// Streams every pending file into `install_dir`. Progress points are
    /// fed per received block; each finished file is checkpointed before the
    /// worker moves on, so a crash never repeats completed work. A file that
    /// fails is logged and left unmarked; cancellation aborts the whole run.
    pub async fn transfer(
        &self,
        manifest: &VersionManifest,
        files: &[String],
        install_dir: &Path,
        control: &watch::Receiver<ControlState>,
        total_bytes: u64,
        budget: f64,
    ) -> Result<TransferOutcome> {
        if files.is_empty() {
            self.progress.add(budget);
            return Ok(TransferOutcome {
                failed_files: Vec::new(),
            });
        }

        let points_per_byte = if total_bytes > 0 {
            budget / total_bytes as f64
        } else {
            0.0
        };
        // With no usable size data every completed file earns an even share.
        let per_file_fallback = if total_bytes == 0 {
            budget / files.len() as f64
        } else {
            0.0
        };

        let (tx, mut rx) = mpsc::channel::<TransferEvent>(256);
        for slice in partition_files(files, self.worker_count) {
            let tx = tx.clone();
            let client = self.client.clone();
            let mut control = control.clone();
            let install_dir = install_dir.to_path_buf();
            let jobs: Vec<(String, String)> = slice
                .iter()
                .map(|file| (file.clone(), manifest.file_url(file)))
                .collect();

            tokio::spawn(async move {
                for (file, url) in jobs {
                    match download_one_file(&client, &url, &file, &install_dir, &mut control, &tx)
                        .await
                    {
                        Ok(bytes) => {
                            let _ = tx.send(TransferEvent::FileDone { file, bytes }).await;
                        }
                        Err(UpdaterError::Cancelled) => {
                            let _ = tx
                                .send(TransferEvent::Halted {
                                    error: UpdaterError::Cancelled,
                                })
                                .await;
                            return;
                        }
                        Err(err) => {
                            let _ = tx
                                .send(TransferEvent::FileFailed {
                                    file,
                                    reason: err.to_string(),
                                })
                                .await;
                        }
                    }
                }
            });
        }
        drop(tx);

        let mut failed_files = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                TransferEvent::Progress { bytes } => {
                    self.progress.add(points_per_byte * bytes as f64);
                }
                TransferEvent::FileDone { file, bytes } => {
                    let credit = if total_bytes > 0 {
                        points_per_byte * bytes as f64
                    } else {
                        per_file_fallback
                    };
                    if total_bytes == 0 {
                        self.progress.add(credit);
                    }
                    self.store.mutate(|state| {
                        state.attempt.downloaded_files.insert(file.clone());
                        state.attempt.completed_progress += credit;
                    })?;
                    info!(file, bytes, "File complete");
                }
                TransferEvent::FileFailed { file, reason } => {
                    warn!(file, reason, "File transfer failed");
                    failed_files.push(file);
                }
                TransferEvent::Halted { error } => {
                    return Err(error);
                }
            }
        }

        Ok(TransferOutcome { failed_files })
    }
}

async fn download_one_file(
    client: &reqwest::Client,
    url: &str,
    file: &str,
    install_dir: &Path,
    control: &mut watch::Receiver<ControlState>,
    events: &mpsc::Sender<TransferEvent>,
) -> Result<u64> {
    wait_until_running(control).await?;

    let relative = PathBuf::from(file);
    if !is_safe_relative_path(&relative) {
        return Err(UpdaterError::Config(format!(
            "refusing unsafe file path '{file}'"
        )));
    }
    let dest_path = install_dir.join(&relative);
    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(UpdaterError::Http(format!(
            "{} -> HTTP {}",
            url,
            response.status().as_u16()
        )));
    }

    let mut out = tokio::fs::File::create(&dest_path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    loop {
        tokio::select! {
            changed = control.changed() => {
                changed.map_err(|_| UpdaterError::Config("control channel closed".to_string()))?;
                let state = *control.borrow();
                match state {
                    ControlState::Running => {}
                    ControlState::Paused => {
                        wait_until_running(control).await?;
                    }
                    ControlState::Cancelled => {
                        return Err(UpdaterError::Cancelled);
                    }
                }
            }
            next = stream.next() => {
                let Some(next) = next else { break; };
                wait_until_running(control).await?;
                let bytes = next?;
                out.write_all(&bytes).await?;
                written = written.saturating_add(bytes.len() as u64);
                let _ = events
                    .send(TransferEvent::Progress { bytes: bytes.len() as u64 })
                    .await;
            }
        }
    }

    out.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|index| format!("file-{index}.pak")).collect()
    }

    #[test]
    fn partition_spreads_files_contiguously() {
        let slices = partition_files(&names(10), 4);
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[0].len(), 3);
        assert_eq!(slices[3].len(), 1);
        assert_eq!(slices[0][0], "file-0.pak");
        assert_eq!(slices[3][0], "file-9.pak");
    }

    #[test]
    fn partition_handles_fewer_files_than_workers() {
        let slices = partition_files(&names(2), 8);
        assert_eq!(slices.len(), 2);
        assert!(slices.iter().all(|slice| slice.len() == 1));
    }

    #[test]
    fn partition_of_empty_list_is_empty() {
        assert!(partition_files(&[], 4).is_empty());
    }
}
