use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::info;
use zip::ZipArchive;

use crate::errors::{Result, UpdaterError};
use crate::services::control::{wait_until_running, ControlState};
use crate::services::progress::ProgressCounter;
use crate::utils::paths::is_safe_relative_path;

/// Streams one archive to `dest_path`, honoring the pause/cancel gate at
/// every block and feeding `budget` progress points proportionally to bytes
/// received. A response without a content length credits the whole budget on
/// completion instead.
pub async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    dest_path: &Path,
    control: &mut watch::Receiver<ControlState>,
    progress: &ProgressCounter,
    budget: f64,
) -> Result<()> {
    wait_until_running(control).await?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(UpdaterError::Http(format!(
            "archive fetch returned HTTP {} for {url}",
            response.status().as_u16()
        )));
    }

    let total_bytes = response.content_length().unwrap_or(0);
    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(dest_path).await?;
    let mut stream = response.bytes_stream();
    let mut received = 0u64;

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
                file.write_all(&bytes).await?;
                received = received.saturating_add(bytes.len() as u64);
                if total_bytes > 0 {
                    progress.add(budget * bytes.len() as f64 / total_bytes as f64);
                }
            }
        }
    }

    file.flush().await?;
    if total_bytes == 0 {
        progress.add(budget);
    }
    info!(url, bytes = received, "Archive download complete");
    Ok(())
}

/// Unpacks the archive into `install_dir` on a blocking thread. Entries that
/// would escape the install directory are skipped.
pub async fn extract_archive(archive_path: &Path, install_dir: &Path) -> Result<()> {
    let archive_path = archive_path.to_path_buf();
    let install_dir = install_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip_archive(&archive_path, &install_dir))
        .await
        .map_err(|err| UpdaterError::Extraction(err.to_string()))?
}

fn extract_zip_archive(archive_path: &Path, install_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| UpdaterError::Extraction(err.to_string()))?;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| UpdaterError::Extraction(err.to_string()))?;
        let name = entry.name().replace('\\', "/");
        if name.is_empty() {
            continue;
        }
        let entry_path = PathBuf::from(&name);
        if !is_safe_relative_path(&entry_path) {
            continue;
        }
        let out_path = install_dir.join(&entry_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&out_path)?;
        io::copy(&mut entry, &mut outfile)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use uuid::Uuid;
    use zip::write::FileOptions;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("patchline-archive-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp directory");
        dir
    }

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).expect("create archive");
        let mut writer = zip::ZipWriter::new(file);
        let options = FileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).expect("start entry");
            writer.write_all(contents).expect("write entry");
        }
        writer.finish().expect("finish archive");
    }

    #[tokio::test]
    async fn extracts_entries_and_skips_traversals() {
        let dir = temp_dir();
        let archive_path = dir.join("content.zip");
        build_zip(
            &archive_path,
            &[
                ("core/engine.pak", b"engine".as_slice()),
                ("../escape.pak", b"nope".as_slice()),
            ],
        );

        let install_dir = dir.join("game");
        extract_archive(&archive_path, &install_dir)
            .await
            .expect("extract");

        assert_eq!(
            std::fs::read(install_dir.join("core/engine.pak")).expect("extracted file"),
            b"engine"
        );
        assert!(!dir.join("escape.pak").exists());
    }
}
