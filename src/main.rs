use std::io::Write;
use std::time::Duration;

use tracing::info;

use patchline::services::SessionPhase;
use patchline::utils::paths::resolve_log_dir;
use patchline::{choose_operation, Result, UpdateSession, UpdaterConfig};

const DISPLAY_INTERVAL: Duration = Duration::from_millis(16);

/// Thin stand-in for the launcher UI: starts whatever operation the manifest
/// calls for and renders the shared progress counter until the session
/// finishes.
#[tokio::main]
async fn main() -> Result<()> {
    let config = UpdaterConfig::from_env();
    let quiet = patchline::config::env_truthy("PATCHLINE_QUIET");
    patchline::logging::init(&resolve_log_dir())?;
    info!(
        install_dir = %config.install_dir.display(),
        workers = config.worker_count,
        "patchline starting"
    );

    let session = UpdateSession::new(config)?;
    let manifest = session.fetch_manifest().await?;
    let state = session.state();

    let Some(kind) = choose_operation(&manifest, &state) else {
        session.mark_ready();
        println!("Everything is up to date.");
        return Ok(());
    };

    println!("{}...", kind.display_label());
    let handle = session.start(manifest, kind);

    let mut ticker = tokio::time::interval(DISPLAY_INTERVAL);
    while !handle.is_finished() {
        ticker.tick().await;
        if !quiet {
            render_line(&session);
        }
    }
    if !quiet {
        render_line(&session);
        println!();
    }

    handle
        .await
        .map_err(|err| patchline::UpdaterError::Config(err.to_string()))??;

    let failed = session.failed_files();
    if !failed.is_empty() {
        println!("{} file(s) failed; run again to retry:", failed.len());
        for file in failed {
            println!("  {file}");
        }
    } else if session.is_complete() {
        println!("{} complete.", session.display_label());
    }

    Ok(())
}

fn render_line(session: &UpdateSession) {
    let marker = match session.phase() {
        SessionPhase::Idle => "idle",
        SessionPhase::Ready => "ready",
        SessionPhase::Resolving => "resolving",
        SessionPhase::Transferring => {
            if session.is_paused() {
                "paused"
            } else {
                "downloading"
            }
        }
        SessionPhase::Finalizing => "finalizing",
        SessionPhase::Done => "done",
    };
    print!("\r[{:>11}] {:6.2}%", marker, session.progress_percent());
    let _ = std::io::stdout().flush();
}
