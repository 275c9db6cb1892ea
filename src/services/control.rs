use tokio::sync::watch;

use crate::errors::{Result, UpdaterError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    Running,
    Paused,
    Cancelled,
}

/// Pause/cancel gate shared by every worker. The user-facing side flips the
/// state; workers re-check it at every block boundary and park on the watch
/// channel while paused instead of spinning.
///
/// Cancel stops workers but leaves the persisted attempt intact, so the next
/// start resumes from the per-file checkpoints.
#[derive(Clone)]
pub struct ControlGate {
    tx: watch::Sender<ControlState>,
    rx: watch::Receiver<ControlState>,
}

impl Default for ControlGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlGate {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ControlState::Running);
        Self { tx, rx }
    }

    pub fn pause(&self) {
        let _ = self.tx.send(ControlState::Paused);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(ControlState::Running);
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(ControlState::Cancelled);
    }

    pub fn is_paused(&self) -> bool {
        *self.rx.borrow() == ControlState::Paused
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() == ControlState::Cancelled
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.rx.clone()
    }
}

/// Blocks until the gate reads Running. Errors out on cancel so workers
/// unwind without marking further files complete.
pub async fn wait_until_running(control: &mut watch::Receiver<ControlState>) -> Result<()> {
    loop {
        let state = *control.borrow();
        match state {
            ControlState::Running => return Ok(()),
            ControlState::Paused => {
                control
                    .changed()
                    .await
                    .map_err(|_| UpdaterError::Config("control channel closed".to_string()))?;
            }
            ControlState::Cancelled => return Err(UpdaterError::Cancelled),
        }
    }
}
