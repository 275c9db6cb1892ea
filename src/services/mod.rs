pub mod archive;
pub mod control;
pub mod delta;
pub mod progress;
pub mod session;
pub mod state_store;
pub mod transfer;
pub mod version_directory;

pub use control::{ControlGate, ControlState};
pub use progress::ProgressCounter;
pub use session::{choose_operation, SessionPhase, UpdateSession};
pub use state_store::StateStore;
pub use transfer::{FileTransfer, TransferOutcome};
pub use version_directory::{VersionDirectoryClient, VersionManifest};
