pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

pub use config::UpdaterConfig;
pub use errors::{Result, UpdaterError};
pub use models::{AttemptRecord, OperationKind, UpdateState};
pub use services::{choose_operation, SessionPhase, UpdateSession};
