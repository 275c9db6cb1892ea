use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Malformed manifest: {0}")]
    ManifestFormat(String),
    #[error("Corrupt update state: {0}")]
    StateCorrupt(String),
    #[error("Extraction error: {0}")]
    Extraction(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
