use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid kingdom: {0}")]
    InvalidKingdom(String),

    #[error("missing config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("replicon request failed: {0}")]
    Transport(String),

    #[error("replicon service returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("replicon service returned an empty body for {url} after {attempts} attempts")]
    EmptyResponse { url: String, attempts: u32 },

    #[error("no data downloaded for {0}")]
    EmptyInput(String),

    #[error("gene {0} exhausted its retries")]
    RetryExhausted(String),

    #[error("nothing to process")]
    #[diagnostic(help("no organism of the selected kingdoms has a gene to fetch"))]
    NothingToProcess,

    #[error("processing interrupted")]
    Interrupted,

    #[error("a harvest is already running")]
    AlreadyRunning,

    #[error("failed to read replicon stream: {0}")]
    Stream(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to persist results: {0}")]
    Persistence(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl KiraError {
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            KiraError::Transport(_) | KiraError::HttpStatus { .. }
        )
    }
}
