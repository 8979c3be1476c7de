//! Error type for the pulse runtime.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("frame interval must be non-zero")]
    ZeroFrameInterval,

    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("failed to build tokio runtime: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pulse operations.
pub type Result<T> = std::result::Result<T, Error>;
