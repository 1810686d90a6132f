#![forbid(unsafe_code)]

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A tool id is missing or does not normalize to `T<n>`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A tool or profile id does not name anything that exists.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings path: {0}")]
    InvalidPath(PathBuf),

    #[error("failed to join background task: {0}")]
    Join(#[from] tokio::task::JoinError),
}
