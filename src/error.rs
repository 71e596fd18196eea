//! Error type shared by the engine and its collaborators.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("provider error: {0}")]
    Provider(#[from] std::io::Error),

    #[error("cursor is not valid base64: {0}")]
    CursorEncoding(#[from] base64::DecodeError),

    #[error("cursor payload is malformed: {0}")]
    CursorFormat(#[from] serde_json::Error),

    #[error("failed to build sampler worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
