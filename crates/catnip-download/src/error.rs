//! Download error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Download not found: {0}")]
    NotFound(i64),

    #[error("Storage error: {0}")]
    Storage(#[from] catnip_storage::StorageError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
