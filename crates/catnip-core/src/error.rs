//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] catnip_storage::StorageError),

    #[error("Session error: {0}")]
    Session(#[from] catnip_session::SessionError),

    #[error("Download error: {0}")]
    Download(#[from] catnip_download::DownloadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
