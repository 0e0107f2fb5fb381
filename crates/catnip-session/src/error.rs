//! Session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Container not found for tab: {0}")]
    NotFound(String),

    #[error("Failed to allocate storage partition {name}: {reason}")]
    PartitionAllocation { name: String, reason: String },
}
