//! Catnip Storage Layer
//!
//! SQLite-backed storage collaborator for the mediation core:
//! a key-value settings table (policy, statistics) and one row per download.

mod database;
mod error;
mod migrations;

pub use database::Database;
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
