//! Catnip Session Isolation
//!
//! - One container per live tab id, created on first reference
//! - Each container owns a private storage partition and a pipeline
//!   bound to the shared policy
//! - Destroying a container erases its partition and frees the tab id
//!   immediately

mod backend;
mod container;
mod error;
mod manager;

pub use backend::{EngineBackend, InMemoryBackend, PartitionHandle};
pub use container::{Container, TabId};
pub use error::SessionError;
pub use manager::SessionManager;

pub type Result<T> = std::result::Result<T, SessionError>;
