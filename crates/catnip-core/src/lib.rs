//! Catnip Core
//!
//! Mediation layer between a multi-tab browsing shell and the network,
//! permission and download surface of an embedded rendering engine.
//! The [`Mediator`] owns all shared state and is the only entry point
//! the shell needs.

mod config;
mod error;
mod mediator;

pub use config::Config;
pub use error::CoreError;
pub use mediator::{Mediator, DEFAULT_PARTITION, POLICY_SETTINGS_KEY, STATS_SETTINGS_KEY};

// Re-export core components
pub use catnip_download::{
    Download, DownloadError, DownloadEvent, DownloadStatus, DownloadTracker, EngineTransfer,
    WindowId, WindowRegistry,
};
pub use catnip_privacy::{
    classify, BlockKind, ClassificationResult, Decision, FingerprintProtection, FingerprintShield,
    HeaderBag, PermissionDecision, PermissionKind, Pipeline, PolicyConfiguration, PolicyUpdate,
    PrivacyStats, RequestDescriptor, ResourceKind, SharedPolicy, StatsAggregator,
};
pub use catnip_session::{
    Container, EngineBackend, InMemoryBackend, PartitionHandle, SessionError, SessionManager,
    TabId,
};
pub use catnip_storage::{Database, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
