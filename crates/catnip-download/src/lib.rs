//! Catnip Download Tracking
//!
//! Instrumentation around transfers performed by the rendering engine:
//! - one durable record per transfer, reconciled by (filename, URL)
//! - progress, completion and failure persisted as they happen
//! - every event fanned out to all open windows
//!
//! Tracking never gates a transfer: storage failures are logged and the
//! engine carries on.

mod download;
mod error;
mod events;
mod tracker;

pub use download::{percent, Download, DownloadStatus};
pub use error::DownloadError;
pub use events::{DownloadEvent, WindowId, WindowRegistry, DEFAULT_CHANNEL_CAPACITY};
pub use tracker::{DownloadTracker, EngineTransfer, DEFAULT_RECONCILE_WINDOW};

pub type Result<T> = std::result::Result<T, DownloadError>;
