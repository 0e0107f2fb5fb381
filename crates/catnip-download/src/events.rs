//! Download events and the per-window fan-out

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::download::DownloadStatus;

/// Per-window channel capacity when none is configured
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    #[serde(rename = "download-started")]
    Started {
        id: i64,
        filename: String,
        url: String,
    },
    #[serde(rename = "download-progress")]
    Progress {
        id: i64,
        received: u64,
        /// 0 when unknown
        total: u64,
        percent: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<DownloadStatus>,
    },
    #[serde(rename = "download-completed")]
    Completed { id: i64 },
}

impl DownloadEvent {
    pub fn download_id(&self) -> i64 {
        match self {
            DownloadEvent::Started { id, .. }
            | DownloadEvent::Progress { id, .. }
            | DownloadEvent::Completed { id } => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(Uuid);

impl WindowId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Open windows, each reachable through a bounded channel.
///
/// Delivery is fire-and-forget: a window whose receiver is gone is pruned,
/// a window whose channel is full misses that event.
pub struct WindowRegistry {
    windows: Arc<RwLock<HashMap<WindowId, mpsc::Sender<DownloadEvent>>>>,
    capacity: usize,
}

impl WindowRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Register a window and hand back the receiving end of its event channel
    pub fn open_window(&self) -> (WindowId, mpsc::Receiver<DownloadEvent>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = WindowId::new();
        self.windows.write().insert(id, tx);

        tracing::debug!(window_id = %id, "Window registered for download events");
        (id, rx)
    }

    pub fn close_window(&self, id: &WindowId) -> bool {
        self.windows.write().remove(id).is_some()
    }

    pub fn window_count(&self) -> usize {
        self.windows.read().len()
    }

    /// Publish to every open window. Returns the number of windows that accepted the event.
    pub fn broadcast(&self, event: DownloadEvent) -> usize {
        let targets: Vec<(WindowId, mpsc::Sender<DownloadEvent>)> = self
            .windows
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut gone = Vec::new();

        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(
                        window_id = %id,
                        download_id = event.download_id(),
                        "Window event channel full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => gone.push(id),
            }
        }

        if !gone.is_empty() {
            let mut windows = self.windows.write();
            for id in &gone {
                windows.remove(id);
            }
        }

        delivered
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Clone for WindowRegistry {
    fn clone(&self) -> Self {
        Self {
            windows: Arc::clone(&self.windows),
            capacity: self.capacity,
        }
    }
}
