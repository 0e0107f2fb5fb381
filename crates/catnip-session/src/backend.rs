//! Rendering engine side of the container lifecycle

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::Result;

/// Opaque storage partition handle issued by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionHandle {
    name: String,
}

impl PartitionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for PartitionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

pub trait EngineBackend: Send + Sync {
    /// Allocate a cookie/cache/storage partition under `name`
    fn allocate_partition(&self, name: &str) -> Result<PartitionHandle>;

    /// Erase everything stored in `partition`. May complete asynchronously.
    fn erase_partition(&self, partition: &PartitionHandle);

    /// Route download events of `partition` to the download tracker
    fn register_download_hook(&self, partition: &PartitionHandle);

    /// Erase the default (non-container) storage
    fn clear_default_storage(&self);

    /// Begin a transfer of `url` on the default partition
    fn download_url(&self, url: &str);
}

#[derive(Debug, Default)]
struct BackendLog {
    live: HashSet<PartitionHandle>,
    allocated: Vec<PartitionHandle>,
    erased: Vec<PartitionHandle>,
    hooked: Vec<PartitionHandle>,
    downloads: Vec<String>,
    default_clears: usize,
}

/// Engine stand-in that records every call. Used for headless runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    log: Mutex<BackendLog>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, partition: &PartitionHandle) -> bool {
        self.log.lock().live.contains(partition)
    }

    pub fn allocated(&self) -> Vec<PartitionHandle> {
        self.log.lock().allocated.clone()
    }

    pub fn erased(&self) -> Vec<PartitionHandle> {
        self.log.lock().erased.clone()
    }

    pub fn hooked(&self) -> Vec<PartitionHandle> {
        self.log.lock().hooked.clone()
    }

    pub fn requested_downloads(&self) -> Vec<String> {
        self.log.lock().downloads.clone()
    }

    pub fn default_clears(&self) -> usize {
        self.log.lock().default_clears
    }
}

impl EngineBackend for InMemoryBackend {
    fn allocate_partition(&self, name: &str) -> Result<PartitionHandle> {
        let handle = PartitionHandle::new(name);
        let mut log = self.log.lock();

        if !log.live.insert(handle.clone()) {
            return Err(crate::SessionError::PartitionAllocation {
                name: name.to_string(),
                reason: "partition already in use".to_string(),
            });
        }
        log.allocated.push(handle.clone());

        Ok(handle)
    }

    fn erase_partition(&self, partition: &PartitionHandle) {
        let mut log = self.log.lock();
        log.live.remove(partition);
        log.erased.push(partition.clone());
    }

    fn register_download_hook(&self, partition: &PartitionHandle) {
        self.log.lock().hooked.push(partition.clone());
    }

    fn clear_default_storage(&self) {
        self.log.lock().default_clears += 1;
    }

    fn download_url(&self, url: &str) {
        self.log.lock().downloads.push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_partition_rejected() {
        let backend = InMemoryBackend::new();
        let handle = backend.allocate_partition("persist:tab-1-1").unwrap();

        assert!(backend.allocate_partition("persist:tab-1-1").is_err());

        backend.erase_partition(&handle);
        assert!(!backend.is_live(&handle));
        assert!(backend.allocate_partition("persist:tab-1-1").is_ok());
    }
}
