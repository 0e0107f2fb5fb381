//! Container registry
//!
//! Every get-or-create and destroy linearises on the registry lock:
//! a destroy that lands first makes the next get-or-create allocate a
//! fresh container; a get-or-create that lands first is simply torn
//! down by the destroy. Partition names carry a process-unique
//! generation, so a pending erase of an old partition can never touch
//! the partition of a newer container for the same tab.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use catnip_privacy::{Pipeline, SharedPolicy, StatsAggregator};

use crate::backend::EngineBackend;
use crate::container::{Container, TabId};
use crate::error::SessionError;
use crate::Result;

pub struct SessionManager {
    containers: Arc<RwLock<HashMap<TabId, Arc<Container>>>>,
    generation: Arc<AtomicU64>,
    backend: Arc<dyn EngineBackend>,
    policy: SharedPolicy,
    stats: Arc<StatsAggregator>,
    /// Pipeline for requests that belong to no tab
    default_pipeline: Arc<Pipeline>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn EngineBackend>,
        policy: SharedPolicy,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        let default_pipeline = Arc::new(Pipeline::standard(policy.clone(), Arc::clone(&stats)));

        Self {
            containers: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(1)),
            backend,
            policy,
            stats,
            default_pipeline,
        }
    }

    pub fn default_pipeline(&self) -> &Pipeline {
        &self.default_pipeline
    }

    /// Return the tab's container, creating it on first reference
    pub fn get_or_create(&self, tab_id: &TabId) -> Result<Arc<Container>> {
        if let Some(container) = self.containers.read().get(tab_id) {
            return Ok(Arc::clone(container));
        }

        let mut containers = self.containers.write();

        // Another caller may have created it between the two locks
        if let Some(container) = containers.get(tab_id) {
            return Ok(Arc::clone(container));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let name = format!("persist:tab-{}-{}", tab_id, generation);
        let partition = self.backend.allocate_partition(&name)?;
        self.backend.register_download_hook(&partition);

        let container = Arc::new(Container::new(
            tab_id.clone(),
            partition,
            self.policy.clone(),
            Arc::clone(&self.stats),
        ));
        containers.insert(tab_id.clone(), Arc::clone(&container));

        tracing::info!(
            tab_id = %tab_id,
            partition = %container.partition(),
            "Created isolated container"
        );

        Ok(container)
    }

    /// Look up an existing container without creating one
    pub fn get(&self, tab_id: &TabId) -> Result<Arc<Container>> {
        self.containers
            .read()
            .get(tab_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(tab_id.to_string()))
    }

    /// Drop the tab's container and erase its partition.
    ///
    /// Returns false when no container existed. The registry entry is gone
    /// before the erase is requested; the erase itself is not awaited.
    pub fn destroy(&self, tab_id: &TabId) -> bool {
        let removed = self.containers.write().remove(tab_id);

        match removed {
            Some(container) => {
                self.backend.erase_partition(container.partition());
                tracing::info!(
                    tab_id = %tab_id,
                    partition = %container.partition(),
                    "Destroyed isolated container"
                );
                true
            }
            None => false,
        }
    }

    /// Destroy every live container
    pub fn destroy_all(&self) -> usize {
        let drained: Vec<Arc<Container>> = self
            .containers
            .write()
            .drain()
            .map(|(_, container)| container)
            .collect();

        for container in &drained {
            self.backend.erase_partition(container.partition());
        }

        tracing::info!(count = drained.len(), "Destroyed all isolated containers");

        drained.len()
    }

    pub fn contains(&self, tab_id: &TabId) -> bool {
        self.containers.read().contains_key(tab_id)
    }

    pub fn container_count(&self) -> usize {
        self.containers.read().len()
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.containers.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            containers: Arc::clone(&self.containers),
            generation: Arc::clone(&self.generation),
            backend: Arc::clone(&self.backend),
            policy: self.policy.clone(),
            stats: Arc::clone(&self.stats),
            default_pipeline: Arc::clone(&self.default_pipeline),
        }
    }
}
