//! Mediator facade
//!
//! Owns the process-wide policy, statistics, container registry and
//! download tracker, and routes engine events to them.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use catnip_download::{Download, DownloadEvent, DownloadTracker, WindowId, WindowRegistry};
use catnip_privacy::{
    Decision, FingerprintShield, PermissionDecision, PermissionKind, Pipeline,
    PolicyConfiguration, PolicyUpdate, PrivacyStats, RequestDescriptor, SharedPolicy,
    StatsAggregator, StatsState,
};
use catnip_session::{Container, EngineBackend, PartitionHandle, SessionManager, TabId};
use catnip_storage::Database;

use crate::config::Config;
use crate::Result;

/// Settings key of the persisted policy
pub const POLICY_SETTINGS_KEY: &str = "privacy_settings";
/// Settings key of the persisted statistics
pub const STATS_SETTINGS_KEY: &str = "privacy_stats";
/// Name of the engine's non-container partition
pub const DEFAULT_PARTITION: &str = "default";

pub struct Mediator {
    config: Config,
    db: Database,
    backend: Arc<dyn EngineBackend>,
    policy: SharedPolicy,
    /// Serialises persist-then-swap so concurrent updates are not lost
    policy_writer: Arc<Mutex<()>>,
    stats: Arc<StatsAggregator>,
    /// Serialises snapshot-then-persist so a stale flush cannot land after a reset
    stats_writer: Arc<Mutex<()>>,
    flusher: Arc<Mutex<Option<JoinHandle<()>>>>,
    sessions: SessionManager,
    downloads: DownloadTracker,
}

impl Mediator {
    /// Open storage and wire up every component
    pub fn new(config: Config, backend: Arc<dyn EngineBackend>) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&config.database_path)?;
        Ok(Self::with_database(config, db, backend))
    }

    pub fn with_database(config: Config, db: Database, backend: Arc<dyn EngineBackend>) -> Self {
        let policy = SharedPolicy::default();
        let stats = Arc::new(StatsAggregator::new());
        let sessions = SessionManager::new(Arc::clone(&backend), policy.clone(), Arc::clone(&stats));

        let windows = WindowRegistry::new(config.event_channel_capacity);
        let downloads = DownloadTracker::new(db.clone(), windows, config.download_dir.clone())
            .with_reconcile_window(config.reconcile_window);

        Self {
            config,
            db,
            backend,
            policy,
            policy_writer: Arc::new(Mutex::new(())),
            stats,
            stats_writer: Arc::new(Mutex::new(())),
            flusher: Arc::new(Mutex::new(None)),
            sessions,
            downloads,
        }
    }

    /// Restore persisted state and hook the default partition
    pub fn initialize(&self) -> Result<()> {
        match self.db.get_json::<PolicyConfiguration>(POLICY_SETTINGS_KEY) {
            Ok(Some(policy)) => {
                self.policy.replace(policy);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Stored privacy policy unreadable, using defaults");
            }
        }

        match self.db.get_json::<StatsState>(STATS_SETTINGS_KEY) {
            Ok(Some(state)) => self.stats.restore(state),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Stored privacy stats unreadable, starting from zero");
            }
        }

        self.downloads.load_index()?;
        self.backend
            .register_download_hook(&PartitionHandle::new(DEFAULT_PARTITION));

        tracing::info!("Mediator initialized");

        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // === Policy ===

    pub fn policy(&self) -> PolicyConfiguration {
        self.policy.snapshot().as_ref().clone()
    }

    /// Merge, persist, then swap in. Every pipeline observes the result on its next event.
    pub fn set_policy(&self, update: &PolicyUpdate) -> Result<PolicyConfiguration> {
        let _writer = self.policy_writer.lock();

        let next = self.policy.snapshot().merged(update);
        self.db.set_json(POLICY_SETTINGS_KEY, &next)?;
        self.policy.replace(next.clone());

        tracing::info!(policy = ?next, "Privacy policy saved");

        Ok(next)
    }

    pub fn fingerprint_shield(&self) -> FingerprintShield {
        FingerprintShield::from_policy(&self.policy.snapshot())
    }

    // === Statistics ===

    pub fn stats(&self) -> PrivacyStats {
        self.stats.snapshot()
    }

    /// Zero every counter and persist immediately
    pub fn reset_stats(&self) -> Result<PrivacyStats> {
        let _writer = self.stats_writer.lock();

        self.stats.reset();
        self.db.set_json(STATS_SETTINGS_KEY, &self.stats.state())?;
        Ok(self.stats.snapshot())
    }

    pub fn flush_stats(&self) -> Result<()> {
        let _writer = self.stats_writer.lock();

        self.db.set_json(STATS_SETTINGS_KEY, &self.stats.state())?;
        Ok(())
    }

    /// Flush statistics on the configured interval until shutdown.
    /// Must be called inside a Tokio runtime; replaces a flusher already running.
    pub fn spawn_stats_flusher(&self) {
        let mediator = self.clone();
        let period = self.config.stats_flush_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = mediator.flush_stats() {
                    tracing::warn!(error = %e, "Failed to flush privacy stats");
                }
            }
        });

        if let Some(previous) = self.flusher.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Returns false when no flusher was running
    pub fn stop_stats_flusher(&self) -> bool {
        match self.flusher.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    // === Containers ===

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn container(&self, tab_id: &TabId) -> Result<Arc<Container>> {
        Ok(self.sessions.get_or_create(tab_id)?)
    }

    pub fn destroy_container(&self, tab_id: &TabId) -> bool {
        self.sessions.destroy(tab_id)
    }

    // === Request and permission routing ===

    pub fn on_before_request(&self, tab_id: Option<&TabId>, request: &RequestDescriptor) -> Decision {
        match self.container_for(tab_id) {
            Some(container) => container.on_before_request(request),
            None => self.sessions.default_pipeline().on_before_request(request),
        }
    }

    pub fn on_before_send_headers(
        &self,
        tab_id: Option<&TabId>,
        request: &RequestDescriptor,
    ) -> Decision {
        match self.container_for(tab_id) {
            Some(container) => container.on_before_send_headers(request),
            None => self.sessions.default_pipeline().on_before_send_headers(request),
        }
    }

    pub fn decide(&self, tab_id: Option<&TabId>, request: &RequestDescriptor) -> Decision {
        match self.container_for(tab_id) {
            Some(container) => container.decide(request),
            None => self.sessions.default_pipeline().decide(request),
        }
    }

    pub fn authorize_permission(
        &self,
        tab_id: Option<&TabId>,
        kind: &PermissionKind,
        origin: Option<&str>,
    ) -> PermissionDecision {
        match self.container_for(tab_id) {
            Some(container) => container.authorize(kind, origin),
            None => self.sessions.default_pipeline().authorize(kind, origin),
        }
    }

    pub fn default_pipeline(&self) -> &Pipeline {
        self.sessions.default_pipeline()
    }

    /// Decisions for a tab whose container cannot be allocated fall back to the default pipeline
    fn container_for(&self, tab_id: Option<&TabId>) -> Option<Arc<Container>> {
        let tab_id = tab_id?;
        match self.sessions.get_or_create(tab_id) {
            Ok(container) => Some(container),
            Err(e) => {
                tracing::warn!(tab_id = %tab_id, error = %e, "No container for tab, using default pipeline");
                None
            }
        }
    }

    // === Downloads ===

    /// Engine-facing tracker; download callbacks go straight to it
    pub fn downloads(&self) -> &DownloadTracker {
        &self.downloads
    }

    pub fn open_window(&self) -> (WindowId, mpsc::Receiver<DownloadEvent>) {
        self.downloads.windows().open_window()
    }

    pub fn close_window(&self, window_id: &WindowId) -> bool {
        self.downloads.windows().close_window(window_id)
    }

    /// Register the download and ask the engine to begin the transfer
    pub fn start_download(&self, url: &str, filename: Option<&str>) -> Result<Download> {
        let download = self.downloads.start(url, filename)?;
        self.backend.download_url(url);
        Ok(download)
    }

    pub fn get_download(&self, id: i64) -> Result<Download> {
        Ok(self.downloads.get(id)?)
    }

    /// Newest first; `limit` defaults to the configured page size
    pub fn list_downloads(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Download>> {
        let limit = limit.unwrap_or(self.config.download_page_size);
        Ok(self.downloads.list(limit, offset)?)
    }

    pub fn delete_download(&self, id: i64) -> Result<bool> {
        Ok(self.downloads.delete(id)?)
    }

    pub fn clear_completed_downloads(&self) -> Result<usize> {
        Ok(self.downloads.clear_completed()?)
    }

    // === Lifecycle ===

    /// Erase default storage and the partition of every live container
    pub fn clear_browsing_data(&self) -> usize {
        self.backend.clear_default_storage();

        let mut cleared = 0;
        for tab_id in self.sessions.tab_ids() {
            if let Ok(container) = self.sessions.get(&tab_id) {
                self.backend.erase_partition(container.partition());
                cleared += 1;
            }
        }

        tracing::info!(containers = cleared, "Cleared browsing data");
        cleared
    }

    /// Stop the flusher, persist statistics, honour clear-on-exit, and tear down every container
    pub fn shutdown(&self) {
        self.stop_stats_flusher();

        if let Err(e) = self.flush_stats() {
            tracing::error!(error = %e, "Failed to persist privacy stats on shutdown");
        }

        // container partitions are erased by destroy_all below
        if self.policy.snapshot().clear_data_on_exit {
            self.backend.clear_default_storage();
        }

        let destroyed = self.sessions.destroy_all();
        tracing::info!(containers = destroyed, "Mediator shut down");
    }
}

impl Clone for Mediator {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            db: self.db.clone(),
            backend: Arc::clone(&self.backend),
            policy: self.policy.clone(),
            policy_writer: Arc::clone(&self.policy_writer),
            stats: Arc::clone(&self.stats),
            stats_writer: Arc::clone(&self.stats_writer),
            flusher: Arc::clone(&self.flusher),
            sessions: self.sessions.clone(),
            downloads: self.downloads.clone(),
        }
    }
}
