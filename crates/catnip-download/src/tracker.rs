//! Download lifecycle tracker

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::OptionalExtension;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use catnip_storage::Database;

use crate::download::{percent, Download, DownloadStatus};
use crate::error::DownloadError;
use crate::events::{DownloadEvent, WindowRegistry};
use crate::Result;

/// Most recent rows considered when rebuilding the reconciliation index
pub const DEFAULT_RECONCILE_WINDOW: usize = 1000;

const INTERRUPTED_MESSAGE: &str = "Download interrupted";
const CANCELLED_MESSAGE: &str = "Download cancelled";

/// Handed back to the engine when it reports a new transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineTransfer {
    /// `None` when tracking failed; the transfer proceeds regardless
    pub id: Option<i64>,
    pub save_path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
struct ActiveTransfer {
    total_bytes: Option<u64>,
    received_bytes: u64,
    status: DownloadStatus,
}

impl ActiveTransfer {
    fn new(total_bytes: Option<u64>) -> Self {
        Self {
            total_bytes,
            received_bytes: 0,
            status: DownloadStatus::Downloading,
        }
    }
}

type TransferKey = (String, String);

/// (filename, url) -> most recent matching row, bounded to the newest `capacity` keys
#[derive(Debug)]
struct ReconcileIndex {
    by_key: HashMap<TransferKey, i64>,
    /// Oldest first
    order: VecDeque<TransferKey>,
    capacity: usize,
}

impl ReconcileIndex {
    fn new(capacity: usize) -> Self {
        Self {
            by_key: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &TransferKey) -> Option<i64> {
        self.by_key.get(key).copied()
    }

    /// Insert as the newest entry, evicting the oldest past capacity
    fn insert(&mut self, key: TransferKey, id: i64) {
        if self.by_key.insert(key.clone(), id).is_some() {
            self.order.retain(|existing| *existing != key);
        }
        self.order.push_back(key);

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.by_key.remove(&oldest);
            }
        }
    }

    fn retain_ids(&mut self, mut keep: impl FnMut(i64) -> bool) {
        self.by_key.retain(|_, id| keep(*id));
        let by_key = &self.by_key;
        self.order.retain(|key| by_key.contains_key(key));
    }

    fn clear(&mut self) {
        self.by_key.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.by_key.len()
    }
}

pub struct DownloadTracker {
    db: Database,
    windows: WindowRegistry,
    download_dir: PathBuf,
    reconcile_window: usize,
    index: Arc<RwLock<ReconcileIndex>>,
    /// Transfers the engine is currently driving
    active: Arc<Mutex<HashMap<i64, ActiveTransfer>>>,
}

impl DownloadTracker {
    pub fn new(db: Database, windows: WindowRegistry, download_dir: PathBuf) -> Self {
        Self {
            db,
            windows,
            download_dir,
            reconcile_window: DEFAULT_RECONCILE_WINDOW,
            index: Arc::new(RwLock::new(ReconcileIndex::new(DEFAULT_RECONCILE_WINDOW))),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_reconcile_window(mut self, window: usize) -> Self {
        self.reconcile_window = window;
        self.index.write().capacity = window.max(1);
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn windows(&self) -> &WindowRegistry {
        &self.windows
    }

    /// Where a transfer for `filename` is saved
    pub fn save_path(&self, filename: &str) -> PathBuf {
        self.download_dir.join(sanitize_file_name(filename))
    }

    /// Rebuild the reconciliation index from the most recent rows
    pub fn load_index(&self) -> Result<usize> {
        let limit = self.reconcile_window as i64;
        let rows = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, filename, url FROM downloads
                 ORDER BY started_at DESC, id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        // rows arrive newest first; keep the first match per key
        let mut seen = HashSet::new();
        let newest_first: Vec<(TransferKey, i64)> = rows
            .into_iter()
            .filter_map(|(id, filename, url)| {
                let key = (filename, url);
                seen.insert(key.clone()).then_some((key, id))
            })
            .collect();

        let mut index = self.index.write();
        index.clear();
        for (key, id) in newest_first.into_iter().rev() {
            index.insert(key, id);
        }

        tracing::debug!(entries = index.len(), "Loaded download reconciliation index");
        Ok(index.len())
    }

    /// Register a user-initiated download before the engine reports it
    pub fn start(&self, url: &str, filename: Option<&str>) -> Result<Download> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;

        let filename = match filename {
            Some(name) if !name.trim().is_empty() => sanitize_file_name(name),
            _ => sanitize_file_name(&file_name_from_url(&parsed).unwrap_or_default()),
        };
        let path = self.download_dir.join(&filename);

        let id = self.insert_row(&filename, url, &path, None)?;
        self.index.write().insert((filename, url.to_string()), id);

        tracing::info!(download_id = id, url = %url, "Registered download");

        self.get(id)
    }

    /// The engine reported a new transfer: reconcile or create its record.
    pub fn begin_transfer(&self, filename: &str, url: &str, total_bytes: Option<u64>) -> EngineTransfer {
        let filename = sanitize_file_name(filename);
        let save_path = self.download_dir.join(&filename);
        let total_bytes = total_bytes.filter(|total| *total > 0);
        let key = (filename.clone(), url.to_string());

        let registered = self.index.read().get(&key);

        let id = match registered {
            Some(id) => match self.adopt_row(id, &save_path, total_bytes) {
                Ok(()) => {
                    tracing::debug!(download_id = id, "Engine transfer matched registered download");
                    Some(id)
                }
                Err(e) => {
                    tracing::warn!(download_id = id, error = %e, "Failed to adopt registered download");
                    Some(id)
                }
            },
            None => match self.insert_row(&filename, url, &save_path, total_bytes) {
                Ok(id) => {
                    self.index.write().insert(key, id);
                    self.windows.broadcast(DownloadEvent::Started {
                        id,
                        filename: filename.clone(),
                        url: url.to_string(),
                    });
                    tracing::info!(download_id = id, url = %url, "Download started");
                    Some(id)
                }
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "Failed to record download, continuing untracked");
                    None
                }
            },
        };

        if let Some(id) = id {
            self.active.lock().insert(id, ActiveTransfer::new(total_bytes));
        }

        EngineTransfer { id, save_path }
    }

    pub fn on_progress(&self, id: i64, received: u64, total: Option<u64>) {
        let total = total.filter(|total| *total > 0);

        let (received, total, newly_known) = {
            let mut active = self.active.lock();
            let transfer = active
                .entry(id)
                .or_insert_with(|| ActiveTransfer::new(None));

            let newly_known = match (transfer.total_bytes, total) {
                (None, Some(total)) => {
                    transfer.total_bytes = Some(total);
                    Some(total)
                }
                _ => None,
            };
            transfer.received_bytes = transfer.received_bytes.max(received);
            transfer.status = DownloadStatus::Downloading;

            (transfer.received_bytes, transfer.total_bytes, newly_known)
        };

        let persisted = self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE downloads
                 SET received_bytes = ?1, status = ?2, total_bytes = COALESCE(?3, total_bytes)
                 WHERE id = ?4",
                rusqlite::params![
                    received as i64,
                    DownloadStatus::Downloading.as_str(),
                    newly_known.map(|total| total as i64),
                    id,
                ],
            )?;
            Ok(())
        });
        if let Err(e) = persisted {
            tracing::warn!(download_id = id, error = %e, "Failed to persist download progress");
        }

        self.windows.broadcast(DownloadEvent::Progress {
            id,
            received,
            total: total.unwrap_or(0),
            percent: percent(received, total),
            status: None,
        });
    }

    pub fn on_completed(&self, id: i64, received: u64) {
        let (received, _) = self.finish_transfer(id, received);

        let completed_at = timestamp(Utc::now());
        let persisted = self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE downloads
                 SET status = ?1, received_bytes = ?2, completed_at = ?3, error = NULL
                 WHERE id = ?4",
                rusqlite::params![
                    DownloadStatus::Completed.as_str(),
                    received as i64,
                    completed_at,
                    id,
                ],
            )?;
            Ok(())
        });
        if let Err(e) = persisted {
            tracing::warn!(download_id = id, error = %e, "Failed to persist download completion");
        }

        tracing::info!(download_id = id, received_bytes = received, "Download completed");
        self.windows.broadcast(DownloadEvent::Completed { id });
    }

    pub fn on_interrupted(&self, id: i64, received: u64) {
        self.fail_transfer(id, received, DownloadStatus::Interrupted, INTERRUPTED_MESSAGE);
    }

    pub fn on_cancelled(&self, id: i64, received: u64) {
        self.fail_transfer(id, received, DownloadStatus::Cancelled, CANCELLED_MESSAGE);
    }

    /// Pausing a finished transfer is a no-op
    pub fn on_paused(&self, id: i64) {
        match self.current_status(id) {
            Some(status) if status.is_terminal() => {
                tracing::warn!(download_id = id, status = %status, "Ignoring pause of finished download");
                return;
            }
            Some(DownloadStatus::Paused) => return,
            Some(_) => {}
            None => {
                tracing::warn!(download_id = id, "Ignoring pause of unknown download");
                return;
            }
        }

        self.set_paused(id, true);
    }

    pub fn on_resumed(&self, id: i64) {
        match self.current_status(id) {
            Some(DownloadStatus::Paused) => self.set_paused(id, false),
            Some(status) => {
                tracing::debug!(download_id = id, status = %status, "Ignoring resume of download that is not paused");
            }
            None => tracing::warn!(download_id = id, "Ignoring resume of unknown download"),
        }
    }

    pub fn get(&self, id: i64) -> Result<Download> {
        let download = self.db.with_connection(|conn| {
            let download = conn
                .query_row(
                    &format!("SELECT {} FROM downloads WHERE id = ?1", DOWNLOAD_COLUMNS),
                    [id],
                    row_to_download,
                )
                .optional()?;
            Ok(download)
        })?;

        download.ok_or(DownloadError::NotFound(id))
    }

    /// Newest first
    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<Download>> {
        let downloads = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM downloads
                 ORDER BY started_at DESC, id DESC
                 LIMIT ?1 OFFSET ?2",
                DOWNLOAD_COLUMNS
            ))?;
            let downloads = stmt
                .query_map([limit as i64, offset as i64], row_to_download)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(downloads)
        })?;

        Ok(downloads)
    }

    /// Remove a record. Returns `false` when nothing matched.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let removed = self.db.with_connection(|conn| {
            Ok(conn.execute("DELETE FROM downloads WHERE id = ?1", [id])?)
        })?;

        if removed > 0 {
            self.index.write().retain_ids(|indexed| indexed != id);
            self.active.lock().remove(&id);
            tracing::info!(download_id = id, "Deleted download");
        }

        Ok(removed > 0)
    }

    /// Remove every completed record
    pub fn clear_completed(&self) -> Result<usize> {
        let removed = self.db.transaction(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM downloads WHERE status = ?1")?;
            let ids = stmt
                .query_map([DownloadStatus::Completed.as_str()], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<HashSet<i64>>>()?;

            conn.execute(
                "DELETE FROM downloads WHERE status = ?1",
                [DownloadStatus::Completed.as_str()],
            )?;
            Ok(ids)
        })?;

        if !removed.is_empty() {
            self.index.write().retain_ids(|id| !removed.contains(&id));
        }

        tracing::info!(count = removed.len(), "Cleared completed downloads");
        Ok(removed.len())
    }

    fn insert_row(
        &self,
        filename: &str,
        url: &str,
        path: &Path,
        total_bytes: Option<u64>,
    ) -> Result<i64> {
        let started_at = timestamp(Utc::now());
        let path = path.to_string_lossy().to_string();

        let id = self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO downloads
                 (filename, url, path, total_bytes, received_bytes, status, started_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
                rusqlite::params![
                    filename,
                    url,
                    path,
                    total_bytes.map(|total| total as i64),
                    DownloadStatus::Downloading.as_str(),
                    started_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(id)
    }

    fn adopt_row(&self, id: i64, path: &Path, total_bytes: Option<u64>) -> Result<()> {
        let path = path.to_string_lossy().to_string();

        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE downloads
                 SET path = ?1, status = ?2, total_bytes = COALESCE(?3, total_bytes),
                     error = NULL, completed_at = NULL, paused_at = NULL
                 WHERE id = ?4",
                rusqlite::params![
                    path,
                    DownloadStatus::Downloading.as_str(),
                    total_bytes.map(|total| total as i64),
                    id,
                ],
            )?;
            Ok(())
        })?;

        Ok(())
    }

    /// Drop live state, returning the final received count and total
    fn finish_transfer(&self, id: i64, received: u64) -> (u64, Option<u64>) {
        match self.active.lock().remove(&id) {
            Some(transfer) => (transfer.received_bytes.max(received), transfer.total_bytes),
            None => (received, None),
        }
    }

    fn fail_transfer(&self, id: i64, received: u64, status: DownloadStatus, message: &str) {
        let (received, total) = self.finish_transfer(id, received);

        let persisted = self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE downloads SET status = ?1, received_bytes = ?2, error = ?3 WHERE id = ?4",
                rusqlite::params![status.as_str(), received as i64, message, id],
            )?;
            Ok(())
        });
        if let Err(e) = persisted {
            tracing::warn!(download_id = id, error = %e, "Failed to persist download failure");
        }

        tracing::info!(download_id = id, status = %status, "Download ended");

        self.windows.broadcast(DownloadEvent::Progress {
            id,
            received,
            total: total.unwrap_or(0),
            percent: 0.0,
            status: Some(status),
        });
    }

    fn current_status(&self, id: i64) -> Option<DownloadStatus> {
        if let Some(transfer) = self.active.lock().get(&id) {
            return Some(transfer.status);
        }

        match self.get(id) {
            Ok(download) => Some(download.status),
            Err(DownloadError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!(download_id = id, error = %e, "Failed to read download status");
                None
            }
        }
    }

    fn set_paused(&self, id: i64, paused: bool) {
        let status = if paused {
            DownloadStatus::Paused
        } else {
            DownloadStatus::Downloading
        };

        let snapshot = {
            let mut active = self.active.lock();
            active.get_mut(&id).map(|transfer| {
                transfer.status = status;
                (transfer.received_bytes, transfer.total_bytes)
            })
        };

        let paused_at = paused.then(|| timestamp(Utc::now()));
        let persisted = self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE downloads SET status = ?1, paused_at = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), paused_at, id],
            )?;
            Ok(())
        });
        if let Err(e) = persisted {
            tracing::warn!(download_id = id, error = %e, "Failed to persist download pause state");
        }

        tracing::info!(download_id = id, status = %status, "Download pause state changed");

        if let Some((received, total)) = snapshot {
            self.windows.broadcast(DownloadEvent::Progress {
                id,
                received,
                total: total.unwrap_or(0),
                percent: percent(received, total),
                status: Some(status),
            });
        }
    }
}

impl Clone for DownloadTracker {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            windows: self.windows.clone(),
            download_dir: self.download_dir.clone(),
            reconcile_window: self.reconcile_window,
            index: Arc::clone(&self.index),
            active: Arc::clone(&self.active),
        }
    }
}

const DOWNLOAD_COLUMNS: &str = "id, filename, url, path, total_bytes, received_bytes, status, \
                                error, started_at, completed_at, paused_at";

fn row_to_download(row: &rusqlite::Row<'_>) -> rusqlite::Result<Download> {
    let status_str: String = row.get(6)?;
    let status = status_str
        .parse()
        .unwrap_or(DownloadStatus::Interrupted);

    let started_str: String = row.get(8)?;
    let completed_str: Option<String> = row.get(9)?;
    let paused_str: Option<String> = row.get(10)?;

    Ok(Download {
        id: row.get(0)?,
        filename: row.get(1)?,
        url: row.get(2)?,
        path: row.get(3)?,
        total_bytes: row.get::<_, Option<i64>>(4)?.map(|total| total as u64),
        received_bytes: row.get::<_, i64>(5)? as u64,
        status,
        error: row.get(7)?,
        started_at: parse_timestamp(&started_str).unwrap_or_else(Utc::now),
        completed_at: completed_str.as_deref().and_then(parse_timestamp),
        paused_at: paused_str.as_deref().and_then(parse_timestamp),
    })
}

/// Fixed-width so text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .last()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn sanitize_file_name(file_name: &str) -> String {
    let name = Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download")
        .trim();

    if name.is_empty() {
        "download".to_string()
    } else {
        name.to_string()
    }
}
