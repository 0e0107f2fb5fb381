//! Mediator configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the database file
    pub database_path: PathBuf,
    /// Where engine transfers are saved
    pub download_dir: PathBuf,
    /// How often statistics are written to storage
    pub stats_flush_interval_ms: u64,
    /// Bounded capacity of each window's event channel
    pub event_channel_capacity: usize,
    /// Download rows scanned when rebuilding the reconciliation index
    pub reconcile_window: usize,
    /// Default page size for download listings
    pub download_page_size: usize,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        let download_dir = dirs::download_dir().unwrap_or_else(|| data_dir.join("Downloads"));

        Self {
            database_path: data_dir.join("catnip.db"),
            download_dir,
            stats_flush_interval_ms: 5_000,
            event_channel_capacity: catnip_download::DEFAULT_CHANNEL_CAPACITY,
            reconcile_window: catnip_download::DEFAULT_RECONCILE_WINDOW,
            download_page_size: 50,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Catnip"))
            .unwrap_or_else(|| PathBuf::from(".catnip"))
    }

    pub fn stats_flush_interval(&self) -> Duration {
        Duration::from_millis(self.stats_flush_interval_ms)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.stats_flush_interval_ms == 0 {
            return Err(crate::CoreError::Config(
                "stats_flush_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::CoreError::Config(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

// Platform directories from the environment
mod dirs {
    use std::path::PathBuf;

    fn env_dir(var: &str) -> Option<PathBuf> {
        std::env::var_os(var)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    fn home_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            env_dir("USERPROFILE")
        }
        #[cfg(not(target_os = "windows"))]
        {
            env_dir("HOME")
        }
    }

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            env_dir("LOCALAPPDATA")
        }
        #[cfg(target_os = "macos")]
        {
            home_dir().map(|h| h.join("Library/Application Support"))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            env_dir("XDG_DATA_HOME").or_else(|| home_dir().map(|h| h.join(".local/share")))
        }
    }

    pub fn download_dir() -> Option<PathBuf> {
        #[cfg(any(target_os = "windows", target_os = "macos"))]
        {
            home_dir().map(|h| h.join("Downloads"))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            env_dir("XDG_DOWNLOAD_DIR").or_else(|| home_dir().map(|h| h.join("Downloads")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new(PathBuf::from("/data"));
        assert_eq!(config.database_path, PathBuf::from("/data/catnip.db"));
        assert_eq!(config.stats_flush_interval(), Duration::from_secs(5));
        assert_eq!(config.event_channel_capacity, 64);
        assert_eq!(config.reconcile_window, 1000);
        assert_eq!(config.download_page_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"database_path": "/tmp/c.db", "stats_flush_interval_ms": 1000}"#)
                .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/c.db"));
        assert_eq!(config.stats_flush_interval(), Duration::from_secs(1));
        assert_eq!(config.download_page_size, 50);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::new(PathBuf::from("/data"));
        config.stats_flush_interval_ms = 0;
        assert!(matches!(config.validate(), Err(crate::CoreError::Config(_))));
    }
}
