//! Download record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Transfer in progress (initial)
    Downloading,
    /// Held by the user; returns to Downloading on resume
    Paused,
    Completed,
    Interrupted,
    Cancelled,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Interrupted => "interrupted",
            DownloadStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Interrupted | DownloadStatus::Cancelled
        )
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "downloading" => Ok(DownloadStatus::Downloading),
            "paused" => Ok(DownloadStatus::Paused),
            "completed" => Ok(DownloadStatus::Completed),
            "interrupted" => Ok(DownloadStatus::Interrupted),
            "cancelled" => Ok(DownloadStatus::Cancelled),
            _ => Err(format!("Unknown download status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
    pub id: i64,
    pub filename: String,
    pub url: String,
    pub path: String,
    /// Unknown until the engine reports it
    pub total_bytes: Option<u64>,
    pub received_bytes: u64,
    pub status: DownloadStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
}

impl Download {
    /// Progress as a percentage with two decimals
    pub fn percent(&self) -> f64 {
        percent(self.received_bytes, self.total_bytes)
    }
}

/// `received / total * 100` rounded to two decimals; 0 when the total is unknown or zero
pub fn percent(received: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => {
            let raw = received as f64 / total as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(50, Some(200)), 25.0);
        assert_eq!(percent(1, Some(3)), 33.33);
        assert_eq!(percent(2, Some(3)), 66.67);
        assert_eq!(percent(50, None), 0.0);
        assert_eq!(percent(50, Some(0)), 0.0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DownloadStatus::Downloading.is_terminal());
        assert!(!DownloadStatus::Paused.is_terminal());
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Interrupted.is_terminal());
        assert!(DownloadStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_parsing() {
        for status in [
            DownloadStatus::Downloading,
            DownloadStatus::Paused,
            DownloadStatus::Completed,
            DownloadStatus::Interrupted,
            DownloadStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<DownloadStatus>().unwrap(), status);
        }
        assert!("failed".parse::<DownloadStatus>().is_err());
    }
}
