//! Blocking statistics
//!
//! Shared by every pipeline. Counter and histogram updates happen under
//! one mutex so a composite update is never observed half-applied.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Tracker,
    Ad,
    ThirdPartyCookie,
    ThirdPartyScript,
}

/// Durable form of the aggregator state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsState {
    pub trackers_blocked: u64,
    pub ads_blocked: u64,
    pub third_party_cookies_blocked: u64,
    pub third_party_scripts_blocked: u64,
    pub top_trackers: HashMap<String, u64>,
    pub last_updated: DateTime<Utc>,
}

impl Default for StatsState {
    fn default() -> Self {
        Self {
            trackers_blocked: 0,
            ads_blocked: 0,
            third_party_cookies_blocked: 0,
            third_party_scripts_blocked: 0,
            top_trackers: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerCount {
    pub domain: String,
    pub count: u64,
}

/// Report view: counters plus the histogram sorted by count, descending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyStats {
    pub trackers_blocked: u64,
    pub ads_blocked: u64,
    pub third_party_cookies_blocked: u64,
    pub third_party_scripts_blocked: u64,
    pub top_trackers: Vec<TrackerCount>,
    pub last_updated: DateTime<Utc>,
}

impl PrivacyStats {
    pub fn total_blocked(&self) -> u64 {
        self.trackers_blocked
            + self.ads_blocked
            + self.third_party_cookies_blocked
            + self.third_party_scripts_blocked
    }
}

#[derive(Debug, Default)]
pub struct StatsAggregator {
    state: Mutex<StatsState>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously persisted counters
    pub fn from_state(state: StatsState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Count one block of `kind`, attributing it to `domain` when known
    pub fn record(&self, kind: BlockKind, domain: Option<&str>) {
        let mut state = self.state.lock();

        match kind {
            BlockKind::Tracker => state.trackers_blocked += 1,
            BlockKind::Ad => state.ads_blocked += 1,
            BlockKind::ThirdPartyCookie => state.third_party_cookies_blocked += 1,
            BlockKind::ThirdPartyScript => state.third_party_scripts_blocked += 1,
        }

        if let Some(domain) = domain {
            *state.top_trackers.entry(domain.to_string()).or_insert(0) += 1;
        }

        state.last_updated = Utc::now();
    }

    pub fn snapshot(&self) -> PrivacyStats {
        let state = self.state.lock();

        let mut top_trackers: Vec<TrackerCount> = state
            .top_trackers
            .iter()
            .map(|(domain, count)| TrackerCount {
                domain: domain.clone(),
                count: *count,
            })
            .collect();
        // Ties broken by domain so the report is stable
        top_trackers.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain)));

        PrivacyStats {
            trackers_blocked: state.trackers_blocked,
            ads_blocked: state.ads_blocked,
            third_party_cookies_blocked: state.third_party_cookies_blocked,
            third_party_scripts_blocked: state.third_party_scripts_blocked,
            top_trackers,
            last_updated: state.last_updated,
        }
    }

    /// Copy of the raw state for persistence
    pub fn state(&self) -> StatsState {
        self.state.lock().clone()
    }

    /// Replace the whole state, e.g. after loading from storage
    pub fn restore(&self, state: StatsState) {
        *self.state.lock() = state;
    }

    /// Zero every counter and clear the histogram
    pub fn reset(&self) {
        *self.state.lock() = StatsState::default();
        tracing::info!("Reset privacy statistics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_record_and_snapshot_ordering() {
        let stats = StatsAggregator::new();

        stats.record(BlockKind::Tracker, Some("a.example"));
        stats.record(BlockKind::Ad, Some("b.example"));
        stats.record(BlockKind::Ad, Some("b.example"));
        stats.record(BlockKind::ThirdPartyCookie, None);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.trackers_blocked, 1);
        assert_eq!(snapshot.ads_blocked, 2);
        assert_eq!(snapshot.third_party_cookies_blocked, 1);
        assert_eq!(snapshot.third_party_scripts_blocked, 0);
        assert_eq!(snapshot.total_blocked(), 4);

        let domains: Vec<_> = snapshot.top_trackers.iter().map(|t| t.domain.as_str()).collect();
        assert_eq!(domains, vec!["b.example", "a.example"]);
        assert_eq!(snapshot.top_trackers[0].count, 2);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let stats = StatsAggregator::new();
        stats.record(BlockKind::ThirdPartyScript, Some("cdn.example"));
        stats.record(BlockKind::Tracker, Some("t.example"));

        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_blocked(), 0);
        assert!(snapshot.top_trackers.is_empty());

        // Still zero on a second read
        assert_eq!(stats.snapshot().total_blocked(), 0);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let stats = StatsAggregator::new();
        let threads = 16;
        let per_thread = 500;

        thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| {
                    for _ in 0..per_thread {
                        stats.record(BlockKind::Tracker, Some("hot.example"));
                    }
                });
            }
        });

        let snapshot = stats.snapshot();
        let expected = (threads * per_thread) as u64;
        assert_eq!(snapshot.trackers_blocked, expected);
        assert_eq!(snapshot.top_trackers[0].count, expected);
    }

    #[test]
    fn test_restore_round_trips_through_json() {
        let stats = StatsAggregator::new();
        stats.record(BlockKind::Ad, Some("ads.example"));

        let json = serde_json::to_string(&stats.state()).unwrap();
        let restored = StatsAggregator::from_state(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.snapshot(), stats.snapshot());
    }
}
