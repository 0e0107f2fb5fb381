//! Privacy policy configuration
//!
//! A flat set of toggles. Updates are merged into a complete new
//! configuration and swapped in as a whole; readers always see either
//! the old or the new configuration, never a mix.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyConfiguration {
    pub block_trackers: bool,
    pub block_ads: bool,
    pub block_fingerprinting: bool,
    pub https_only: bool,
    pub block_third_party_cookies: bool,
    pub block_third_party_scripts: bool,
    pub clear_data_on_exit: bool,
    pub do_not_track: bool,
    pub disable_webgl: bool,
    pub disable_canvas: bool,
    pub disable_web_audio: bool,
    pub disable_notifications: bool,
    pub disable_geolocation: bool,
}

impl Default for PolicyConfiguration {
    fn default() -> Self {
        Self {
            block_trackers: true,
            block_ads: true,
            block_fingerprinting: true,
            https_only: false,
            block_third_party_cookies: true,
            block_third_party_scripts: false,
            clear_data_on_exit: true,
            do_not_track: true,
            disable_webgl: false,
            disable_canvas: false,
            disable_web_audio: false,
            disable_notifications: true,
            disable_geolocation: true,
        }
    }
}

/// Partial update; `None` leaves a toggle untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyUpdate {
    pub block_trackers: Option<bool>,
    pub block_ads: Option<bool>,
    pub block_fingerprinting: Option<bool>,
    pub https_only: Option<bool>,
    pub block_third_party_cookies: Option<bool>,
    pub block_third_party_scripts: Option<bool>,
    pub clear_data_on_exit: Option<bool>,
    pub do_not_track: Option<bool>,
    pub disable_webgl: Option<bool>,
    pub disable_canvas: Option<bool>,
    pub disable_web_audio: Option<bool>,
    pub disable_notifications: Option<bool>,
    pub disable_geolocation: Option<bool>,
}

impl PolicyConfiguration {
    /// Produce a new configuration with `update` merged over `self`
    pub fn merged(&self, update: &PolicyUpdate) -> PolicyConfiguration {
        let pick = |new: Option<bool>, old: bool| new.unwrap_or(old);

        PolicyConfiguration {
            block_trackers: pick(update.block_trackers, self.block_trackers),
            block_ads: pick(update.block_ads, self.block_ads),
            block_fingerprinting: pick(update.block_fingerprinting, self.block_fingerprinting),
            https_only: pick(update.https_only, self.https_only),
            block_third_party_cookies: pick(
                update.block_third_party_cookies,
                self.block_third_party_cookies,
            ),
            block_third_party_scripts: pick(
                update.block_third_party_scripts,
                self.block_third_party_scripts,
            ),
            clear_data_on_exit: pick(update.clear_data_on_exit, self.clear_data_on_exit),
            do_not_track: pick(update.do_not_track, self.do_not_track),
            disable_webgl: pick(update.disable_webgl, self.disable_webgl),
            disable_canvas: pick(update.disable_canvas, self.disable_canvas),
            disable_web_audio: pick(update.disable_web_audio, self.disable_web_audio),
            disable_notifications: pick(update.disable_notifications, self.disable_notifications),
            disable_geolocation: pick(update.disable_geolocation, self.disable_geolocation),
        }
    }

    /// Whether the tracker/ad rule has anything to do
    pub fn blocks_content(&self) -> bool {
        self.block_trackers || self.block_ads
    }
}

/// Process-wide policy cell shared by every pipeline.
///
/// Cloning yields another handle to the same cell, so one `apply`
/// is observed by the default pipeline and every container at once.
#[derive(Debug, Clone, Default)]
pub struct SharedPolicy {
    current: Arc<RwLock<Arc<PolicyConfiguration>>>,
}

impl SharedPolicy {
    pub fn new(initial: PolicyConfiguration) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// The configuration in effect right now
    pub fn snapshot(&self) -> Arc<PolicyConfiguration> {
        Arc::clone(&self.current.read())
    }

    /// Merge `update` into the current configuration and swap it in
    pub fn apply(&self, update: &PolicyUpdate) -> Arc<PolicyConfiguration> {
        let mut current = self.current.write();
        let next = Arc::new(current.merged(update));
        *current = Arc::clone(&next);

        tracing::info!(policy = ?next, "Applied privacy policy");

        next
    }

    /// Swap in a complete configuration
    pub fn replace(&self, config: PolicyConfiguration) -> Arc<PolicyConfiguration> {
        let next = Arc::new(config);
        *self.current.write() = Arc::clone(&next);
        next
    }
}
