//! Catnip Privacy Protection
//!
//! Every outbound request and permission prompt raised by the rendering
//! engine passes through a [`Pipeline`]:
//! - tracker / ad blocking driven by the static [`classifier`] tables
//! - third-party cookie stripping (plus Do-Not-Track)
//! - third-party script blocking (off by default)
//! - HTTPS upgrade with a loopback exemption
//! - deny-by-default permission broker
//!
//! All pipelines read one [`SharedPolicy`] and write into one [`StatsAggregator`].

pub mod classifier;
mod fingerprint;
mod interceptors;
mod permissions;
mod pipeline;
mod policy;
mod request;
mod stats;

pub use classifier::{classify, ClassificationResult};
pub use fingerprint::{FingerprintProtection, FingerprintShield};
pub use interceptors::{
    HttpsUpgrader, RequestInterceptor, ThirdPartyCookieStripper, ThirdPartyScriptBlocker,
    TrackerBlocker, Verdict,
};
pub use permissions::{PermissionBroker, PermissionDecision, PermissionKind};
pub use pipeline::{Decision, Pipeline};
pub use policy::{PolicyConfiguration, PolicyUpdate, SharedPolicy};
pub use request::{HeaderBag, RequestDescriptor, ResourceKind};
pub use stats::{BlockKind, PrivacyStats, StatsAggregator, StatsState, TrackerCount};
