//! Policy enforcement pipeline
//!
//! Runs every installed interceptor against the same policy snapshot.
//! Pre-send verdicts combine as: any cancel blocks, otherwise the first
//! redirect wins, otherwise the request is allowed.

use std::sync::Arc;

use crate::interceptors::{
    HttpsUpgrader, RequestInterceptor, ThirdPartyCookieStripper, ThirdPartyScriptBlocker,
    TrackerBlocker, Verdict,
};
use crate::permissions::{PermissionBroker, PermissionDecision, PermissionKind};
use crate::policy::{PolicyConfiguration, SharedPolicy};
use crate::request::{HeaderBag, RequestDescriptor};
use crate::stats::StatsAggregator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block,
    Redirect(String),
    /// Forward the request with these headers instead of the original ones
    Modify(HeaderBag),
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Block)
    }
}

pub struct Pipeline {
    interceptors: Vec<Box<dyn RequestInterceptor>>,
    broker: PermissionBroker,
    policy: SharedPolicy,
    stats: Arc<StatsAggregator>,
}

impl Pipeline {
    pub fn new(policy: SharedPolicy, stats: Arc<StatsAggregator>) -> Self {
        Self {
            interceptors: Vec::new(),
            broker: PermissionBroker,
            policy,
            stats,
        }
    }

    /// Pipeline with the full interceptor set installed
    pub fn standard(policy: SharedPolicy, stats: Arc<StatsAggregator>) -> Self {
        Self::new(policy, stats)
            .with_interceptor(TrackerBlocker)
            .with_interceptor(ThirdPartyCookieStripper)
            .with_interceptor(ThirdPartyScriptBlocker)
            .with_interceptor(HttpsUpgrader)
    }

    pub fn with_interceptor<I: RequestInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    pub fn interceptor_names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub fn policy(&self) -> Arc<PolicyConfiguration> {
        self.policy.snapshot()
    }

    /// Pre-send phase: block, redirect or allow
    pub fn on_before_request(&self, request: &RequestDescriptor) -> Decision {
        let policy = self.policy.snapshot();
        self.before_request_with(request, &policy)
    }

    /// Pre-headers-sent phase: modify or allow
    pub fn on_before_send_headers(&self, request: &RequestDescriptor) -> Decision {
        let policy = self.policy.snapshot();
        self.before_send_headers_with(request, &policy)
    }

    /// Both phases against one policy snapshot
    pub fn decide(&self, request: &RequestDescriptor) -> Decision {
        let policy = self.policy.snapshot();

        match self.before_request_with(request, &policy) {
            Decision::Allow => self.before_send_headers_with(request, &policy),
            decision => decision,
        }
    }

    pub fn authorize(&self, kind: &PermissionKind, origin: Option<&str>) -> PermissionDecision {
        let policy = self.policy.snapshot();
        self.broker.authorize(kind, origin, &policy)
    }

    fn before_request_with(
        &self,
        request: &RequestDescriptor,
        policy: &PolicyConfiguration,
    ) -> Decision {
        let mut blocked = false;
        let mut redirect = None;

        // No short-circuit: every interceptor sees the request
        for interceptor in &self.interceptors {
            match interceptor.before_request(request, policy, &self.stats) {
                Verdict::Continue => {}
                Verdict::Cancel => blocked = true,
                Verdict::Redirect(target) => {
                    redirect.get_or_insert(target);
                }
            }
        }

        if blocked {
            Decision::Block
        } else if let Some(target) = redirect {
            Decision::Redirect(target)
        } else {
            Decision::Allow
        }
    }

    fn before_send_headers_with(
        &self,
        request: &RequestDescriptor,
        policy: &PolicyConfiguration,
    ) -> Decision {
        let mut headers = request.headers.clone();
        let mut changed = false;

        for interceptor in &self.interceptors {
            changed |= interceptor.before_send_headers(request, &mut headers, policy, &self.stats);
        }

        if changed {
            Decision::Modify(headers)
        } else {
            Decision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyUpdate;
    use crate::request::ResourceKind;

    fn pipeline(config: PolicyConfiguration) -> (Pipeline, SharedPolicy, Arc<StatsAggregator>) {
        let policy = SharedPolicy::new(config);
        let stats = Arc::new(StatsAggregator::new());
        let pipeline = Pipeline::standard(policy.clone(), Arc::clone(&stats));
        (pipeline, policy, stats)
    }

    #[test]
    fn test_standard_interceptors_installed() {
        let (pipeline, _, _) = pipeline(PolicyConfiguration::default());
        assert_eq!(
            pipeline.interceptor_names(),
            vec![
                "tracker-blocker",
                "third-party-cookie-stripper",
                "third-party-script-blocker",
                "https-upgrader"
            ]
        );
    }

    #[test]
    fn test_block_wins_over_redirect() {
        let (pipeline, _, _) = pipeline(PolicyConfiguration {
            https_only: true,
            ..Default::default()
        });

        let tracker = RequestDescriptor::new("http://doubleclick.net/ad", ResourceKind::Script);
        assert_eq!(pipeline.on_before_request(&tracker), Decision::Block);

        let page = RequestDescriptor::new("http://example.com/", ResourceKind::Document);
        assert_eq!(
            pipeline.on_before_request(&page),
            Decision::Redirect("https://example.com/".to_string())
        );
    }

    #[test]
    fn test_never_blocks_when_content_blocking_disabled() {
        let (pipeline, _, stats) = pipeline(PolicyConfiguration {
            block_trackers: false,
            block_ads: false,
            ..Default::default()
        });

        for (url, kind) in [
            ("https://google-analytics.com/analytics.js", ResourceKind::Script),
            ("https://doubleclick.net/pixel", ResourceKind::Other),
            ("https://example.com/ads.js", ResourceKind::Document),
        ] {
            let request = RequestDescriptor::new(url, kind);
            assert!(!pipeline.on_before_request(&request).is_blocked());
        }
        assert_eq!(stats.snapshot().trackers_blocked, 0);
        assert_eq!(stats.snapshot().ads_blocked, 0);
    }

    #[test]
    fn test_decide_modifies_headers_after_allow() {
        let (pipeline, _, _) = pipeline(PolicyConfiguration::default());

        let request = RequestDescriptor::new("https://api.example.org/v1", ResourceKind::Other)
            .with_header("Cookie", "id=42")
            .with_header("Referer", "https://example.com/");

        match pipeline.decide(&request) {
            Decision::Modify(headers) => {
                assert!(!headers.contains("Cookie"));
                assert_eq!(headers.get("DNT"), Some("1"));
                assert_eq!(headers.get("Referer"), Some("https://example.com/"));
            }
            other => panic!("expected header modification, got {other:?}"),
        }
    }

    #[test]
    fn test_policy_swap_is_observed_without_reinstall() {
        let (pipeline, policy, _) = pipeline(PolicyConfiguration::default());
        let page = RequestDescriptor::new("http://example.com/", ResourceKind::Document);

        assert_eq!(pipeline.on_before_request(&page), Decision::Allow);

        policy.apply(&PolicyUpdate {
            https_only: Some(true),
            ..Default::default()
        });

        assert!(matches!(pipeline.on_before_request(&page), Decision::Redirect(_)));
    }

    #[test]
    fn test_authorize_reads_live_policy() {
        let (pipeline, policy, _) = pipeline(PolicyConfiguration::default());

        assert_eq!(
            pipeline.authorize(&PermissionKind::Fullscreen, None),
            PermissionDecision::Grant
        );
        assert_eq!(
            pipeline.authorize(&PermissionKind::Geolocation, None),
            PermissionDecision::Deny
        );

        policy.apply(&PolicyUpdate {
            disable_geolocation: Some(false),
            ..Default::default()
        });
        assert_eq!(
            pipeline.authorize(&PermissionKind::Geolocation, None),
            PermissionDecision::Deny
        );
    }
}
