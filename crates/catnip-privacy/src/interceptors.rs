//! Request interceptors
//!
//! Each interceptor is consulted independently for every request. The
//! pre-send hook may cancel or redirect; the header hook may rewrite the
//! outgoing header bag. Parse failures never escape an interceptor.

use std::net::IpAddr;
use url::{Host, Url};

use crate::classifier::classify;
use crate::policy::PolicyConfiguration;
use crate::request::{HeaderBag, RequestDescriptor, ResourceKind};
use crate::stats::{BlockKind, StatsAggregator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Cancel,
    Redirect(String),
}

pub trait RequestInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pre-send phase
    fn before_request(
        &self,
        _request: &RequestDescriptor,
        _policy: &PolicyConfiguration,
        _stats: &StatsAggregator,
    ) -> Verdict {
        Verdict::Continue
    }

    /// Pre-headers-sent phase. Returns true when `headers` was changed.
    fn before_send_headers(
        &self,
        _request: &RequestDescriptor,
        _headers: &mut HeaderBag,
        _policy: &PolicyConfiguration,
        _stats: &StatsAggregator,
    ) -> bool {
        false
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Blocks requests the classifier marks as trackers or ads
#[derive(Debug, Default)]
pub struct TrackerBlocker;

impl RequestInterceptor for TrackerBlocker {
    fn name(&self) -> &'static str {
        "tracker-blocker"
    }

    fn before_request(
        &self,
        request: &RequestDescriptor,
        policy: &PolicyConfiguration,
        stats: &StatsAggregator,
    ) -> Verdict {
        if !policy.blocks_content() || request.kind.is_passive_media() {
            return Verdict::Continue;
        }

        let classification = classify(request);
        let tracker_hit = policy.block_trackers && classification.is_tracker();
        let ad_hit = policy.block_ads && classification.is_ad;

        if !tracker_hit && !ad_hit {
            return Verdict::Continue;
        }

        // Unparsable URLs are still blocked, just not counted
        if let Some(host) = request.host() {
            if tracker_hit {
                stats.record(BlockKind::Tracker, Some(&host));
            }
            if ad_hit {
                stats.record(BlockKind::Ad, Some(&host));
            }
        }

        tracing::debug!(
            url = %request.url,
            kind = %request.kind,
            tracker = tracker_hit,
            ad = ad_hit,
            "Blocked request"
        );

        Verdict::Cancel
    }
}

/// Strips cookies from cross-origin requests and adds Do-Not-Track
#[derive(Debug, Default)]
pub struct ThirdPartyCookieStripper;

impl ThirdPartyCookieStripper {
    /// A Referer that fails to parse counts as third-party
    fn is_cross_origin(request_url: &str, referer: &str) -> bool {
        match (Url::parse(request_url), Url::parse(referer)) {
            (Ok(target), Ok(referer)) => !same_origin(&target, &referer),
            _ => true,
        }
    }
}

impl RequestInterceptor for ThirdPartyCookieStripper {
    fn name(&self) -> &'static str {
        "third-party-cookie-stripper"
    }

    fn before_send_headers(
        &self,
        request: &RequestDescriptor,
        headers: &mut HeaderBag,
        policy: &PolicyConfiguration,
        stats: &StatsAggregator,
    ) -> bool {
        let mut changed = false;

        if policy.block_third_party_cookies {
            let referer = headers
                .get("Referer")
                .filter(|r| !r.is_empty())
                .map(str::to_string);

            if let Some(referer) = referer {
                if Self::is_cross_origin(&request.url, &referer) {
                    if headers.remove("Cookie") {
                        changed = true;
                    }
                    stats.record(BlockKind::ThirdPartyCookie, None);
                    tracing::debug!(url = %request.url, referer = %referer, "Stripped third-party cookie");
                }
            }
        }

        if policy.do_not_track && headers.get("DNT") != Some("1") {
            headers.set("DNT", "1");
            changed = true;
        }

        changed
    }
}

/// Blocks cross-origin scripts; off by default since it breaks more pages
#[derive(Debug, Default)]
pub struct ThirdPartyScriptBlocker;

impl RequestInterceptor for ThirdPartyScriptBlocker {
    fn name(&self) -> &'static str {
        "third-party-script-blocker"
    }

    fn before_request(
        &self,
        request: &RequestDescriptor,
        policy: &PolicyConfiguration,
        stats: &StatsAggregator,
    ) -> Verdict {
        if !policy.block_third_party_scripts || request.kind != ResourceKind::Script {
            return Verdict::Continue;
        }

        let Some(referrer) = request.referrer.as_deref().filter(|r| !r.is_empty()) else {
            return Verdict::Continue;
        };

        let (Ok(target), Ok(referrer)) = (Url::parse(&request.url), Url::parse(referrer)) else {
            return Verdict::Continue;
        };

        if same_origin(&target, &referrer) {
            return Verdict::Continue;
        }

        stats.record(BlockKind::ThirdPartyScript, target.host_str());
        tracing::debug!(url = %request.url, "Blocked third-party script");

        Verdict::Cancel
    }
}

/// Rewrites plain-HTTP requests to HTTPS, except loopback targets
#[derive(Debug, Default)]
pub struct HttpsUpgrader;

impl HttpsUpgrader {
    fn is_loopback(url: &Url) -> bool {
        match url.host() {
            Some(Host::Domain(domain)) => {
                let domain = domain.to_ascii_lowercase();
                domain == "localhost" || domain.ends_with(".localhost")
            }
            Some(Host::Ipv4(addr)) => IpAddr::V4(addr).is_loopback(),
            Some(Host::Ipv6(addr)) => IpAddr::V6(addr).is_loopback(),
            None => false,
        }
    }

    /// The HTTPS form of `url`, if it should be upgraded
    pub fn upgrade(url: &str) -> Option<String> {
        const PLAIN: &str = "http://";

        let scheme = url.get(..PLAIN.len())?;
        if !scheme.eq_ignore_ascii_case(PLAIN) {
            return None;
        }

        let parsed = Url::parse(url).ok()?;
        if Self::is_loopback(&parsed) {
            return None;
        }

        Some(format!("https://{}", &url[PLAIN.len()..]))
    }
}

impl RequestInterceptor for HttpsUpgrader {
    fn name(&self) -> &'static str {
        "https-upgrader"
    }

    fn before_request(
        &self,
        request: &RequestDescriptor,
        policy: &PolicyConfiguration,
        _stats: &StatsAggregator,
    ) -> Verdict {
        if !policy.https_only {
            return Verdict::Continue;
        }

        match Self::upgrade(&request.url) {
            Some(target) => {
                tracing::debug!(from = %request.url, to = %target, "Upgraded to HTTPS");
                Verdict::Redirect(target)
            }
            None => Verdict::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_on() -> PolicyConfiguration {
        PolicyConfiguration {
            https_only: true,
            block_third_party_scripts: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_tracker_blocker_counts_both_kinds() {
        let stats = StatsAggregator::new();
        let request = RequestDescriptor::new(
            "https://stats.doubleclick.net/collect",
            ResourceKind::Script,
        );

        assert_eq!(
            TrackerBlocker.before_request(&request, &all_on(), &stats),
            Verdict::Cancel
        );

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.trackers_blocked, 1);
        assert_eq!(snapshot.ads_blocked, 1);
        assert_eq!(snapshot.top_trackers[0].domain, "stats.doubleclick.net");
        assert_eq!(snapshot.top_trackers[0].count, 2);
    }

    #[test]
    fn test_tracker_blocker_spares_images_and_media() {
        let stats = StatsAggregator::new();
        for kind in [ResourceKind::Image, ResourceKind::Media] {
            let request = RequestDescriptor::new("https://doubleclick.net/pixel", kind);
            assert_eq!(
                TrackerBlocker.before_request(&request, &all_on(), &stats),
                Verdict::Continue
            );
        }
        assert_eq!(stats.snapshot().total_blocked(), 0);
    }

    #[test]
    fn test_tracker_blocker_respects_toggles() {
        let stats = StatsAggregator::new();
        let policy = PolicyConfiguration {
            block_trackers: false,
            block_ads: false,
            ..Default::default()
        };
        let request = RequestDescriptor::new("https://doubleclick.net/ads.js", ResourceKind::Script);

        assert_eq!(
            TrackerBlocker.before_request(&request, &policy, &stats),
            Verdict::Continue
        );

        // Only ads enabled: a pure tracking script is not an ad
        let ads_only = PolicyConfiguration {
            block_trackers: false,
            ..Default::default()
        };
        let script = RequestDescriptor::new("https://cdn.example.com/gtag-loader.js", ResourceKind::Script);
        assert_eq!(
            TrackerBlocker.before_request(&script, &ads_only, &stats),
            Verdict::Continue
        );
    }

    #[test]
    fn test_tracker_blocker_with_trackers_only() {
        let stats = StatsAggregator::new();
        let trackers_only = PolicyConfiguration {
            block_trackers: true,
            block_ads: false,
            ..Default::default()
        };
        let request = RequestDescriptor::new(
            "https://www.google-analytics.com/collect",
            ResourceKind::Script,
        );

        assert_eq!(
            TrackerBlocker.before_request(&request, &trackers_only, &stats),
            Verdict::Cancel
        );

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.trackers_blocked, 1);
        assert_eq!(snapshot.ads_blocked, 0);
    }

    #[test]
    fn test_tracker_blocker_blocks_unparsable_url_without_counting() {
        let stats = StatsAggregator::new();
        let request = RequestDescriptor::new("doubleclick.net/ads.js", ResourceKind::Script);
        assert_eq!(request.host(), None);

        assert_eq!(
            TrackerBlocker.before_request(&request, &all_on(), &stats),
            Verdict::Cancel
        );
        assert_eq!(stats.snapshot().total_blocked(), 0);
        assert!(stats.snapshot().top_trackers.is_empty());
    }

    #[test]
    fn test_cookie_stripped_on_cross_origin_referer() {
        let stats = StatsAggregator::new();
        let request = RequestDescriptor::new("https://api.other.com/data", ResourceKind::Other)
            .with_header("Cookie", "session=1")
            .with_header("Referer", "https://example.com/page");
        let mut headers = request.headers.clone();

        let changed =
            ThirdPartyCookieStripper.before_send_headers(&request, &mut headers, &all_on(), &stats);

        assert!(changed);
        assert!(!headers.contains("Cookie"));
        assert_eq!(headers.get("DNT"), Some("1"));
        assert_eq!(stats.snapshot().third_party_cookies_blocked, 1);
    }

    #[test]
    fn test_cookie_stripped_on_unparsable_referer() {
        let stats = StatsAggregator::new();
        let request = RequestDescriptor::new("https://example.com/a", ResourceKind::Other)
            .with_header("Cookie", "session=1")
            .with_header("Referer", "not a url");
        let mut headers = request.headers.clone();

        ThirdPartyCookieStripper.before_send_headers(&request, &mut headers, &all_on(), &stats);

        assert!(!headers.contains("Cookie"));
        assert_eq!(stats.snapshot().third_party_cookies_blocked, 1);
    }

    #[test]
    fn test_cookie_kept_on_same_origin_and_without_referer() {
        let stats = StatsAggregator::new();
        let policy = PolicyConfiguration {
            do_not_track: false,
            ..Default::default()
        };

        let same = RequestDescriptor::new("https://example.com/api", ResourceKind::Other)
            .with_header("Cookie", "session=1")
            .with_header("Referer", "https://example.com/page");
        let mut headers = same.headers.clone();
        assert!(!ThirdPartyCookieStripper.before_send_headers(&same, &mut headers, &policy, &stats));
        assert_eq!(headers.get("Cookie"), Some("session=1"));

        let no_referer = RequestDescriptor::new("https://example.com/api", ResourceKind::Other)
            .with_header("Cookie", "session=1");
        let mut headers = no_referer.headers.clone();
        assert!(!ThirdPartyCookieStripper.before_send_headers(
            &no_referer,
            &mut headers,
            &policy,
            &stats
        ));
        assert!(headers.contains("Cookie"));

        assert_eq!(stats.snapshot().third_party_cookies_blocked, 0);
    }

    #[test]
    fn test_dnt_is_independent_of_cookie_toggle() {
        let stats = StatsAggregator::new();
        let policy = PolicyConfiguration {
            block_third_party_cookies: false,
            ..Default::default()
        };
        let request = RequestDescriptor::new("https://api.other.com/", ResourceKind::Other)
            .with_header("Cookie", "a=1")
            .with_header("Referer", "https://example.com/");
        let mut headers = request.headers.clone();

        assert!(ThirdPartyCookieStripper.before_send_headers(&request, &mut headers, &policy, &stats));
        assert!(headers.contains("Cookie"));
        assert_eq!(headers.get("DNT"), Some("1"));
    }

    #[test]
    fn test_third_party_script_blocker() {
        let stats = StatsAggregator::new();
        let policy = all_on();

        let cross = RequestDescriptor::new("https://cdn.other.com/lib.js", ResourceKind::Script)
            .with_referrer("https://example.com/");
        assert_eq!(
            ThirdPartyScriptBlocker.before_request(&cross, &policy, &stats),
            Verdict::Cancel
        );

        let same = RequestDescriptor::new("https://example.com/app.js", ResourceKind::Script)
            .with_referrer("https://example.com/");
        assert_eq!(
            ThirdPartyScriptBlocker.before_request(&same, &policy, &stats),
            Verdict::Continue
        );

        let no_referrer = RequestDescriptor::new("https://cdn.other.com/lib.js", ResourceKind::Script);
        assert_eq!(
            ThirdPartyScriptBlocker.before_request(&no_referrer, &policy, &stats),
            Verdict::Continue
        );

        let image = RequestDescriptor::new("https://cdn.other.com/a.png", ResourceKind::Image)
            .with_referrer("https://example.com/");
        assert_eq!(
            ThirdPartyScriptBlocker.before_request(&image, &policy, &stats),
            Verdict::Continue
        );

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.third_party_scripts_blocked, 1);
        assert_eq!(snapshot.top_trackers[0].domain, "cdn.other.com");
    }

    #[test]
    fn test_third_party_script_blocker_off_by_default() {
        let stats = StatsAggregator::new();
        let cross = RequestDescriptor::new("https://cdn.other.com/lib.js", ResourceKind::Script)
            .with_referrer("https://example.com/");
        assert_eq!(
            ThirdPartyScriptBlocker.before_request(&cross, &PolicyConfiguration::default(), &stats),
            Verdict::Continue
        );
    }

    #[test]
    fn test_https_upgrade() {
        assert_eq!(
            HttpsUpgrader::upgrade("http://example.com/x"),
            Some("https://example.com/x".to_string())
        );
        assert_eq!(HttpsUpgrader::upgrade("http://localhost/x"), None);
        assert_eq!(HttpsUpgrader::upgrade("http://localhost:5173/"), None);
        assert_eq!(HttpsUpgrader::upgrade("http://127.0.0.1/x"), None);
        assert_eq!(HttpsUpgrader::upgrade("http://127.0.0.2:8080/x"), None);
        assert_eq!(HttpsUpgrader::upgrade("http://[::1]/x"), None);
        assert_eq!(HttpsUpgrader::upgrade("https://example.com/x"), None);
        assert_eq!(HttpsUpgrader::upgrade("ftp://example.com/x"), None);
    }

    #[test]
    fn test_https_upgrader_respects_toggle() {
        let stats = StatsAggregator::new();
        let request = RequestDescriptor::new("http://example.com/x", ResourceKind::Document);

        assert_eq!(
            HttpsUpgrader.before_request(&request, &PolicyConfiguration::default(), &stats),
            Verdict::Continue
        );
        assert_eq!(
            HttpsUpgrader.before_request(&request, &all_on(), &stats),
            Verdict::Redirect("https://example.com/x".to_string())
        );
    }
}
