//! Static request classification
//!
//! Pure substring matching against the lower-cased URL. Nothing here
//! performs I/O or keeps state; a missed match only means a request
//! is not blocked.

use serde::{Deserialize, Serialize};

use crate::request::{RequestDescriptor, ResourceKind};

/// Known tracking and advertising infrastructure (EasyList / EasyPrivacy derived)
pub const TRACKER_DOMAINS: &[&str] = &[
    // Google
    "doubleclick.net",
    "googleadservices.com",
    "googlesyndication.com",
    "google-analytics.com",
    "googletagmanager.com",
    "googletagservices.com",
    "googleadapis.com",
    "gstatic.com/analytics",
    "google.com/ads",
    "google.com/analytics",
    // Facebook
    "facebook.com/tr",
    "facebook.com/connect",
    "facebook.net",
    "facebookads.com",
    "fbcdn.net",
    "fb.com",
    // Amazon
    "amazon-adsystem.com",
    "amazon.com/ads",
    "assoc-amazon.com",
    // Microsoft
    "bing.com/maps",
    "live.com/analytics",
    "microsoftadvertising.com",
    "msads.net",
    // Adobe
    "omniture.com",
    "2o7.net",
    "adobe.com/analytics",
    "demdex.net",
    // Measurement and ad exchanges
    "scorecardresearch.com",
    "quantserve.com",
    "advertising.com",
    "adsafeprotected.com",
    "moatads.com",
    "outbrain.com",
    "taboola.com",
    "adnxs.com",
    "rubiconproject.com",
    "pubmatic.com",
    "openx.net",
    "criteo.com",
    "bluekai.com",
    "crwdcntrl.net",
    "rlcdn.com",
    "serving-sys.com",
    "adform.com",
    "casalemedia.com",
    "adtechus.com",
    "media.net",
    "adfox.ru",
    "adsrvr.org",
    "brealtime.com",
    // Analytics and marketing automation
    "chartbeat.com",
    "clicktale.net",
    "crazyegg.com",
    "hotjar.com",
    "mixpanel.com",
    "segment.io",
    "segment.com",
    "newrelic.com",
    "optimizely.com",
    "uservoice.com",
    "zendesk.com",
    "pardot.com",
    "marketo.com",
    "marketo.net",
    "hubspot.com/analytics",
    "salesforce.com/analytics",
    "salesforce.com/api",
    "adroll.com",
    "klaviyo.com",
    "mailchimp.com/track",
    // Ad CDNs
    "cdnjs.cloudflare.com/ajax/libs/analytics",
    "cdn.ampproject.org/rtv",
    // Third-party ad supply
    "sharethrough.com",
    "teads.tv",
    "yieldmo.com",
    "33across.com",
    "contextweb.com",
    "districtm.io",
    "freewheel.tv",
    "indexexchange.com",
    "lockerdome.com",
    "sonobi.com",
    "synacor.com",
    "tremorhub.com",
    "triplelift.com",
    "video.unrulymedia.com",
    "w55c.net",
];

/// Common tracker, analytics and ad endpoint shapes
pub const TRACKER_PATTERNS: &[&str] = &[
    "/analytics.js",
    "/analytics.min.js",
    "/gtm.js",
    "/gtag.js",
    "/ga.js",
    "/gaq.js",
    "/facebook.js",
    "/facebook-pixel",
    "/pixel.js",
    "/tracking.js",
    "/track.js",
    "/beacon",
    "/click",
    "/impression",
    "/event",
    "/collect",
    "/pageview",
    "/ads.js",
    "/advertisement.js",
    "/advertising.js",
    "/banner.js",
    "/adsense",
    "/adserving",
    "/adservice",
    "/adsystem",
    "/tracker",
    "/tracking",
    "/analytics",
    "/metrics",
    "/stats",
    "/pixel",
];

/// Tokens that mark a script as a tracking script
pub const TRACKING_SCRIPT_TOKENS: &[&str] = &[
    "analytics",
    "tracking",
    "tracker",
    "pixel",
    "beacon",
    "gtm",
    "gtag",
    "facebook-pixel",
    "facebook.com/tr",
    "doubleclick",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_tracker_domain: bool,
    pub has_tracker_pattern: bool,
    pub is_tracking_script: bool,
    pub is_ad: bool,
}

impl ClassificationResult {
    pub fn is_tracker(&self) -> bool {
        self.is_tracker_domain || self.is_tracking_script
    }

    /// Nothing matched
    pub fn is_clean(&self) -> bool {
        *self == ClassificationResult::default()
    }
}

/// Classify a request against the static tables
pub fn classify(request: &RequestDescriptor) -> ClassificationResult {
    if request.kind.is_layout_critical() {
        return ClassificationResult::default();
    }

    let url = request.url.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|needle| url.contains(needle));

    let is_tracker_domain = contains_any(TRACKER_DOMAINS);
    let has_tracker_pattern = contains_any(TRACKER_PATTERNS);
    let is_tracking_script =
        request.kind == ResourceKind::Script && contains_any(TRACKING_SCRIPT_TOKENS);

    ClassificationResult {
        is_tracker_domain,
        has_tracker_pattern,
        is_tracking_script,
        is_ad: has_tracker_pattern || is_tracker_domain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, kind: ResourceKind) -> RequestDescriptor {
        RequestDescriptor::new(url, kind)
    }

    #[test]
    fn test_tracker_domain() {
        let result = classify(&request(
            "https://www.Google-Analytics.com/collect?v=1",
            ResourceKind::Other,
        ));
        assert!(result.is_tracker_domain);
        assert!(result.has_tracker_pattern);
        assert!(result.is_tracker());
        assert!(result.is_ad);
        assert!(!result.is_tracking_script);
    }

    #[test]
    fn test_layout_critical_kinds_are_clean() {
        for kind in [ResourceKind::Stylesheet, ResourceKind::Font] {
            let result = classify(&request(
                "https://doubleclick.net/analytics/pixel.js",
                kind,
            ));
            assert!(result.is_clean());
            assert!(!result.is_tracker());
            assert!(!result.is_ad);
        }
    }

    #[test]
    fn test_tracking_script_requires_script_kind() {
        let url = "https://cdn.example.com/js/gtag-loader.js";

        let script = classify(&request(url, ResourceKind::Script));
        assert!(script.is_tracking_script);
        assert!(script.is_tracker());
        assert!(!script.is_ad);

        let image = classify(&request(url, ResourceKind::Image));
        assert!(!image.is_tracking_script);
        assert!(!image.is_tracker());
    }

    #[test]
    fn test_pattern_only_is_ad_not_tracker() {
        let result = classify(&request(
            "https://news.example.com/ads.js",
            ResourceKind::Document,
        ));
        assert!(result.has_tracker_pattern);
        assert!(result.is_ad);
        assert!(!result.is_tracker());
    }

    #[test]
    fn test_clean_request() {
        let result = classify(&request(
            "https://example.com/index.html",
            ResourceKind::Document,
        ));
        assert!(result.is_clean());
    }

    #[test]
    fn test_every_tracker_domain_is_detected() {
        for domain in TRACKER_DOMAINS {
            let url = format!("https://{}/x", domain.to_uppercase());
            assert!(
                classify(&request(&url, ResourceKind::Other)).is_tracker_domain,
                "{domain} not detected"
            );
        }
    }
}
