//! Request descriptors handed over by the rendering engine

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Script,
    Image,
    Media,
    Stylesheet,
    Font,
    Other,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Document => "document",
            ResourceKind::Script => "script",
            ResourceKind::Image => "image",
            ResourceKind::Media => "media",
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Font => "font",
            ResourceKind::Other => "other",
        }
    }

    /// Layout-critical kinds are never classified
    pub fn is_layout_critical(&self) -> bool {
        matches!(self, ResourceKind::Stylesheet | ResourceKind::Font)
    }

    /// Images and media are never blocked by the tracker rule
    pub fn is_passive_media(&self) -> bool {
        matches!(self, ResourceKind::Image | ResourceKind::Media)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = std::convert::Infallible;

    /// Accepts the engine's resource type names; anything unknown is `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "document" | "mainframe" | "subframe" => ResourceKind::Document,
            "script" => ResourceKind::Script,
            "image" => ResourceKind::Image,
            "media" => ResourceKind::Media,
            "stylesheet" | "style" => ResourceKind::Stylesheet,
            "font" => ResourceKind::Font,
            _ => ResourceKind::Other,
        })
    }
}

/// Ordered, case-insensitive header collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderBag {
    entries: Vec<(String, String)>,
}

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace any existing value for `name`
    pub fn set(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Remove every value for `name`, returning whether anything was removed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = HeaderBag::new();
        for (key, value) in iter {
            bag.set(&key.into(), &value.into());
        }
        bag
    }
}

/// Immutable snapshot of one outbound request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub kind: ResourceKind,
    /// Initiator reported by the engine; softer than the Referer header and often absent
    pub referrer: Option<String>,
    pub headers: HeaderBag,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            url: url.into(),
            kind,
            referrer: None,
            headers: HeaderBag::new(),
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Hostname of the target, if the URL parses
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}
