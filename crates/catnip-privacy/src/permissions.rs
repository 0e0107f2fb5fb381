//! Permission broker
//!
//! | Permission    | Decision                                  |
//! | Fullscreen    | Always granted (media playback)           |
//! | Notifications | Denied when disable-notifications is set  |
//! | Geolocation   | Denied when disable-geolocation is set    |
//! | Anything else | Denied                                    |

use serde::{Deserialize, Serialize};

use crate::policy::PolicyConfiguration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionKind {
    Fullscreen,
    Notifications,
    Geolocation,
    Media,
    ClipboardRead,
    PointerLock,
    MidiSysex,
    OpenExternal,
    /// Any permission name this core does not know about
    Other(String),
}

impl PermissionKind {
    pub fn as_str(&self) -> &str {
        match self {
            PermissionKind::Fullscreen => "fullscreen",
            PermissionKind::Notifications => "notifications",
            PermissionKind::Geolocation => "geolocation",
            PermissionKind::Media => "media",
            PermissionKind::ClipboardRead => "clipboard-read",
            PermissionKind::PointerLock => "pointerLock",
            PermissionKind::MidiSysex => "midiSysex",
            PermissionKind::OpenExternal => "openExternal",
            PermissionKind::Other(name) => name,
        }
    }
}

impl std::str::FromStr for PermissionKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "fullscreen" => PermissionKind::Fullscreen,
            "notifications" => PermissionKind::Notifications,
            "geolocation" => PermissionKind::Geolocation,
            "media" => PermissionKind::Media,
            "clipboard-read" => PermissionKind::ClipboardRead,
            "pointerLock" => PermissionKind::PointerLock,
            "midiSysex" => PermissionKind::MidiSysex,
            "openExternal" => PermissionKind::OpenExternal,
            other => PermissionKind::Other(other.to_string()),
        })
    }
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Grant,
    Deny,
}

impl PermissionDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionDecision::Grant)
    }
}

#[derive(Debug, Default)]
pub struct PermissionBroker;

impl PermissionBroker {
    pub fn authorize(
        &self,
        kind: &PermissionKind,
        origin: Option<&str>,
        policy: &PolicyConfiguration,
    ) -> PermissionDecision {
        let (decision, reason) = match kind {
            PermissionKind::Fullscreen => (PermissionDecision::Grant, "media playback"),
            PermissionKind::Notifications if policy.disable_notifications => {
                (PermissionDecision::Deny, "notifications disabled")
            }
            PermissionKind::Geolocation if policy.disable_geolocation => {
                (PermissionDecision::Deny, "geolocation disabled")
            }
            _ => (PermissionDecision::Deny, "deny by default"),
        };

        tracing::debug!(
            permission = %kind,
            origin = origin.unwrap_or("unknown"),
            ?decision,
            reason,
            "Permission request"
        );

        decision
    }
}
