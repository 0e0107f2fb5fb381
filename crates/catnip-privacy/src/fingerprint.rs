//! Anti-fingerprinting plan
//!
//! Translates the fingerprint toggles into protections the engine
//! injects after a page finishes loading.

use serde::{Deserialize, Serialize};

use crate::policy::PolicyConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintProtection {
    /// Report a generic WebGL vendor and renderer
    SpoofWebGlVendor,
    /// Canvas export returns empty data
    BlankCanvasExport,
    /// Audio analyser frequency data is zeroed
    ZeroAudioAnalyser,
    /// Fixed hardware concurrency, device memory and platform
    NormalizeNavigator,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintShield {
    pub protections: Vec<FingerprintProtection>,
}

impl FingerprintShield {
    pub fn from_policy(policy: &PolicyConfiguration) -> Self {
        if !policy.block_fingerprinting {
            return Self::default();
        }

        let mut protections = Vec::new();
        if policy.disable_webgl {
            protections.push(FingerprintProtection::SpoofWebGlVendor);
        }
        if policy.disable_canvas {
            protections.push(FingerprintProtection::BlankCanvasExport);
        }
        if policy.disable_web_audio {
            protections.push(FingerprintProtection::ZeroAudioAnalyser);
        }
        protections.push(FingerprintProtection::NormalizeNavigator);

        Self { protections }
    }

    pub fn is_empty(&self) -> bool {
        self.protections.is_empty()
    }

    pub fn contains(&self, protection: FingerprintProtection) -> bool {
        self.protections.contains(&protection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_shield_is_empty() {
        let policy = PolicyConfiguration {
            block_fingerprinting: false,
            disable_canvas: true,
            ..Default::default()
        };
        assert!(FingerprintShield::from_policy(&policy).is_empty());
    }

    #[test]
    fn test_sub_toggles() {
        let defaults = FingerprintShield::from_policy(&PolicyConfiguration::default());
        assert_eq!(
            defaults.protections,
            vec![FingerprintProtection::NormalizeNavigator]
        );

        let strict = FingerprintShield::from_policy(&PolicyConfiguration {
            disable_webgl: true,
            disable_canvas: true,
            disable_web_audio: true,
            ..Default::default()
        });
        assert!(strict.contains(FingerprintProtection::SpoofWebGlVendor));
        assert!(strict.contains(FingerprintProtection::BlankCanvasExport));
        assert!(strict.contains(FingerprintProtection::ZeroAudioAnalyser));
        assert_eq!(strict.protections.len(), 4);
    }
}
