//! Data model for discovered model artifacts and derived values.
//!
//! Everything persisted is serde camelCase with defaulted optional fields so
//! old state files keep loading as the schema grows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Model family inferred from the filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Llama,
    Mistral,
    Phi,
    Gemma,
    Qwen,
    /// Fallback when no known family token matches
    Custom,
}

impl ModelFamily {
    /// All families with a dedicated keyword, in match priority order.
    pub const KNOWN: &'static [ModelFamily] = &[
        ModelFamily::Llama,
        ModelFamily::Mistral,
        ModelFamily::Phi,
        ModelFamily::Gemma,
        ModelFamily::Qwen,
    ];

    /// Return the canonical lowercase string for this family.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Llama => "llama",
            ModelFamily::Mistral => "mistral",
            ModelFamily::Phi => "phi",
            ModelFamily::Gemma => "gemma",
            ModelFamily::Qwen => "qwen",
            ModelFamily::Custom => "custom",
        }
    }

    /// Whether this is a recognized family (anything but the fallback).
    pub fn is_known(&self) -> bool {
        !matches!(self, ModelFamily::Custom)
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quantization tier inferred from the filename.
///
/// `Q4K` is the balanced default used when nothing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantTier {
    #[serde(rename = "q2")]
    Q2,
    #[serde(rename = "q3")]
    Q3,
    #[serde(rename = "q4")]
    Q4,
    #[serde(rename = "q4_k")]
    Q4K,
    #[serde(rename = "q5")]
    Q5,
    #[serde(rename = "q6")]
    Q6,
    #[serde(rename = "q8")]
    Q8,
    #[serde(rename = "fp16")]
    Fp16,
    #[serde(rename = "fp32")]
    Fp32,
}

impl QuantTier {
    /// Return the canonical lowercase string for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantTier::Q2 => "q2",
            QuantTier::Q3 => "q3",
            QuantTier::Q4 => "q4",
            QuantTier::Q4K => "q4_k",
            QuantTier::Q5 => "q5",
            QuantTier::Q6 => "q6",
            QuantTier::Q8 => "q8",
            QuantTier::Fp16 => "fp16",
            QuantTier::Fp32 => "fp32",
        }
    }
}

impl std::fmt::Display for QuantTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of an artifact. `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Discovered,
    Loaded,
    Unloaded,
    Deleted,
}

/// Where a performance profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Recorded by a host that actually benchmarked the model
    Measured,
    /// Derived heuristically from structural fields
    Estimated,
}

/// Per-artifact performance sub-scores, each 0-100.
///
/// Estimated profiles are non-authoritative; a host that benchmarks for real
/// overwrites them via `ModelScout::record_measured_profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceProfile {
    pub speed: u8,
    pub quality: u8,
    /// Higher means more memory pressure (inverted when scoring)
    pub memory_usage: u8,
    /// Higher means more battery drain (inverted when scoring)
    pub battery_impact: u8,
    pub creativity: u8,
    pub provenance: Provenance,
    pub last_evaluated: DateTime<Utc>,
}

/// One discovered candidate model file plus inferred/measured metadata.
///
/// Identity key is `path` (canonical absolute). Scores are never stored
/// here; they are recomputed per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArtifact {
    pub path: String,
    pub filename: String,
    pub size_bytes: u64,
    pub family: ModelFamily,
    pub quant_tier: QuantTier,
    pub parameter_count_billions: f64,
    pub context_length: u32,
    pub performance_profile: PerformanceProfile,
    pub lifecycle_state: LifecycleState,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recommended: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Enumerated purpose that parameterizes scoring weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseCase {
    Conversation,
    Reflection,
    Creative,
    Analysis,
    Learning,
}

impl UseCase {
    /// Return the canonical lowercase string for this use case.
    pub fn as_str(&self) -> &'static str {
        match self {
            UseCase::Conversation => "conversation",
            UseCase::Reflection => "reflection",
            UseCase::Creative => "creative",
            UseCase::Analysis => "analysis",
            UseCase::Learning => "learning",
        }
    }
}

impl std::str::FromStr for UseCase {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conversation" => Ok(UseCase::Conversation),
            "reflection" => Ok(UseCase::Reflection),
            "creative" => Ok(UseCase::Creative),
            "analysis" => Ok(UseCase::Analysis),
            "learning" => Ok(UseCase::Learning),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for UseCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Timestamped reading of device memory/battery used to gate decisions.
///
/// Stale after the configured TTL; load-gating callers must refresh first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilitySnapshot {
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
    pub battery_percent: u8,
    pub is_charging: bool,
    /// `min(available × safety factor, policy ceiling)`
    pub max_model_size_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

/// The highest-scoring artifact for a use case — ephemeral, derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub path: String,
    pub use_case: UseCase,
    pub score: f64,
    pub reason: String,
}

/// Aggregate registry statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_artifacts: usize,
    pub total_size_bytes: u64,
    /// 0 or 1 by the single-active-model invariant
    pub loaded_count: usize,
    pub average_quality: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_known() {
        assert!(ModelFamily::Llama.is_known());
        assert!(!ModelFamily::Custom.is_known());
        assert_eq!(ModelFamily::KNOWN.len(), 5);
    }

    #[test]
    fn test_use_case_roundtrip() {
        for uc in [
            UseCase::Conversation,
            UseCase::Reflection,
            UseCase::Creative,
            UseCase::Analysis,
            UseCase::Learning,
        ] {
            let parsed: UseCase = uc.as_str().parse().expect("should parse");
            assert_eq!(uc, parsed);
        }
        assert!("gaming".parse::<UseCase>().is_err());
    }

    #[test]
    fn test_quant_tier_serde_names() {
        let json = serde_json::to_string(&QuantTier::Q4K).unwrap();
        assert_eq!(json, "\"q4_k\"");
        let back: QuantTier = serde_json::from_str("\"fp16\"").unwrap();
        assert_eq!(back, QuantTier::Fp16);
    }

    #[test]
    fn test_artifact_serde_defaults() {
        // An artifact written before usage tracking existed still loads.
        let json = r#"{
            "path": "/m/a.gguf",
            "filename": "a.gguf",
            "sizeBytes": 42,
            "family": "llama",
            "quantTier": "q4_k",
            "parameterCountBillions": 7.0,
            "contextLength": 4096,
            "performanceProfile": {
                "speed": 60, "quality": 60, "memoryUsage": 40,
                "batteryImpact": 40, "creativity": 50,
                "provenance": "estimated",
                "lastEvaluated": "2024-01-01T00:00:00Z"
            },
            "lifecycleState": "discovered"
        }"#;
        let artifact: ModelArtifact = serde_json::from_str(json).unwrap();
        assert_eq!(artifact.usage_count, 0);
        assert!(artifact.last_used.is_none());
        assert!(artifact.tags.is_empty());
    }
}
