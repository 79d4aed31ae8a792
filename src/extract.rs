//! Metadata extraction from raw file descriptors.
//!
//! Pure, deterministic heuristics over `(filename, size)` — identical input
//! always yields identical structural output, and parsing never fails:
//! ambiguous attributes resolve to conservative defaults.

use crate::scanner::RawFileDescriptor;
use crate::types::{
    LifecycleState, ModelArtifact, ModelFamily, PerformanceProfile, Provenance, QuantTier,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Default parameter count (billions) when no `7b`-style token matches.
const DEFAULT_PARAMS_B: f64 = 7.0;
/// Default context window when no `4k`-style token matches.
const DEFAULT_CONTEXT: u32 = 4096;

/// Quant tier pattern: `q2`..`q8` with an optional `_k` suffix.
static QUANT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"q([2-8])(_k)?").unwrap());

/// Parameter count pattern: digits immediately followed by `b`, bounded so
/// `128k` or `v2beta` never match.
static PARAMS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9a-z])(\d+(?:\.\d+)?)b(?:[^a-z0-9]|$)").unwrap());

/// Context length pattern: `4k`/`8k`/`16k`/`32k` with digit boundaries so
/// `128k` does not read as `28k`.
static CONTEXT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])(4|8|16|32)k(?:[^a-z0-9]|$)").unwrap());

/// Descriptive filename tokens worth keeping as artifact tags.
const TAG_TOKENS: &[&str] = &["instruct", "chat", "code", "vision", "uncensored"];

/// Split a filename into lowercase alphanumeric tokens.
pub(crate) fn tokenize(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Infer the model family from filename tokens (fallback: Custom).
pub fn infer_family(filename: &str) -> ModelFamily {
    let tokens = tokenize(filename);
    for family in ModelFamily::KNOWN {
        if tokens.iter().any(|t| t.starts_with(family.as_str())) {
            return *family;
        }
    }
    ModelFamily::Custom
}

/// Infer the quantization tier from filename substrings (fallback: Q4K).
pub fn infer_quant_tier(filename: &str) -> QuantTier {
    let lower = filename.to_lowercase();
    if lower.contains("fp32") {
        return QuantTier::Fp32;
    }
    if lower.contains("fp16") {
        return QuantTier::Fp16;
    }
    if let Some(caps) = QUANT_PATTERN.captures(&lower) {
        let digit = caps.get(1).map(|m| m.as_str()).unwrap_or("4");
        let has_k = caps.get(2).is_some();
        return match digit {
            "2" => QuantTier::Q2,
            "3" => QuantTier::Q3,
            "4" if has_k => QuantTier::Q4K,
            "4" => QuantTier::Q4,
            "5" => QuantTier::Q5,
            "6" => QuantTier::Q6,
            "8" => QuantTier::Q8,
            _ => QuantTier::Q4K,
        };
    }
    QuantTier::Q4K
}

/// Infer the parameter count in billions from `7b`/`13B` tokens (fallback 7).
pub fn infer_parameter_count(filename: &str) -> f64 {
    let lower = filename.to_lowercase();
    if let Some(caps) = PARAMS_PATTERN.captures(&lower) {
        if let Ok(count) = caps[1].parse::<f64>() {
            return count.clamp(0.1, 500.0);
        }
    }
    DEFAULT_PARAMS_B
}

/// Infer the context length from `4k`..`32k` tokens (fallback 4096).
pub fn infer_context_length(filename: &str) -> u32 {
    let lower = filename.to_lowercase();
    if let Some(caps) = CONTEXT_PATTERN.captures(&lower) {
        if let Ok(thousands) = caps[1].parse::<u32>() {
            return thousands * 1024;
        }
    }
    DEFAULT_CONTEXT
}

/// Whether a filename carries a plausible model-name token. Used by the
/// scanner for large files with unknown extensions.
pub(crate) fn has_model_token(filename: &str) -> bool {
    let tokens = tokenize(filename);
    tokens.iter().any(|t| {
        ModelFamily::KNOWN
            .iter()
            .any(|family| t.starts_with(family.as_str()))
            || matches!(t.as_str(), "model" | "gguf" | "ggml" | "llm")
    })
}

/// Turn a raw descriptor into a structured artifact.
///
/// The performance profile is estimated (never measured here) and is itself
/// a pure function of the structural fields, so rescans of an unchanged file
/// reproduce it exactly.
pub fn extract(descriptor: &RawFileDescriptor, now: DateTime<Utc>) -> ModelArtifact {
    let family = infer_family(&descriptor.filename);
    let quant_tier = infer_quant_tier(&descriptor.filename);
    let parameter_count_billions = infer_parameter_count(&descriptor.filename);
    let context_length = infer_context_length(&descriptor.filename);

    let mut tags = BTreeSet::new();
    for token in tokenize(&descriptor.filename) {
        if TAG_TOKENS.contains(&token.as_str()) {
            tags.insert(token);
        }
    }

    ModelArtifact {
        path: descriptor.path.to_string_lossy().to_string(),
        filename: descriptor.filename.clone(),
        size_bytes: descriptor.size_bytes,
        family,
        quant_tier,
        parameter_count_billions,
        context_length,
        performance_profile: estimate_profile(
            family,
            quant_tier,
            parameter_count_billions,
            descriptor.size_bytes,
            now,
        ),
        lifecycle_state: LifecycleState::Discovered,
        usage_count: 0,
        last_used: None,
        recommended: false,
        tags,
    }
}

/// Conservative estimated performance profile.
///
/// Deterministic: bigger/denser models read slower and hungrier but higher
/// quality; aggressive quantization trades quality for speed.
pub fn estimate_profile(
    family: ModelFamily,
    quant: QuantTier,
    params_b: f64,
    size_bytes: u64,
    now: DateTime<Utc>,
) -> PerformanceProfile {
    let size_gb = size_bytes as f64 / (1024.0 * 1024.0 * 1024.0);

    let (speed_offset, quality_offset) = match quant {
        QuantTier::Q2 => (5.0, -15.0),
        QuantTier::Q3 => (3.0, -8.0),
        QuantTier::Q4 => (0.0, -3.0),
        QuantTier::Q4K => (0.0, 0.0),
        QuantTier::Q5 => (-2.0, 2.0),
        QuantTier::Q6 => (-4.0, 4.0),
        QuantTier::Q8 => (-8.0, 6.0),
        QuantTier::Fp16 => (-15.0, 8.0),
        QuantTier::Fp32 => (-25.0, 8.0),
    };

    let creativity_offset = match family {
        ModelFamily::Llama => 5.0,
        ModelFamily::Mistral => 6.0,
        ModelFamily::Qwen => 4.0,
        ModelFamily::Gemma => 3.0,
        ModelFamily::Phi => 2.0,
        ModelFamily::Custom => 0.0,
    };

    let speed = 95.0 - params_b * 3.5 + speed_offset;
    let quality = 35.0 + params_b * 4.0 + quality_offset;
    let memory_usage = size_gb * 9.0 + 5.0;
    let battery_impact = size_gb * 7.0 + params_b;
    let creativity = 50.0 + params_b * 2.0 + creativity_offset;

    PerformanceProfile {
        speed: clamp_score(speed),
        quality: clamp_score(quality),
        memory_usage: clamp_score(memory_usage),
        battery_impact: clamp_score(battery_impact),
        creativity: clamp_score(creativity),
        provenance: Provenance::Estimated,
        last_evaluated: now,
    }
}

fn clamp_score(value: f64) -> u8 {
    value.round().clamp(5.0, 95.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor(filename: &str, size: u64) -> RawFileDescriptor {
        RawFileDescriptor {
            path: PathBuf::from(format!("/models/{filename}")),
            filename: filename.to_string(),
            size_bytes: size,
        }
    }

    #[test]
    fn test_family_inference() {
        assert_eq!(infer_family("llama-2-7b-chat.Q4_K_M.gguf"), ModelFamily::Llama);
        assert_eq!(infer_family("Mistral-7B-Instruct.gguf"), ModelFamily::Mistral);
        assert_eq!(infer_family("phi-3-mini-4k.gguf"), ModelFamily::Phi);
        assert_eq!(infer_family("gemma-2b.gguf"), ModelFamily::Gemma);
        assert_eq!(infer_family("qwen2-7b.gguf"), ModelFamily::Qwen);
        assert_eq!(infer_family("mystery-model.bin"), ModelFamily::Custom);
        // Token prefixes, not raw substrings: "delphi" is not a phi model
        assert_eq!(infer_family("delphi-compiler-output.bin"), ModelFamily::Custom);
    }

    #[test]
    fn test_quant_inference() {
        assert_eq!(infer_quant_tier("llama-7b.Q4_K_M.gguf"), QuantTier::Q4K);
        assert_eq!(infer_quant_tier("llama-7b.Q4_0.gguf"), QuantTier::Q4);
        assert_eq!(infer_quant_tier("model-q2.gguf"), QuantTier::Q2);
        assert_eq!(infer_quant_tier("model-Q8_0.gguf"), QuantTier::Q8);
        assert_eq!(infer_quant_tier("model-fp16.safetensors"), QuantTier::Fp16);
        assert_eq!(infer_quant_tier("model-FP32.bin"), QuantTier::Fp32);
        // Fallback is the balanced default
        assert_eq!(infer_quant_tier("plain-model.gguf"), QuantTier::Q4K);
    }

    #[test]
    fn test_parameter_inference() {
        assert_eq!(infer_parameter_count("llama-2-7b.gguf"), 7.0);
        assert_eq!(infer_parameter_count("model-13B-chat.gguf"), 13.0);
        assert_eq!(infer_parameter_count("tiny-1.1b.gguf"), 1.1);
        assert_eq!(infer_parameter_count("no-size-here.gguf"), DEFAULT_PARAMS_B);
        // `128k` must not be read as a parameter count
        assert_eq!(infer_parameter_count("model-128k.gguf"), DEFAULT_PARAMS_B);
    }

    #[test]
    fn test_context_inference() {
        assert_eq!(infer_context_length("phi-3-mini-4k-instruct.gguf"), 4096);
        assert_eq!(infer_context_length("model-8k.gguf"), 8192);
        assert_eq!(infer_context_length("model-16k.gguf"), 16384);
        assert_eq!(infer_context_length("model-32k.gguf"), 32768);
        assert_eq!(infer_context_length("model.gguf"), DEFAULT_CONTEXT);
        // 128k is outside the recognized set; falls back rather than
        // misreading the trailing 8k
        assert_eq!(infer_context_length("model-128k.gguf"), DEFAULT_CONTEXT);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let now = Utc::now();
        let d = descriptor("llama-2-13b-chat.Q5_K_M.gguf", 9_000_000_000);
        let a = extract(&d, now);
        let b = extract(&d, now);
        assert_eq!(a, b);
        assert_eq!(a.family, ModelFamily::Llama);
        assert_eq!(a.quant_tier, QuantTier::Q5);
        assert_eq!(a.parameter_count_billions, 13.0);
        assert!(a.tags.contains("chat"));
        assert_eq!(a.performance_profile.provenance, Provenance::Estimated);
        assert_eq!(a.lifecycle_state, LifecycleState::Discovered);
    }

    #[test]
    fn test_profile_tracks_structure() {
        let now = Utc::now();
        let small = estimate_profile(ModelFamily::Llama, QuantTier::Q4K, 3.0, 2 << 30, now);
        let large = estimate_profile(ModelFamily::Llama, QuantTier::Q4K, 13.0, 9 << 30, now);
        assert!(small.speed > large.speed);
        assert!(large.quality > small.quality);
        assert!(large.memory_usage > small.memory_usage);
        assert!(large.battery_impact > small.battery_impact);
    }

    #[test]
    fn test_model_token_detection() {
        assert!(has_model_token("llama-weights.dat"));
        assert!(has_model_token("my_model_v2.blob"));
        assert!(has_model_token("qwen2.part"));
        assert!(!has_model_token("holiday-video.mp4"));
        assert!(!has_model_token("database.sqlite"));
    }
}
