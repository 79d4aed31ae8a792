//! Use-case scoring and candidate selection.
//!
//! Scoring is a pure function of `(artifact, snapshot, use_case, now)` —
//! the wall clock only feeds the recency term and is passed in explicitly so
//! tests can pin it.

use crate::types::{
    DeviceCapabilitySnapshot, LifecycleState, ModelArtifact, QuantTier, Recommendation, UseCase,
};
use chrono::{DateTime, Utc};

/// Scale applied to the use-case-weighted term (its share of the 0-100 range).
const WEIGHTED_TERM_SCALE: f64 = 0.62;
/// Bonus for utilization inside the target band.
const UTILIZATION_BONUS: f64 = 15.0;
/// Target band for `size / budget`.
const UTILIZATION_BAND: (f64, f64) = (0.5, 0.8);
/// Bonus for a known model family.
const FAMILY_BONUS: f64 = 5.0;
/// Peak recency bonus, decaying with days since last use.
const RECENCY_BONUS: f64 = 7.0;
/// Half-life-ish constant for recency decay, in days.
const RECENCY_DECAY_DAYS: f64 = 7.0;
/// Multiplier for artifacts over budget. Keeps relative order among the
/// oversized for diagnostics; selection filters them out regardless.
const OVERSIZED_FACTOR: f64 = 0.05;

/// Injectable wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-use-case weights over the performance sub-scores. Each row sums to 1.
struct Weights {
    speed: f64,
    quality: f64,
    memory: f64,
    battery: f64,
    creativity: f64,
}

fn weights_for(use_case: UseCase) -> Weights {
    match use_case {
        // Balanced, but quality leads: a sluggish answer beats a bad one
        UseCase::Conversation => Weights {
            speed: 0.25,
            quality: 0.45,
            memory: 0.08,
            battery: 0.07,
            creativity: 0.15,
        },
        // Depth over latency; speed barely matters
        UseCase::Reflection => Weights {
            speed: 0.05,
            quality: 0.55,
            memory: 0.10,
            battery: 0.10,
            creativity: 0.20,
        },
        UseCase::Creative => Weights {
            speed: 0.15,
            quality: 0.30,
            memory: 0.05,
            battery: 0.10,
            creativity: 0.40,
        },
        UseCase::Analysis => Weights {
            speed: 0.10,
            quality: 0.55,
            memory: 0.15,
            battery: 0.10,
            creativity: 0.10,
        },
        UseCase::Learning => Weights {
            speed: 0.20,
            quality: 0.40,
            memory: 0.10,
            battery: 0.15,
            creativity: 0.15,
        },
    }
}

fn quant_bonus(tier: QuantTier) -> f64 {
    match tier {
        // Mid-tier quantization is the balance point
        QuantTier::Q4K => 8.0,
        QuantTier::Q4 | QuantTier::Q5 => 4.0,
        QuantTier::Q3 | QuantTier::Q6 => 2.0,
        _ => 0.0,
    }
}

/// Score an artifact for a use case against a capability snapshot, in
/// `[0, 100]`.
///
/// Artifacts over `max_model_size_bytes` are multiplied down to a
/// disqualifying remnant rather than merely reduced; [`select`] additionally
/// refuses to pick them at all.
pub fn score(
    artifact: &ModelArtifact,
    snapshot: &DeviceCapabilitySnapshot,
    use_case: UseCase,
    now: DateTime<Utc>,
) -> f64 {
    let w = weights_for(use_case);
    let p = &artifact.performance_profile;

    let weighted = w.speed * f64::from(p.speed)
        + w.quality * f64::from(p.quality)
        + w.memory * f64::from(100 - p.memory_usage.min(100))
        + w.battery * f64::from(100 - p.battery_impact.min(100))
        + w.creativity * f64::from(p.creativity);

    let mut total = WEIGHTED_TERM_SCALE * weighted;

    if in_utilization_band(artifact.size_bytes, snapshot.max_model_size_bytes) {
        total += UTILIZATION_BONUS;
    }
    total += quant_bonus(artifact.quant_tier);
    if artifact.family.is_known() {
        total += FAMILY_BONUS;
    }
    total += recency_bonus(artifact.last_used, now);

    let mut score = total.clamp(0.0, 100.0);
    if artifact.size_bytes > snapshot.max_model_size_bytes {
        score *= OVERSIZED_FACTOR;
    }
    score
}

fn in_utilization_band(size_bytes: u64, budget_bytes: u64) -> bool {
    if budget_bytes == 0 {
        return false;
    }
    let ratio = size_bytes as f64 / budget_bytes as f64;
    ratio >= UTILIZATION_BAND.0 && ratio <= UTILIZATION_BAND.1
}

/// Monotonically decaying bonus for recently used artifacts.
fn recency_bonus(last_used: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(last_used) = last_used else {
        return 0.0;
    };
    let days = (now - last_used).num_seconds().max(0) as f64 / 86_400.0;
    RECENCY_BONUS * (-days / RECENCY_DECAY_DAYS).exp()
}

/// Pick the best in-budget candidate for a use case.
///
/// Oversized artifacts are excluded outright (capacity gate). Ties break by
/// most recent `last_used`, then by smaller size.
pub fn select(
    artifacts: &[ModelArtifact],
    snapshot: &DeviceCapabilitySnapshot,
    use_case: UseCase,
    now: DateTime<Utc>,
) -> Option<Recommendation> {
    let mut best: Option<(&ModelArtifact, f64)> = None;

    for artifact in artifacts {
        if artifact.lifecycle_state == LifecycleState::Deleted {
            continue;
        }
        if artifact.size_bytes > snapshot.max_model_size_bytes {
            continue;
        }
        let candidate_score = score(artifact, snapshot, use_case, now);
        let replace = match best {
            None => true,
            Some((current, current_score)) => {
                if candidate_score != current_score {
                    candidate_score > current_score
                } else if artifact.last_used != current.last_used {
                    artifact.last_used > current.last_used
                } else {
                    artifact.size_bytes < current.size_bytes
                }
            }
        };
        if replace {
            best = Some((artifact, candidate_score));
        }
    }

    best.map(|(artifact, best_score)| Recommendation {
        path: artifact.path.clone(),
        use_case,
        score: best_score,
        reason: describe(artifact, snapshot, use_case),
    })
}

fn describe(
    artifact: &ModelArtifact,
    snapshot: &DeviceCapabilitySnapshot,
    use_case: UseCase,
) -> String {
    let utilization = if snapshot.max_model_size_bytes > 0 {
        artifact.size_bytes as f64 / snapshot.max_model_size_bytes as f64 * 100.0
    } else {
        0.0
    };
    let band = if in_utilization_band(artifact.size_bytes, snapshot.max_model_size_bytes) {
        "in the target band"
    } else {
        "outside the target band"
    };
    format!(
        "best {} fit: {} family, {} quant, {:.0}% of budget ({})",
        use_case.as_str(),
        artifact.family,
        artifact.quant_tier,
        utilization,
        band
    )
}
