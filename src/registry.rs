//! In-memory artifact registry and lifecycle state machine.
//!
//! The registry is the single source of truth: "loaded" is a key into the
//! map, never a second copy of the artifact. At most one artifact is Loaded
//! at any instant, and rescans merge rather than overwrite — usage history
//! and measured profiles survive.

use crate::error::{Result, ScoutError};
use crate::types::{
    LifecycleState, ModelArtifact, PerformanceProfile, Provenance, RegistryStats,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

/// Authoritative catalog of known artifacts, keyed by canonical path.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: HashMap<String, ModelArtifact>,
    loaded: Option<String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts, repairing any invariant violations
    /// (duplicate Loaded flags, a pointer at a missing or unloaded entry).
    pub fn from_parts(entries: HashMap<String, ModelArtifact>, loaded: Option<String>) -> Self {
        let mut registry = Self { entries, loaded };

        // The pointer must reference an existing entry
        if let Some(path) = registry.loaded.clone() {
            if !registry.entries.contains_key(&path) {
                registry.loaded = None;
            }
        }
        // Exactly the pointed-at entry may be Loaded
        for (path, artifact) in registry.entries.iter_mut() {
            let should_be_loaded = registry.loaded.as_deref() == Some(path.as_str());
            if artifact.lifecycle_state == LifecycleState::Loaded && !should_be_loaded {
                artifact.lifecycle_state = LifecycleState::Unloaded;
            } else if should_be_loaded {
                artifact.lifecycle_state = LifecycleState::Loaded;
            }
        }
        registry
    }

    pub fn get(&self, path: &str) -> Option<&ModelArtifact> {
        self.entries.get(path)
    }

    /// All artifacts, sorted by path for stable output.
    pub fn all(&self) -> Vec<ModelArtifact> {
        let mut artifacts: Vec<_> = self.entries.values().cloned().collect();
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        artifacts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical path of the currently loaded artifact, if any.
    pub fn loaded_path(&self) -> Option<&str> {
        self.loaded.as_deref()
    }

    /// Snapshot of the entries map for persistence.
    pub fn entries(&self) -> &HashMap<String, ModelArtifact> {
        &self.entries
    }

    /// Merge a freshly scanned artifact.
    ///
    /// Unknown paths insert as Discovered. Known paths refresh structural
    /// fields only when the size changed, and an Estimated profile is then
    /// re-estimated; `usage_count`, `last_used`, `lifecycle_state`, `tags`,
    /// and any Measured profile are always preserved. Returns true when the
    /// path was new.
    pub fn upsert_scanned(&mut self, incoming: ModelArtifact) -> bool {
        match self.entries.get_mut(&incoming.path) {
            None => {
                debug!("Discovered new artifact: {}", incoming.path);
                self.entries.insert(incoming.path.clone(), incoming);
                true
            }
            Some(existing) => {
                existing.filename = incoming.filename;
                if existing.size_bytes != incoming.size_bytes {
                    debug!(
                        "Artifact changed on disk ({} -> {} bytes): {}",
                        existing.size_bytes, incoming.size_bytes, existing.path
                    );
                    existing.size_bytes = incoming.size_bytes;
                    existing.family = incoming.family;
                    existing.quant_tier = incoming.quant_tier;
                    existing.parameter_count_billions = incoming.parameter_count_billions;
                    existing.context_length = incoming.context_length;
                    if existing.performance_profile.provenance == Provenance::Estimated {
                        existing.performance_profile = incoming.performance_profile;
                    }
                }
                false
            }
        }
    }

    /// Mark an artifact Loaded, demoting whichever other artifact held the
    /// flag. Capacity must already have been checked by the caller; this
    /// only enforces existence and the single-active invariant.
    pub fn mark_loaded(&mut self, path: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.entries.contains_key(path) {
            return Err(ScoutError::ModelNotFound {
                path: path.to_string(),
            });
        }

        if let Some(previous) = self.loaded.take() {
            if previous != path {
                if let Some(artifact) = self.entries.get_mut(&previous) {
                    artifact.lifecycle_state = LifecycleState::Unloaded;
                }
            }
        }

        let artifact = self.entries.get_mut(path).expect("checked above");
        artifact.lifecycle_state = LifecycleState::Loaded;
        artifact.usage_count += 1;
        artifact.last_used = Some(now);
        self.loaded = Some(path.to_string());

        info!("Loaded model: {}", path);
        Ok(())
    }

    /// Clear the Loaded flag wherever it sits. Idempotent.
    pub fn clear_loaded(&mut self) {
        if let Some(path) = self.loaded.take() {
            if let Some(artifact) = self.entries.get_mut(&path) {
                artifact.lifecycle_state = LifecycleState::Unloaded;
            }
            info!("Unloaded model: {}", path);
        }
    }

    /// Remove an entry (terminal Deleted transition). Returns the removed
    /// artifact; clears the loaded pointer when it pointed here.
    pub fn remove(&mut self, path: &str) -> Option<ModelArtifact> {
        let mut removed = self.entries.remove(path)?;
        removed.lifecycle_state = LifecycleState::Deleted;
        if self.loaded.as_deref() == Some(path) {
            self.loaded = None;
            info!("Deleted the loaded model: {}", path);
        }
        Some(removed)
    }

    /// Overwrite an artifact's profile with measured figures.
    pub fn record_measured_profile(
        &mut self,
        path: &str,
        mut profile: PerformanceProfile,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let artifact = self
            .entries
            .get_mut(path)
            .ok_or_else(|| ScoutError::ModelNotFound {
                path: path.to_string(),
            })?;
        profile.provenance = Provenance::Measured;
        profile.last_evaluated = now;
        artifact.performance_profile = profile;
        Ok(())
    }

    /// Mark exactly one artifact as the current recommendation.
    pub fn set_recommended(&mut self, path: &str) {
        for (key, artifact) in self.entries.iter_mut() {
            artifact.recommended = key == path;
        }
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> RegistryStats {
        let total_artifacts = self.entries.len();
        let total_size_bytes = self.entries.values().map(|a| a.size_bytes).sum();
        let loaded_count = usize::from(self.loaded.is_some());
        let average_quality = if total_artifacts == 0 {
            0.0
        } else {
            self.entries
                .values()
                .map(|a| f64::from(a.performance_profile.quality))
                .sum::<f64>()
                / total_artifacts as f64
        };
        RegistryStats {
            total_artifacts,
            total_size_bytes,
            loaded_count,
            average_quality,
        }
    }
}
