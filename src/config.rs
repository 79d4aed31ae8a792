//! Engine configuration.
//!
//! Search roots are injected by the host's platform layer rather than
//! hardcoded: the engine itself stays platform-agnostic. The only built-in
//! default is the application-private data directory.

use crate::probe::DeviceClass;
use std::path::PathBuf;
use std::time::Duration;

/// Fixed engine parameters.
pub struct EngineDefaults;

impl EngineDefaults {
    /// How long a capability snapshot may gate decisions before a refresh.
    pub const SNAPSHOT_TTL: Duration = Duration::from_secs(30);
    /// Coalescing window for durable registry writes.
    pub const FLUSH_DEBOUNCE: Duration = Duration::from_secs(2);
    /// Absolute cap on model size regardless of free memory.
    pub const POLICY_CEILING_BYTES: u64 = 12 * 1024 * 1024 * 1024;
    /// Retained entries in the recommendation history log.
    pub const HISTORY_LIMIT: usize = 200;
}

/// Fixed scanner parameters.
pub struct ScanDefaults;

impl ScanDefaults {
    /// Recursion cap per root.
    pub const MAX_DEPTH: usize = 6;
    /// Below this size a file needs an extension match, not just a token.
    pub const SIZE_FLOOR_BYTES: u64 = 100 * 1024 * 1024;
}

/// Injectable engine configuration.
///
/// `state_dir` holds the persisted registry and history log. `scan_roots`
/// come from the platform-abstraction collaborator (an app-private tree plus
/// any user-granted external paths).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub state_dir: PathBuf,
    pub scan_roots: Vec<PathBuf>,
    pub max_scan_depth: usize,
    pub size_floor_bytes: u64,
    pub snapshot_ttl: Duration,
    pub flush_debounce: Duration,
    pub device_class: DeviceClass,
    pub policy_ceiling_bytes: u64,
    pub history_limit: usize,
}

impl EngineConfig {
    /// Build a configuration with defaults rooted at `state_dir`.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            scan_roots: default_scan_roots(&state_dir),
            state_dir,
            max_scan_depth: ScanDefaults::MAX_DEPTH,
            size_floor_bytes: ScanDefaults::SIZE_FLOOR_BYTES,
            snapshot_ttl: EngineDefaults::SNAPSHOT_TTL,
            flush_debounce: EngineDefaults::FLUSH_DEBOUNCE,
            device_class: DeviceClass::Standard,
            policy_ceiling_bytes: EngineDefaults::POLICY_CEILING_BYTES,
            history_limit: EngineDefaults::HISTORY_LIMIT,
        }
    }

    /// Replace the search roots supplied by the platform layer.
    pub fn with_scan_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.scan_roots = roots;
        self
    }

    /// Path of the persisted registry document.
    pub fn registry_path(&self) -> PathBuf {
        self.state_dir.join("registry.json")
    }

    /// Path of the bounded recommendation history log.
    pub fn history_path(&self) -> PathBuf {
        self.state_dir.join("recommendations.jsonl")
    }
}

/// Default roots when the host passes none: the app-private models tree,
/// plus the user's data-local models directory if one exists.
fn default_scan_roots(state_dir: &std::path::Path) -> Vec<PathBuf> {
    let mut roots = vec![state_dir.join("models")];
    if let Some(data_dir) = dirs::data_local_dir() {
        roots.push(data_dir.join("models"));
    }
    roots
}
