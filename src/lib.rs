//! modelscout — local model discovery and resource-aware selection.
//!
//! A headless, in-process engine that scans host-supplied directories for
//! LLM artifacts, infers structural metadata from filenames and sizes,
//! scores candidates against the device's current capabilities, and manages
//! a single-active-model lifecycle with crash-safe persistence.
//!
//! The engine never loads model weights and never talks to the network; it
//! decides *which* file the host's inference runtime should load, and keeps
//! that decision durable across restarts.
//!
//! # Usage
//!
//! ```no_run
//! use modelscout::{EngineConfig, ModelScout, UseCase};
//!
//! # async fn run() -> modelscout::Result<()> {
//! let config = EngineConfig::new("/data/app/modelscout")
//!     .with_scan_roots(vec!["/sdcard/models".into()]);
//! let scout = ModelScout::new(config);
//! scout.init().await?;
//!
//! scout.scan().await?;
//! if let Some(rec) = scout.recommend(UseCase::Conversation).await? {
//!     scout.load(&rec.path).await?;
//! }
//!
//! scout.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod extract;
pub mod persist;
pub mod probe;
pub mod registry;
pub mod scanner;
pub mod scoring;
pub mod types;

pub use cancel::CancellationToken;
pub use config::{EngineConfig, EngineDefaults, ScanDefaults};
pub use error::{Result, ScoutError};
pub use persist::{PersistedState, RecommendationRecord};
pub use probe::{DeviceClass, DeviceProbe, MainsPower, PowerSource, PowerStatus, SystemProbe};
pub use scoring::{Clock, SystemClock};
pub use types::{
    DeviceCapabilitySnapshot, LifecycleState, ModelArtifact, ModelFamily, PerformanceProfile,
    Provenance, QuantTier, Recommendation, RegistryStats, UseCase,
};

use chrono::{DateTime, Utc};
use persist::StateStore;
use probe::SnapshotCache;
use registry::ModelRegistry;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex as TokioMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Bookkeeping for the most recent scan, persisted with the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub last_scan_at: Option<DateTime<Utc>>,
    pub scan_count: u64,
    pub io_errors: u64,
}

/// Handle on the debounced persistence writer.
struct WriterHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The discovery and selection engine. One instance per host process.
///
/// All mutating operations serialize through an internal registry lock; the
/// engine is safe to share behind an `Arc` across tasks. Call [`init`] once
/// before anything else and [`shutdown`] before dropping.
///
/// [`init`]: ModelScout::init
/// [`shutdown`]: ModelScout::shutdown
pub struct ModelScout {
    config: EngineConfig,
    registry: Arc<RwLock<ModelRegistry>>,
    store: Arc<StateStore>,
    snapshots: SnapshotCache,
    clock: Arc<dyn Clock>,
    scan_gate: TokioMutex<()>,
    scan_token: StdMutex<CancellationToken>,
    report: StdMutex<ScanReport>,
    writer: StdMutex<Option<WriterHandle>>,
}

/// Builder for [`ModelScout`] with injectable collaborators.
pub struct ModelScoutBuilder {
    config: EngineConfig,
    probe: Option<Box<dyn DeviceProbe>>,
    power: Option<Box<dyn PowerSource>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ModelScoutBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            probe: None,
            power: None,
            clock: None,
        }
    }

    /// Replace the capability probe (tests use fixed-value probes).
    pub fn with_probe(mut self, probe: Box<dyn DeviceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Supply battery telemetry. Ignored when a full probe is injected.
    pub fn with_power_source(mut self, power: Box<dyn PowerSource>) -> Self {
        self.power = Some(power);
        self
    }

    /// Replace the wall clock used for timestamps and recency scoring.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> ModelScout {
        let probe = self.probe.unwrap_or_else(|| {
            Box::new(SystemProbe::new(
                self.config.device_class,
                self.config.policy_ceiling_bytes,
                self.power.unwrap_or_else(|| Box::new(MainsPower)),
            ))
        });
        let store = StateStore::new(
            self.config.registry_path(),
            self.config.history_path(),
            self.config.history_limit,
        );
        ModelScout {
            snapshots: SnapshotCache::new(probe, self.config.snapshot_ttl),
            store: Arc::new(store),
            registry: Arc::new(RwLock::new(ModelRegistry::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            scan_gate: TokioMutex::new(()),
            scan_token: StdMutex::new(CancellationToken::new()),
            report: StdMutex::new(ScanReport::default()),
            writer: StdMutex::new(None),
            config: self.config,
        }
    }
}

impl ModelScout {
    /// Engine with production collaborators.
    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> ModelScoutBuilder {
        ModelScoutBuilder::new(config)
    }

    /// Load persisted state and start the debounced writer.
    ///
    /// Revives the registry from disk, repairs lifecycle invariants, and
    /// clears the loaded pointer when its file has vanished or no longer
    /// fits a fresh capability snapshot.
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.state_dir)
            .await
            .map_err(|e| ScoutError::io_with_path(e, &self.config.state_dir))?;

        if let Some(state) = self.store.load()? {
            let persisted_pointer = state.loaded_path.clone();
            let mut revived = ModelRegistry::from_parts(state.artifacts, state.loaded_path);

            if let Some(path) = revived.loaded_path().map(str::to_string) {
                let snapshot = self.snapshots.refresh();
                let fits = revived
                    .get(&path)
                    .map(|a| a.size_bytes <= snapshot.max_model_size_bytes)
                    .unwrap_or(false);
                if !Path::new(&path).exists() {
                    warn!("Previously loaded model vanished, clearing: {}", path);
                    revived.clear_loaded();
                } else if !fits {
                    warn!("Previously loaded model no longer fits budget, clearing: {}", path);
                    revived.clear_loaded();
                }
            }

            *self.report.lock().unwrap() = ScanReport {
                last_scan_at: state.last_scan_at,
                scan_count: state.scan_count,
                io_errors: state.last_scan_io_errors,
            };

            let pointer_changed = revived.loaded_path().map(str::to_string) != persisted_pointer;
            let mut registry = self.registry.write().await;
            *registry = revived;
            if pointer_changed {
                let state = self.snapshot_state(&registry);
                if let Err(e) = self.write_ahead(state).await {
                    warn!("Deferred startup repair write: {}", e);
                }
            }
            info!("Revived registry with {} artifacts", registry.len());
        }

        self.start_writer();
        Ok(())
    }

    /// Stop the writer and flush anything still staged.
    pub async fn shutdown(&self) {
        self.cancel_scan();
        let handle = self.writer.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(true);
            if let Err(e) = handle.task.await {
                warn!("Persistence writer ended abnormally: {}", e);
            }
        }
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.flush_pending()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Final flush failed, state may lag by one mutation: {}", e),
            Err(e) => warn!("Persistence worker failed: {}", e),
        }
    }

    /// Walk the configured roots and merge discoveries into the registry.
    ///
    /// Rejects with [`ScoutError::ScanInProgress`] while another scan is in
    /// flight. A cancelled scan merges the partial discoveries it made, skips
    /// pruning (coverage was incomplete), and returns
    /// [`ScoutError::ScanCancelled`]. Entries whose file vanished from disk
    /// are pruned; pruning the loaded model clears the loaded pointer.
    pub async fn scan(&self) -> Result<Vec<ModelArtifact>> {
        let _gate = self
            .scan_gate
            .try_lock()
            .map_err(|_| ScoutError::ScanInProgress)?;

        let token = CancellationToken::new();
        *self.scan_token.lock().unwrap() = token.clone();

        let roots = self.config.scan_roots.clone();
        let depth = self.config.max_scan_depth;
        let floor = self.config.size_floor_bytes;
        let walk_token = token.clone();
        let outcome =
            tokio::task::spawn_blocking(move || scanner::scan_roots(&roots, depth, floor, &walk_token))
                .await
                .map_err(|e| ScoutError::Config {
                    message: format!("Scan worker failed: {}", e),
                })?;

        let now = self.clock.now();
        let mut registry = self.registry.write().await;

        let mut discovered: HashSet<String> = HashSet::with_capacity(outcome.files.len());
        let mut new_count = 0usize;
        for file in &outcome.files {
            let artifact = extract::extract(file, now);
            discovered.insert(artifact.path.clone());
            if registry.upsert_scanned(artifact) {
                new_count += 1;
            }
        }

        let mut pointer_cleared = false;
        if !outcome.cancelled {
            let vanished: Vec<String> = registry
                .entries()
                .keys()
                .filter(|path| !discovered.contains(*path) && !Path::new(path.as_str()).exists())
                .cloned()
                .collect();
            for path in vanished {
                if registry.loaded_path() == Some(path.as_str()) {
                    pointer_cleared = true;
                }
                info!("Pruning vanished artifact: {}", path);
                registry.remove(&path);
            }
        }

        {
            let mut report = self.report.lock().unwrap();
            report.last_scan_at = Some(now);
            report.scan_count += 1;
            report.io_errors = outcome.io_errors as u64;
        }

        let state = self.snapshot_state(&registry);
        if pointer_cleared {
            // Losing the loaded model is a lifecycle transition: write-ahead
            if let Err(e) = self.write_ahead(state).await {
                warn!("Deferred post-scan write: {}", e);
            }
        } else {
            self.store.stage(state);
        }

        info!(
            "Scan finished: {} candidates ({} new), {} total known, {} I/O errors",
            outcome.files.len(),
            new_count,
            registry.len(),
            outcome.io_errors
        );

        if outcome.cancelled {
            return Err(ScoutError::ScanCancelled);
        }
        Ok(registry.all())
    }

    /// Request cancellation of the in-flight scan, if any. Returns
    /// immediately; the scan stops at its next directory boundary.
    pub fn cancel_scan(&self) {
        self.scan_token.lock().unwrap().cancel();
    }

    /// Score every in-budget artifact for a use case and return the best.
    ///
    /// The winning artifact is flagged `recommended` in the registry and the
    /// decision is appended to the bounded history log. `None` when nothing
    /// fits the current budget.
    pub async fn recommend(&self, use_case: UseCase) -> Result<Option<Recommendation>> {
        let snapshot = self.snapshots.current();
        let now = self.clock.now();
        let mut registry = self.registry.write().await;

        let recommendation = scoring::select(&registry.all(), &snapshot, use_case, now);
        if let Some(rec) = &recommendation {
            debug!("Recommending {} for {}: {:.1}", rec.path, use_case, rec.score);
            registry.set_recommended(&rec.path);
            let record = RecommendationRecord::from_recommendation(rec, now);
            if let Err(e) = self.store.append_history(&record) {
                // History is advisory; the recommendation itself still stands
                warn!("Failed to append recommendation history: {}", e);
            }
            self.store.stage(self.snapshot_state(&registry));
        }
        Ok(recommendation)
    }

    /// Mark a model loaded, unloading whichever model held the slot.
    ///
    /// Fails with [`ScoutError::Capacity`] before touching the registry when
    /// the artifact exceeds the current budget. The transition is durable
    /// before this returns; on a persistence failure the in-memory state is
    /// kept staged for the writer's retry and the error is surfaced.
    pub async fn load(&self, path: &str) -> Result<ModelArtifact> {
        let mut registry = self.registry.write().await;
        let size_bytes = registry
            .get(path)
            .map(|a| a.size_bytes)
            .ok_or_else(|| ScoutError::ModelNotFound {
                path: path.to_string(),
            })?;

        let snapshot = self.snapshots.current();
        if size_bytes > snapshot.max_model_size_bytes {
            return Err(ScoutError::Capacity {
                path: path.to_string(),
                size_bytes,
                budget_bytes: snapshot.max_model_size_bytes,
            });
        }

        registry.mark_loaded(path, self.clock.now())?;
        let loaded = registry
            .get(path)
            .cloned()
            .ok_or_else(|| ScoutError::ModelNotFound {
                path: path.to_string(),
            })?;

        let state = self.snapshot_state(&registry);
        self.write_ahead(state).await?;
        Ok(loaded)
    }

    /// Unload the active model. Idempotent; a no-op engine-wide when nothing
    /// is loaded.
    pub async fn unload(&self) -> Result<()> {
        let mut registry = self.registry.write().await;
        if registry.loaded_path().is_none() {
            return Ok(());
        }
        registry.clear_loaded();
        let state = self.snapshot_state(&registry);
        self.write_ahead(state).await
    }

    /// Delete a model's file and remove it from the registry.
    ///
    /// A file already missing from disk still deletes the entry. Clears the
    /// loaded pointer when it pointed here.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let mut registry = self.registry.write().await;
        if registry.get(path).is_none() {
            return Err(ScoutError::ModelNotFound {
                path: path.to_string(),
            });
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Deleting entry whose file was already gone: {}", path);
            }
            Err(e) => return Err(ScoutError::io_with_path(e, path)),
        }

        registry.remove(path);
        let state = self.snapshot_state(&registry);
        self.write_ahead(state).await
    }

    /// All known artifacts, sorted by path.
    pub async fn artifacts(&self) -> Vec<ModelArtifact> {
        self.registry.read().await.all()
    }

    /// Look up one artifact by canonical path.
    pub async fn get(&self, path: &str) -> Option<ModelArtifact> {
        self.registry.read().await.get(path).cloned()
    }

    /// The currently loaded artifact, if any.
    pub async fn loaded(&self) -> Option<ModelArtifact> {
        let registry = self.registry.read().await;
        registry
            .loaded_path()
            .and_then(|path| registry.get(path))
            .cloned()
    }

    /// Aggregate registry statistics.
    pub async fn stats(&self) -> RegistryStats {
        self.registry.read().await.stats()
    }

    /// Overwrite an artifact's estimated profile with measured figures.
    /// The engine never benchmarks; hosts that do feed results back here.
    pub async fn record_measured_profile(
        &self,
        path: &str,
        profile: PerformanceProfile,
    ) -> Result<()> {
        let mut registry = self.registry.write().await;
        registry.record_measured_profile(path, profile, self.clock.now())?;
        self.store.stage(self.snapshot_state(&registry));
        Ok(())
    }

    /// Current device capability snapshot (cached within the TTL).
    pub fn device_snapshot(&self) -> DeviceCapabilitySnapshot {
        self.snapshots.current()
    }

    /// Bookkeeping for the most recent scan.
    pub fn last_scan_report(&self) -> ScanReport {
        *self.report.lock().unwrap()
    }

    /// Most recent recommendation decisions, oldest first, up to `limit`.
    pub fn recommendation_history(&self, limit: usize) -> Result<Vec<RecommendationRecord>> {
        self.store.read_history(limit)
    }

    /// Write-ahead flush on the blocking pool, so an fsync never stalls an
    /// executor worker. On failure the state is re-staged for the debounced
    /// writer's retry and the error is surfaced.
    async fn write_ahead(&self, state: PersistedState) -> Result<()> {
        let store = Arc::clone(&self.store);
        let (result, state) = tokio::task::spawn_blocking(move || {
            let result = store.flush_now(&state);
            (result, state)
        })
        .await
        .map_err(|e| ScoutError::Config {
            message: format!("Persistence worker failed: {}", e),
        })?;
        if let Err(e) = result {
            self.store.stage(state);
            return Err(e);
        }
        Ok(())
    }

    fn snapshot_state(&self, registry: &ModelRegistry) -> PersistedState {
        let report = *self.report.lock().unwrap();
        PersistedState {
            artifacts: registry.entries().clone(),
            loaded_path: registry.loaded_path().map(str::to_string),
            last_scan_at: report.last_scan_at,
            scan_count: report.scan_count,
            last_scan_io_errors: report.io_errors,
        }
    }

    fn start_writer(&self) {
        let mut writer = self.writer.lock().unwrap();
        if writer.is_some() {
            return;
        }
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let debounce = self.config.flush_debounce;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(debounce);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let store = Arc::clone(&store);
                        match tokio::task::spawn_blocking(move || store.flush_pending()).await {
                            Ok(Ok(_)) => {}
                            // Staged state is retained; retry next tick
                            Ok(Err(e)) => warn!("Deferred registry flush: {}", e),
                            Err(e) => warn!("Persistence worker failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        let store = Arc::clone(&store);
                        match tokio::task::spawn_blocking(move || store.flush_pending()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => warn!("Flush on writer shutdown failed: {}", e),
                            Err(e) => warn!("Persistence worker failed: {}", e),
                        }
                        break;
                    }
                }
            }
        });
        *writer = Some(WriterHandle {
            shutdown: shutdown_tx,
            task,
        });
    }
}
