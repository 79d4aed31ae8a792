//! Durable state: atomic JSON persistence, the debounced state store, and
//! the bounded recommendation history log.
//!
//! Writes go to a temp file with a PID suffix, are validated by re-parsing,
//! synced, then renamed over the target — a crash mid-write leaves the
//! previous state intact.

use crate::error::{Result, ScoutError};
use crate::types::{ModelArtifact, Recommendation};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Read and parse a JSON file. `None` when the file doesn't exist.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path).map_err(|e| ScoutError::io_with_path(e, path))?;
    let data: T = serde_json::from_reader(BufReader::new(file)).map_err(|e| ScoutError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;
    Ok(Some(data))
}

/// Write data to a JSON file atomically, optionally keeping a `.bak` of the
/// previous contents.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T, keep_backup: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| ScoutError::io_with_path(e, parent))?;
        }
    }

    let temp_path = path.with_extension(format!("json.{}.tmp", process::id()));

    let serialized = serde_json::to_string_pretty(data).map_err(|e| ScoutError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    // Validate by re-parsing before anything touches the target
    serde_json::from_str::<serde_json::Value>(&serialized).map_err(|e| ScoutError::Json {
        message: format!("JSON validation failed: {}", e),
        source: Some(e),
    })?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| ScoutError::io_with_path(e, &temp_path))?;
        file.write_all(serialized.as_bytes())
            .map_err(|e| ScoutError::io_with_path(e, &temp_path))?;
        file.sync_all()
            .map_err(|e| ScoutError::io_with_path(e, &temp_path))?;
    }

    if keep_backup && path.exists() {
        let backup = backup_path(path);
        if let Err(e) = fs::copy(path, &backup) {
            // Backup failure is not fatal
            warn!("Failed to create backup {}: {}", backup.display(), e);
        }
    }

    fs::rename(&temp_path, path).map_err(|e| ScoutError::io_with_path(e, path))?;
    debug!("Atomically wrote {}", path.display());
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("json.bak")
}

/// The full persisted document: one record per artifact keyed by canonical
/// path, the singleton loaded pointer, and scan bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub artifacts: HashMap<String, ModelArtifact>,
    #[serde(default)]
    pub loaded_path: Option<String>,
    #[serde(default)]
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scan_count: u64,
    #[serde(default)]
    pub last_scan_io_errors: u64,
}

/// One line of the recommendation history log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRecord {
    pub id: String,
    pub at: DateTime<Utc>,
    pub use_case: String,
    pub path: String,
    pub score: f64,
    pub reason: String,
}

impl RecommendationRecord {
    pub fn from_recommendation(rec: &Recommendation, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            at,
            use_case: rec.use_case.as_str().to_string(),
            path: rec.path.clone(),
            score: rec.score,
            reason: rec.reason.clone(),
        }
    }
}

/// Durable store for the registry document plus the history log.
///
/// Mutations are staged and written by the engine's debounced writer task;
/// lifecycle transitions bypass the debounce with `flush_now`. A failed
/// flush keeps the staged state for the next tick — in-memory state is
/// never dropped on persistence failure.
pub struct StateStore {
    registry_path: PathBuf,
    history_path: PathBuf,
    history_limit: usize,
    pending: Mutex<Option<PersistedState>>,
    history_len: Mutex<Option<usize>>,
}

impl StateStore {
    pub fn new(registry_path: PathBuf, history_path: PathBuf, history_limit: usize) -> Self {
        Self {
            registry_path,
            history_path,
            history_limit,
            pending: Mutex::new(None),
            history_len: Mutex::new(None),
        }
    }

    /// Load the persisted document, if any.
    ///
    /// A primary file that is unreadable or corrupt falls back to the `.bak`
    /// copy kept by the writer; the original error surfaces only when the
    /// backup cannot help either.
    pub fn load(&self) -> Result<Option<PersistedState>> {
        match atomic_read_json(&self.registry_path) {
            Ok(state) => Ok(state),
            Err(primary) => {
                match atomic_read_json(&backup_path(&self.registry_path)) {
                    Ok(Some(state)) => {
                        warn!(
                            "Registry file unreadable, recovered from backup: {}",
                            primary
                        );
                        Ok(Some(state))
                    }
                    _ => Err(primary),
                }
            }
        }
    }

    /// Stage a state snapshot for the next debounced flush. A newer stage
    /// replaces an older one that hasn't been written yet.
    pub fn stage(&self, state: PersistedState) {
        *self.pending.lock().unwrap() = Some(state);
    }

    /// Write a state snapshot immediately (write-ahead for lifecycle
    /// transitions). Clears any staged snapshot it supersedes.
    pub fn flush_now(&self, state: &PersistedState) -> Result<()> {
        self.pending.lock().unwrap().take();
        atomic_write_json(&self.registry_path, state, true)
    }

    /// Flush the staged snapshot if one exists. Returns whether a write
    /// happened. On failure the snapshot is restored for the next tick
    /// unless something newer was staged meanwhile.
    pub fn flush_pending(&self) -> Result<bool> {
        let Some(state) = self.pending.lock().unwrap().take() else {
            return Ok(false);
        };
        match atomic_write_json(&self.registry_path, &state, true) {
            Ok(()) => Ok(true),
            Err(e) => {
                let mut pending = self.pending.lock().unwrap();
                if pending.is_none() {
                    *pending = Some(state);
                }
                Err(e)
            }
        }
    }

    /// True when a staged snapshot awaits the next flush.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    /// Append one record to the history log, trimming the file back to the
    /// configured limit when it grows past twice that.
    pub fn append_history(&self, record: &RecommendationRecord) -> Result<()> {
        if let Some(parent) = self.history_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ScoutError::io_with_path(e, parent))?;
            }
        }

        let mut len_guard = self.history_len.lock().unwrap();
        let current = match *len_guard {
            Some(len) => len,
            None => self.count_history_lines(),
        };

        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .map_err(|e| ScoutError::io_with_path(e, &self.history_path))?;
        writeln!(file, "{}", line).map_err(|e| ScoutError::io_with_path(e, &self.history_path))?;

        let mut new_len = current + 1;
        if new_len > self.history_limit * 2 {
            new_len = self.trim_history()?;
        }
        *len_guard = Some(new_len);
        Ok(())
    }

    /// Most recent history records, newest last, up to `limit`.
    pub fn read_history(&self, limit: usize) -> Result<Vec<RecommendationRecord>> {
        if !self.history_path.exists() {
            return Ok(Vec::new());
        }
        let file =
            File::open(&self.history_path).map_err(|e| ScoutError::io_with_path(e, &self.history_path))?;
        let mut records: Vec<RecommendationRecord> = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ScoutError::io_with_path(e, &self.history_path))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                // A torn trailing line from a crash is skipped, not fatal
                Err(e) => warn!("Skipping malformed history line: {}", e),
            }
        }
        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        Ok(records)
    }

    fn count_history_lines(&self) -> usize {
        let Ok(file) = File::open(&self.history_path) else {
            return 0;
        };
        BufReader::new(file).lines().map_while(|l| l.ok()).count()
    }

    fn trim_history(&self) -> Result<usize> {
        let records = self.read_history(self.history_limit)?;
        let mut body = String::new();
        for record in &records {
            body.push_str(&serde_json::to_string(record)?);
            body.push('\n');
        }
        let temp_path = self.history_path.with_extension(format!("jsonl.{}.tmp", process::id()));
        fs::write(&temp_path, body).map_err(|e| ScoutError::io_with_path(e, &temp_path))?;
        fs::rename(&temp_path, &self.history_path)
            .map_err(|e| ScoutError::io_with_path(e, &self.history_path))?;
        debug!("Trimmed history log to {} entries", records.len());
        Ok(records.len())
    }
}
