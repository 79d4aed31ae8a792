//! Filesystem scanning for candidate model files.
//!
//! Walks the configured roots, tolerating per-path I/O errors — mobile
//! storage guarantees some roots are missing or unreadable, and that must
//! never abort a scan. Results are deduplicated by canonical absolute path.

use crate::cancel::CancellationToken;
use crate::extract::has_model_token;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File extensions that are always considered model candidates.
const MODEL_EXTENSIONS: &[&str] = &["gguf", "ggml", "safetensors", "bin"];

/// Raw candidate found on disk: name and size only, contents are opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFileDescriptor {
    /// Canonical absolute path
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
}

/// Result of walking the configured roots.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Deduplicated candidates, keyed order unspecified
    pub files: Vec<RawFileDescriptor>,
    /// Per-path I/O errors tolerated along the way
    pub io_errors: usize,
    /// True when the walk stopped early at a cancellation check
    pub cancelled: bool,
}

/// Whether a directory entry qualifies as a candidate.
///
/// A file qualifies on a known model extension, or on being larger than the
/// size floor while carrying a plausible model-name token.
fn is_candidate(filename: &str, size_bytes: u64, size_floor: u64) -> bool {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    if let Some(ext) = extension {
        if MODEL_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
    }
    size_bytes > size_floor && has_model_token(filename)
}

/// Walk every root up to `max_depth`, collecting candidate files.
///
/// Cancellation is checked at directory boundaries; a cancelled walk returns
/// everything discovered so far with `cancelled` set. Unreadable paths are
/// counted, logged, and skipped.
pub fn scan_roots(
    roots: &[PathBuf],
    max_depth: usize,
    size_floor: u64,
    cancel: &CancellationToken,
) -> ScanOutcome {
    let mut seen: HashMap<PathBuf, RawFileDescriptor> = HashMap::new();
    let mut io_errors = 0usize;
    let mut cancelled = false;

    'roots: for root in roots {
        if !root.exists() {
            debug!("Scan root does not exist, skipping: {}", root.display());
            continue;
        }

        for entry in WalkDir::new(root).max_depth(max_depth) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    io_errors += 1;
                    warn!("Skipping unreadable path under {}: {}", root.display(), e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                // Directory boundary: the only place a scan may stop early
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'roots;
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let filename = entry.file_name().to_string_lossy().to_string();
            let size_bytes = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    io_errors += 1;
                    warn!("Failed to stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            if !is_candidate(&filename, size_bytes, size_floor) {
                continue;
            }

            // Canonicalize so the same file reached through different roots
            // or symlinks collapses to one entry.
            let canonical = match entry.path().canonicalize() {
                Ok(path) => path,
                Err(e) => {
                    io_errors += 1;
                    warn!(
                        "Failed to canonicalize {}: {}",
                        entry.path().display(),
                        e
                    );
                    continue;
                }
            };

            seen.insert(
                canonical.clone(),
                RawFileDescriptor {
                    path: canonical,
                    filename,
                    size_bytes,
                },
            );
        }
    }

    let mut files: Vec<_> = seen.into_values().collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    debug!(
        "Scan walk finished: {} candidates, {} I/O errors, cancelled={}",
        files.len(),
        io_errors,
        cancelled
    );

    ScanOutcome {
        files,
        io_errors,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, size: usize) {
        fs::write(dir.join(name), vec![0u8; size]).unwrap();
    }

    #[test]
    fn test_candidate_matching() {
        assert!(is_candidate("llama-7b.gguf", 10, 1000));
        assert!(is_candidate("weights.safetensors", 10, 1000));
        // Large + model token, unknown extension
        assert!(is_candidate("llama-weights.dat", 5000, 1000));
        // Large but no token
        assert!(!is_candidate("movie.mp4", 5000, 1000));
        // Token but too small
        assert!(!is_candidate("llama-notes.txt", 10, 1000));
    }

    #[test]
    fn test_scan_finds_and_dedups() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "llama-7b.gguf", 64);
        touch(temp.path(), "notes.txt", 64);
        fs::create_dir(temp.path().join("nested")).unwrap();
        touch(&temp.path().join("nested"), "phi-3.gguf", 64);

        let roots = vec![temp.path().to_path_buf(), temp.path().to_path_buf()];
        let outcome = scan_roots(&roots, 6, 1 << 20, &CancellationToken::new());

        // Same root listed twice still yields each file once
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.io_errors, 0);
        assert!(!outcome.cancelled);
        assert!(outcome
            .files
            .iter()
            .all(|f| f.filename.ends_with(".gguf")));
    }

    #[test]
    fn test_scan_respects_max_depth() {
        let temp = TempDir::new().unwrap();
        let deep = temp.path().join("a").join("b").join("c");
        fs::create_dir_all(&deep).unwrap();
        touch(temp.path(), "top.gguf", 64);
        touch(&deep, "deep.gguf", 64);

        let outcome = scan_roots(
            &[temp.path().to_path_buf()],
            1,
            1 << 20,
            &CancellationToken::new(),
        );
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].filename, "top.gguf");
    }

    #[test]
    fn test_missing_root_is_tolerated() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "model.gguf", 64);

        let roots = vec![
            PathBuf::from("/definitely/not/a/real/root"),
            temp.path().to_path_buf(),
        ];
        let outcome = scan_roots(&roots, 6, 1 << 20, &CancellationToken::new());
        assert_eq!(outcome.files.len(), 1);
    }

    #[test]
    fn test_pre_cancelled_scan_returns_immediately() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "model.gguf", 64);

        let token = CancellationToken::new();
        token.cancel();
        let outcome = scan_roots(&[temp.path().to_path_buf()], 6, 1 << 20, &token);
        assert!(outcome.cancelled);
    }
}
