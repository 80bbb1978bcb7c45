//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default file name of the store under the application cache directory.
pub const DEFAULT_STORE_NAME: &str = "graylog-cache.log";

/// Default dead-byte volume that triggers compaction (4MB).
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Append-only log file under `base_dir`.
    File,
    /// Volatile map, lost when the engine is dropped.
    InMemory,
}

/// What a flush does with a stored record that no longer decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Log it, leave it stored and carry on with the rest of the snapshot.
    Skip,
    /// Log it and stop submitting for the rest of this pass.
    Abort,
}

/// Configuration options for a cache engine.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Directory holding the store file. Created, with parents, on open.
    pub base_dir: PathBuf,

    /// File name of the store inside `base_dir`.
    pub store_name: String,

    pub backend: BackendKind,

    /// Whether to fsync after each append
    pub sync_on_write: bool,

    /// Maximum number of queued operations handled per worker wakeup
    pub batch_size: usize,

    /// Dead bytes (deleted records and tombstones) tolerated before the log is rewritten
    pub compact_threshold: u64,

    pub decode_policy: DecodePolicy,

    /// Upper bound on how long a flush waits for one completion. `None` waits forever.
    pub completion_timeout: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./cache"),
            store_name: DEFAULT_STORE_NAME.to_string(),
            backend: BackendKind::File,
            sync_on_write: true,
            batch_size: 100,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            decode_policy: DecodePolicy::Skip,
            completion_timeout: None,
        }
    }
}

impl CacheOptions {
    /// Create file-backed options with a custom base directory.
    pub fn with_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// File-backed options rooted at `<cache_root>/<app_id>`.
    pub fn for_app<P: Into<PathBuf>>(cache_root: P, app_id: &str) -> Self {
        Self::with_base_dir(cache_root.into().join(app_id))
    }

    pub fn in_memory() -> Self {
        Self {
            backend: BackendKind::InMemory,
            ..Default::default()
        }
    }

    /// Full path of the store file.
    pub fn store_path(&self) -> PathBuf {
        self.base_dir.join(&self.store_name)
    }
}
