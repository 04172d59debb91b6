//! Persistent content cache for retrieved bodies.
//!
//! Each entry is a pair of files under `<cache_dir>/items/`:
//!
//! - `<key>.body`: raw response bytes
//! - `<key>.json`: [`CacheMeta`] (status, final URL, header subset, timestamps)
//!
//! The cache is an optimization layer, not a correctness dependency. A missing
//! half, unparsable metadata, or an expired entry is simply a miss; cleanup
//! failures are swallowed. Multiple processes may share one directory without
//! locking, and any torn write they produce degrades to a miss for readers.
//!
//! Size is bounded by [`ContentCache::prune`], which runs after every write and
//! scans every entry (O(n) in the number of entries; intended for single-host
//! caches of a few thousand items). Eviction is oldest `last_accessed` first,
//! and since recency lives in the metadata files it survives restarts.

pub mod clock;
pub mod hash;
pub mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use hash::compute_cache_key;
pub use store::ContentCache;

/// Default entry lifetime (7 days).
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default size budget (1 GiB).
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024 * 1024;

/// Cache behaviour switches.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub cache_dir: PathBuf,
    /// Age past which an entry is expired, measured from `created_at`.
    pub ttl: Duration,
    /// Total bytes (metadata + bodies) kept after pruning.
    pub max_bytes: u64,
    /// When false, reads always miss and writes go to an unmanaged scratch area.
    pub enabled: bool,
    /// When true, reads always miss but writes still land in the store.
    pub fresh: bool,
}

impl CacheSettings {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self { cache_dir: cache_dir.into(), ttl: DEFAULT_TTL, max_bytes: DEFAULT_MAX_BYTES, enabled: true, fresh: false }
    }

    pub fn with_max_mb(mut self, max_mb: u64) -> Self {
        self.max_bytes = max_mb.saturating_mul(1024 * 1024);
        self
    }
}

/// Caller-supplied metadata describing a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntryMeta {
    pub status: u16,
    pub final_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    pub bytes: u64,
}

/// Persisted metadata record: [`EntryMeta`] plus cache timestamps (epoch seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CacheMeta {
    #[serde(flatten)]
    pub entry: EntryMeta,
    pub created_at: f64,
    #[serde(default)]
    pub last_accessed: Option<f64>,
}

impl CacheMeta {
    pub fn last_accessed(&self) -> f64 {
        self.last_accessed.unwrap_or(self.created_at)
    }

    fn has_valid_stamps(&self) -> bool {
        self.created_at.is_finite() && self.created_at >= 0.0 && self.last_accessed().is_finite()
    }
}

/// A valid, unexpired entry.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub key: String,
    pub meta: CacheMeta,
    pub body_path: PathBuf,
}

/// What a prune pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PruneStats {
    /// Metadata files examined.
    pub scanned: usize,
    /// Entries deleted as unreadable, corrupt, or expired.
    pub removed: usize,
    /// Entries evicted to get under the size budget.
    pub evicted: usize,
    /// Bytes held by the remaining entries.
    pub total_bytes: u64,
}
