//! Two-file-per-entry cache store: get, put, prune.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{CacheHit, CacheMeta, CacheSettings, Clock, EntryMeta, PruneStats, SystemClock};

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";

/// On-disk content cache.
///
/// Cheap to clone; clones share settings and clock.
#[derive(Debug, Clone)]
pub struct ContentCache {
    settings: Arc<CacheSettings>,
    items_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl ContentCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        let items_dir = settings.cache_dir.join("items");
        Self { settings: Arc::new(settings), items_dir, clock }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// `(meta, body)` paths for a key inside the managed store.
    pub fn entry_paths(&self, key: &str) -> (PathBuf, PathBuf) {
        (
            self.items_dir.join(format!("{key}.{META_EXT}")),
            self.items_dir.join(format!("{key}.{BODY_EXT}")),
        )
    }

    /// Look up a valid entry.
    ///
    /// Expired or corrupt entries are deleted on the way out. A valid hit gets
    /// its `last_accessed` stamp refreshed (TTL still runs from `created_at`).
    pub fn get(&self, key: &str) -> Option<CacheHit> {
        if !self.settings.enabled {
            return None;
        }
        if self.settings.fresh {
            tracing::debug!(key, "cache read bypassed (fresh)");
            return None;
        }

        let (meta_path, body_path) = self.entry_paths(key);
        if !meta_path.is_file() || !body_path.is_file() {
            return None;
        }

        let raw = fs::read(&meta_path).ok()?;
        let mut meta = match serde_json::from_slice::<CacheMeta>(&raw) {
            Ok(meta) if meta.has_valid_stamps() => meta,
            Ok(_) | Err(_) => {
                tracing::debug!(key, "discarding corrupt cache entry");
                remove_pair(&meta_path, &body_path);
                return None;
            }
        };

        let now = self.clock.now();
        if self.is_expired(&meta, now) {
            tracing::debug!(key, "discarding expired cache entry");
            remove_pair(&meta_path, &body_path);
            return None;
        }

        meta.last_accessed = Some(now);
        if let Err(e) = write_meta(&meta_path, &meta) {
            tracing::debug!(key, "failed to refresh last_accessed: {e}");
        }

        tracing::debug!(key, "cache hit");
        Some(CacheHit { key: key.to_string(), meta, body_path })
    }

    /// Store a body and its metadata, then prune.
    ///
    /// The body is written before the metadata so a concurrent reader never
    /// sees metadata pointing at a body that was not written yet. With the
    /// cache disabled the pair goes to a timestamped scratch file under
    /// `<cache_dir>/tmp/` that is never pruned.
    pub fn put(&self, key: &str, entry: EntryMeta, body: &[u8]) -> io::Result<PathBuf> {
        let now = self.clock.now();
        let meta = CacheMeta { entry, created_at: now, last_accessed: Some(now) };

        if !self.settings.enabled {
            return self.write_ephemeral(key, &meta, body, now);
        }

        fs::create_dir_all(&self.items_dir)?;
        let (meta_path, body_path) = self.entry_paths(key);
        fs::write(&body_path, body)?;
        write_meta(&meta_path, &meta)?;

        self.prune();
        Ok(body_path)
    }

    /// Drop an entry. Failures are ignored.
    pub fn invalidate(&self, key: &str) {
        let (meta_path, body_path) = self.entry_paths(key);
        remove_pair(&meta_path, &body_path);
    }

    /// Delete invalid and expired entries and bodies left without metadata,
    /// then evict the least recently accessed entries until the store fits the
    /// byte budget.
    ///
    /// This is a full O(n) scan of the store and runs after every `put`,
    /// which is fine at single-host scale.
    pub fn prune(&self) -> PruneStats {
        let mut stats = PruneStats::default();
        if !self.settings.enabled {
            return stats;
        }

        let Ok(dir) = fs::read_dir(&self.items_dir) else {
            return stats;
        };

        let now = self.clock.now();
        let paths: Vec<PathBuf> = dir.flatten().map(|entry| entry.path()).collect();
        let mut candidates: Vec<(f64, u64, PathBuf, PathBuf)> = Vec::new();

        for meta_path in paths.iter().filter(|p| has_ext(p, META_EXT)).cloned() {
            stats.scanned += 1;
            let body_path = meta_path.with_extension(BODY_EXT);

            let meta = fs::read(&meta_path)
                .ok()
                .and_then(|raw| serde_json::from_slice::<CacheMeta>(&raw).ok())
                .filter(CacheMeta::has_valid_stamps);
            let sizes = file_len(&meta_path).zip(file_len(&body_path));

            match (meta, sizes) {
                (Some(meta), Some((meta_len, body_len))) if !self.is_expired(&meta, now) => {
                    let size = meta_len + body_len;
                    stats.total_bytes += size;
                    candidates.push((meta.last_accessed(), size, meta_path, body_path));
                }
                _ => {
                    remove_pair(&meta_path, &body_path);
                    stats.removed += 1;
                }
            }
        }

        // A crash between the body and meta writes of `put` leaves a body nobody references.
        for body_path in paths.iter().filter(|p| has_ext(p, BODY_EXT)) {
            if !body_path.with_extension(META_EXT).exists() && fs::remove_file(body_path).is_ok() {
                tracing::debug!(path = %body_path.display(), "removed cache body without metadata");
                stats.removed += 1;
            }
        }

        if stats.total_bytes <= self.settings.max_bytes {
            return stats;
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (_, size, meta_path, body_path) in candidates {
            if stats.total_bytes <= self.settings.max_bytes {
                break;
            }
            remove_pair(&meta_path, &body_path);
            stats.total_bytes = stats.total_bytes.saturating_sub(size);
            stats.evicted += 1;
        }

        tracing::debug!(
            evicted = stats.evicted,
            total_bytes = stats.total_bytes,
            max_bytes = self.settings.max_bytes,
            "cache evicted entries over budget"
        );
        stats
    }

    fn is_expired(&self, meta: &CacheMeta, now: f64) -> bool {
        (now - meta.created_at) > self.settings.ttl.as_secs_f64()
    }

    fn write_ephemeral(&self, key: &str, meta: &CacheMeta, body: &[u8], now: f64) -> io::Result<PathBuf> {
        let tmp_dir = self.settings.cache_dir.join("tmp");
        fs::create_dir_all(&tmp_dir)?;
        let stamp = (now * 1000.0) as u64;
        let body_path = tmp_dir.join(format!("{key}.{stamp}.{BODY_EXT}"));
        let meta_path = tmp_dir.join(format!("{key}.{stamp}.{META_EXT}"));
        fs::write(&body_path, body)?;
        write_meta(&meta_path, meta)?;
        Ok(body_path)
    }
}

fn write_meta(path: &Path, meta: &CacheMeta) -> io::Result<()> {
    let json = serde_json::to_vec(meta).map_err(io::Error::other)?;
    fs::write(path, json)
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

fn file_len(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
}

fn remove_pair(meta_path: &Path, body_path: &Path) {
    let _ = fs::remove_file(meta_path);
    let _ = fs::remove_file(body_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn entry(url: &str, bytes: u64) -> EntryMeta {
        EntryMeta {
            status: 200,
            final_url: url.to_string(),
            headers: BTreeMap::from([("content-type".to_string(), "text/html".to_string())]),
            content_type: Some("text/html".to_string()),
            bytes,
        }
    }

    fn cache_at(dir: &Path, clock: &Arc<ManualClock>, ttl: Duration, max_bytes: u64) -> ContentCache {
        let settings = CacheSettings { ttl, max_bytes, ..CacheSettings::new(dir) };
        ContentCache::with_clock(settings, clock.clone())
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(3600), u64::MAX);

        let body_path = cache.put("abc", entry("https://example.com/", 5), b"hello").unwrap();
        assert!(body_path.exists());

        clock.advance(10.0);
        let hit = cache.get("abc").unwrap();
        assert_eq!(hit.key, "abc");
        assert_eq!(fs::read(&hit.body_path).unwrap(), b"hello");
        assert_eq!(hit.meta.entry, entry("https://example.com/", 5));
        assert_eq!(hit.meta.created_at, 1_000.0);
        assert_eq!(hit.meta.last_accessed, Some(1_010.0));

        let (meta_path, _) = cache.entry_paths("abc");
        let on_disk: serde_json::Value = serde_json::from_slice(&fs::read(meta_path).unwrap()).unwrap();
        assert_eq!(on_disk["status"], 200);
        assert_eq!(on_disk["final_url"], "https://example.com/");
        assert_eq!(on_disk["created_at"], 1_000.0);
        assert_eq!(on_disk["last_accessed"], 1_010.0);
    }

    #[test]
    fn test_hit_does_not_extend_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(100), u64::MAX);

        cache.put("k", entry("https://example.com/", 1), b"x").unwrap();
        clock.set(90.0);
        assert!(cache.get("k").is_some());
        clock.set(101.0);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_expired_entry_is_absent_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(60), u64::MAX);

        cache.put("old", entry("https://example.com/", 3), b"old").unwrap();
        clock.advance(61.0);

        assert!(cache.get("old").is_none());
        let (meta_path, body_path) = cache.entry_paths("old");
        assert!(!meta_path.exists());
        assert!(!body_path.exists());
    }

    #[test]
    fn test_corrupt_meta_is_a_miss_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(60), u64::MAX);

        cache.put("bad", entry("https://example.com/", 3), b"abc").unwrap();
        let (meta_path, body_path) = cache.entry_paths("bad");
        fs::write(&meta_path, b"{not json at all").unwrap();

        assert!(cache.get("bad").is_none());
        assert!(!meta_path.exists());
        assert!(!body_path.exists());
    }

    #[test]
    fn test_invalid_created_at_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(60), u64::MAX);

        cache.put("k", entry("https://example.com/", 1), b"x").unwrap();
        let (meta_path, body_path) = cache.entry_paths("k");
        fs::write(
            &meta_path,
            br#"{"status":200,"final_url":"https://example.com/","content_type":null,"bytes":1,"created_at":"yesterday"}"#,
        )
        .unwrap();

        assert!(cache.get("k").is_none());
        assert!(!body_path.exists());
    }

    #[test]
    fn test_half_written_entry_is_a_miss_but_kept() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(60), u64::MAX);

        let (_, body_path) = cache.entry_paths("inflight");
        fs::create_dir_all(body_path.parent().unwrap()).unwrap();
        fs::write(&body_path, b"partial").unwrap();

        assert!(cache.get("inflight").is_none());
        assert!(body_path.exists());
    }

    #[test]
    fn test_eviction_removes_oldest_accessed_first() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(100.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(3600), 1_000);

        cache.put("a", entry("https://example.com/a", 600), &[b'a'; 600]).unwrap();
        clock.set(200.0);
        cache.put("b", entry("https://example.com/b", 600), &[b'b'; 600]).unwrap();

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.prune().total_bytes <= 1_000);
    }

    #[test]
    fn test_get_refreshes_recency_for_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(100.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(3600), 2_500);

        cache.put("a", entry("https://example.com/a", 1_000), &[b'a'; 1_000]).unwrap();
        clock.set(200.0);
        cache.put("b", entry("https://example.com/b", 1_000), &[b'b'; 1_000]).unwrap();
        clock.set(300.0);
        assert!(cache.get("a").is_some());

        clock.set(400.0);
        cache.put("c", entry("https://example.com/c", 1_000), &[b'c'; 1_000]).unwrap();

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_prune_removes_invalid_and_expired() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(60), u64::MAX);

        cache.put("old", entry("https://example.com/old", 1), b"o").unwrap();
        clock.set(50.0);
        cache.put("fresh", entry("https://example.com/fresh", 1), b"f").unwrap();
        cache.put("orphan", entry("https://example.com/orphan", 1), b"x").unwrap();
        let (_, orphan_body) = cache.entry_paths("orphan");
        fs::remove_file(orphan_body).unwrap();
        let (garbage_meta, garbage_body) = cache.entry_paths("garbage");
        fs::write(&garbage_meta, b"[1,2").unwrap();
        fs::write(&garbage_body, b"zzz").unwrap();

        clock.set(70.0);
        let stats = cache.prune();
        assert_eq!(stats.scanned, 4);
        assert_eq!(stats.removed, 3);
        assert_eq!(stats.evicted, 0);
        assert!(!garbage_body.exists());
        assert!(cache.get("fresh").is_some());
        assert!(cache.get("old").is_none());
    }

    #[test]
    fn test_prune_sweeps_body_without_meta() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0.0));
        let cache = cache_at(dir.path(), &clock, Duration::from_secs(60), u64::MAX);

        cache.put("kept", entry("https://example.com/kept", 1), b"k").unwrap();
        let (crashed_meta, crashed_body) = cache.entry_paths("crashed");
        fs::write(&crashed_body, b"body written, meta never was").unwrap();
        assert!(!crashed_meta.exists());

        let stats = cache.prune();
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.removed, 1);
        assert!(!crashed_body.exists());
        assert!(cache.get("kept").is_some());
    }

    #[test]
    fn test_fresh_mode_bypasses_reads_but_writes() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0.0));
        let settings = CacheSettings { fresh: true, ..CacheSettings::new(dir.path()) };
        let cache = ContentCache::with_clock(settings, clock.clone());

        cache.put("k", entry("https://example.com/", 1), b"x").unwrap();
        assert!(cache.get("k").is_none());

        let normal = cache_at(dir.path(), &clock, Duration::from_secs(60), u64::MAX);
        assert!(normal.get("k").is_some());
    }

    #[test]
    fn test_disabled_cache_writes_ephemeral() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(12.5));
        let settings = CacheSettings { enabled: false, ..CacheSettings::new(dir.path()) };
        let cache = ContentCache::with_clock(settings, clock);

        let path = cache.put("k", entry("https://example.com/", 1), b"x").unwrap();
        assert!(path.starts_with(dir.path().join("tmp")));
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "k.12500.body");
        assert_eq!(fs::read(&path).unwrap(), b"x");
        assert!(cache.get("k").is_none());
        assert_eq!(cache.prune(), PruneStats::default());
    }

    #[test]
    fn test_settings_with_max_mb() {
        let settings = CacheSettings::new("/tmp/x").with_max_mb(2);
        assert_eq!(settings.max_bytes, 2 * 1024 * 1024);
    }
}
