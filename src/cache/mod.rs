//! Response cache: entry model, store interface and the disk-backed store.
//!
//! Entries carry two expiry instants. Past `soft_ttl` an entry is still
//! served but triggers a background revalidation; past `ttl` it is treated
//! as a miss (its validators are still used for a conditional request).

mod disk;
mod error;
pub mod headers;
pub mod record;

use std::collections::BTreeMap;

pub use disk::{DiskCache, DEFAULT_DISK_USAGE_BYTES, HYSTERESIS_FACTOR};
pub use error::CacheError;

/// Response header map. Keys keep their original case; lookups that must be
/// case-insensitive go through [`headers::header_value`].
pub type Headers = BTreeMap<String, String>;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A cached response body plus its freshness metadata.
///
/// All instants are epoch milliseconds; `0` means unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheEntry {
    pub data: Vec<u8>,
    pub etag: Option<String>,
    pub server_date: i64,
    pub last_modified: i64,
    /// Hard expiry.
    pub ttl: i64,
    /// Revalidation threshold, never later than `ttl` for well-formed entries.
    pub soft_ttl: i64,
    pub response_headers: Headers,
}

impl CacheEntry {
    /// An entry with the given body that is already expired.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, ..Default::default() }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.ttl < now
    }

    pub fn refresh_needed(&self) -> bool {
        self.refresh_needed_at(now_millis())
    }

    pub fn refresh_needed_at(&self, now: i64) -> bool {
        self.soft_ttl < now
    }
}

/// A keyed response store.
///
/// Implementations must be safe to share across the cache dispatcher and
/// network workers.
pub trait Cache: Send + Sync {
    /// Prepare the store. Called once, on the cache dispatcher thread,
    /// before any other operation.
    fn initialize(&self) -> Result<(), CacheError>;

    /// Look up an entry. Unreadable records are removed and reported as a miss.
    fn get(&self, key: &str) -> Option<CacheEntry>;

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError>;

    fn remove(&self, key: &str);

    /// Mark an entry for revalidation; with `full_expire` it is also
    /// hard-expired so the next lookup misses.
    fn invalidate(&self, key: &str, full_expire: bool) -> Result<(), CacheError> {
        if let Some(mut entry) = self.get(key) {
            entry.soft_ttl = 0;
            if full_expire {
                entry.ttl = 0;
            }
            self.put(key, &entry)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError>;
}

/// A store that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl Cache for NoCache {
    fn initialize(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, _key: &str) -> Option<CacheEntry> {
        None
    }

    fn put(&self, _key: &str, _entry: &CacheEntry) -> Result<(), CacheError> {
        Ok(())
    }

    fn remove(&self, _key: &str) {}

    fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_is_expired() {
        let entry = CacheEntry::new(b"x".to_vec());
        assert!(entry.is_expired());
        assert!(entry.refresh_needed());
    }

    #[test]
    fn soft_stale_entry_is_not_expired() {
        let entry = CacheEntry { ttl: 2_000, soft_ttl: 500, ..CacheEntry::new(Vec::new()) };
        assert!(!entry.is_expired_at(1_000));
        assert!(entry.refresh_needed_at(1_000));
    }

    #[test]
    fn expiry_is_strict() {
        let entry = CacheEntry { ttl: 1_000, soft_ttl: 1_000, ..CacheEntry::new(Vec::new()) };
        assert!(!entry.is_expired_at(1_000));
        assert!(entry.is_expired_at(1_001));
    }

    #[test]
    fn no_cache_stores_nothing() {
        let cache = NoCache;
        cache.put("k", &CacheEntry::new(b"x".to_vec())).unwrap();
        assert!(cache.get("k").is_none());
        cache.invalidate("k", true).unwrap();
    }
}
