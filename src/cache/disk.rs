//! Disk-backed cache store with a size bound and LRU eviction.
//!
//! One file per key under a root directory. An in-memory index of record
//! headers (everything but the body) is rebuilt by [`DiskCache::initialize`]
//! and kept in access order for eviction. A single mutex serializes index
//! and file access.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use crate::telemetry::metrics;

use super::error::CacheError;
use super::record::CacheHeader;
use super::{Cache, CacheEntry};

/// Default size bound: 5 MiB.
pub const DEFAULT_DISK_USAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Eviction stops once usage falls below this fraction of the bound.
pub const HYSTERESIS_FACTOR: f64 = 0.9;

const TEMP_SUFFIX: &str = "tmp";

struct IndexEntry {
    header: CacheHeader,
    tick: u64,
}

/// Index plus access order. `lru` maps access tick to key; the smallest
/// tick is the least recently used.
#[derive(Default)]
struct DiskState {
    entries: HashMap<String, IndexEntry>,
    lru: BTreeMap<u64, String>,
    next_tick: u64,
    total_size: u64,
}

impl DiskState {
    fn insert(&mut self, header: CacheHeader) {
        let key = header.key.clone();
        self.forget(&key);
        self.total_size += header.size;
        let tick = self.bump();
        self.lru.insert(tick, key.clone());
        self.entries.insert(key, IndexEntry { header, tick });
    }

    fn touch(&mut self, key: &str) {
        let tick = self.bump();
        if let Some(entry) = self.entries.get_mut(key) {
            self.lru.remove(&entry.tick);
            entry.tick = tick;
            self.lru.insert(tick, key.to_string());
        }
    }

    fn forget(&mut self, key: &str) -> Option<CacheHeader> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.tick);
        self.total_size = self.total_size.saturating_sub(entry.header.size);
        Some(entry.header)
    }

    fn eldest(&self) -> Option<String> {
        self.lru.values().next().cloned()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.total_size = 0;
    }

    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }
}

/// Cache store persisting one record per key under `root`.
pub struct DiskCache {
    root: PathBuf,
    max_size: u64,
    state: Mutex<DiskState>,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>, max_size: u64) -> Self {
        Self { root: root.into(), max_size, state: Mutex::new(DiskState::default()) }
    }

    pub fn with_default_size(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_DISK_USAGE_BYTES)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sum of stored body sizes.
    pub fn total_size(&self) -> u64 {
        self.state.lock().total_size
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Deterministic file name for `key`: the first 16 bytes of the SHA-256
    /// of each half of the key, hex encoded.
    pub fn filename_for_key(key: &str) -> String {
        let mut mid = key.len() / 2;
        while !key.is_char_boundary(mid) {
            mid -= 1;
        }
        let (first, second) = key.split_at(mid);
        let mut name = hex::encode(&Sha256::digest(first.as_bytes())[..16]);
        name.push_str(&hex::encode(&Sha256::digest(second.as_bytes())[..16]));
        name
    }

    pub fn file_for_key(&self, key: &str) -> PathBuf {
        self.root.join(Self::filename_for_key(key))
    }

    /// Read the record for `key`, whose body the index expects to be
    /// `expected_size` bytes.
    fn read_record(&self, key: &str, expected_size: u64) -> Result<CacheEntry, CacheError> {
        let path = self.file_for_key(key);
        let file = File::open(&path).map_err(|e| CacheError::io(&path, e))?;
        let len = file.metadata().map_err(|e| CacheError::io(&path, e))?.len();
        let mut reader = BufReader::new(file);
        let (header, _) = CacheHeader::read_from(&mut reader, len)?;
        if header.key != key {
            return Err(CacheError::KeyMismatch { expected: key.to_string(), found: header.key });
        }
        let mut data = Vec::with_capacity(header.size as usize);
        reader.read_to_end(&mut data).map_err(|e| CacheError::io(&path, e))?;
        if data.len() as u64 != expected_size {
            return Err(CacheError::Corrupt(format!(
                "body is {} bytes, expected {expected_size}",
                data.len()
            )));
        }
        Ok(header.to_entry(data))
    }

    fn write_record(&self, header: &CacheHeader, data: &[u8]) -> Result<(), CacheError> {
        let path = self.file_for_key(&header.key);
        let temp = path.with_extension(TEMP_SUFFIX);
        let written = (|| -> io::Result<()> {
            let mut out = BufWriter::new(File::create(&temp)?);
            header.write_to(&mut out)?;
            out.write_all(data)?;
            out.flush()?;
            out.get_ref().sync_all()?;
            drop(out);
            fs::rename(&temp, &path)
        })();
        written.map_err(|e| {
            let _ = fs::remove_file(&temp);
            CacheError::io(&path, e)
        })
    }

    fn get_locked(&self, state: &mut DiskState, key: &str) -> Option<CacheEntry> {
        let expected_size = state.entries.get(key)?.header.size;
        state.touch(key);
        match self.read_record(key, expected_size) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(key, error = %err, "unreadable cache record, purging");
                self.remove_locked(state, key);
                None
            }
        }
    }

    fn put_locked(
        &self,
        state: &mut DiskState,
        key: &str,
        entry: &CacheEntry,
    ) -> Result<(), CacheError> {
        let needed = entry.data.len() as u64;
        self.prune_locked(state, needed);
        let header = CacheHeader::from_entry(key, entry);
        self.write_record(&header, &entry.data)?;
        state.insert(header);
        metrics::record_cache_size(state.total_size);
        trace!(key, bytes = needed, "cache record written");
        Ok(())
    }

    fn remove_locked(&self, state: &mut DiskState, key: &str) {
        state.forget(key);
        let path = self.file_for_key(key);
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(key, path = %path.display(), error = %err, "could not delete cache record");
            }
        }
        metrics::record_cache_size(state.total_size);
    }

    /// Evict in LRU order once `total + needed` reaches the bound, until it
    /// falls below the hysteresis threshold or nothing is left.
    fn prune_locked(&self, state: &mut DiskState, needed: u64) {
        if state.total_size + needed < self.max_size {
            return;
        }
        let before = state.total_size;
        let threshold = self.max_size as f64 * HYSTERESIS_FACTOR;
        let mut evicted = 0usize;
        while let Some(key) = state.eldest() {
            self.remove_locked(state, &key);
            evicted += 1;
            metrics::record_eviction();
            if ((state.total_size + needed) as f64) < threshold {
                break;
            }
        }
        debug!(
            evicted,
            freed = before - state.total_size,
            total = state.total_size,
            "pruned disk cache"
        );
    }

    fn scan_file(&self, path: &Path) -> Result<CacheHeader, CacheError> {
        let file = File::open(path).map_err(|e| CacheError::io(path, e))?;
        let len = file.metadata().map_err(|e| CacheError::io(path, e))?.len();
        let (header, _) = CacheHeader::read_from(BufReader::new(file), len)?;
        Ok(header)
    }
}

impl Cache for DiskCache {
    fn initialize(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, e))?;
        state.clear();

        let dir = fs::read_dir(&self.root).map_err(|e| CacheError::io(&self.root, e))?;
        for item in dir {
            let path = match item {
                Ok(item) => item.path(),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable cache directory entry");
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            if path.extension().is_some_and(|ext| ext == TEMP_SUFFIX) {
                let _ = fs::remove_file(&path);
                continue;
            }
            match self.scan_file(&path) {
                Ok(header) => state.insert(header),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding corrupt cache record");
                    let _ = fs::remove_file(&path);
                }
            }
        }
        metrics::record_cache_size(state.total_size);
        debug!(
            root = %self.root.display(),
            entries = state.entries.len(),
            bytes = state.total_size,
            "disk cache initialized"
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut state = self.state.lock();
        self.get_locked(&mut state, key)
    }

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        self.put_locked(&mut state, key, entry)
    }

    fn remove(&self, key: &str) {
        let mut state = self.state.lock();
        self.remove_locked(&mut state, key);
    }

    fn invalidate(&self, key: &str, full_expire: bool) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        if let Some(mut entry) = self.get_locked(&mut state, key) {
            entry.soft_ttl = 0;
            if full_expire {
                entry.ttl = 0;
            }
            self.put_locked(&mut state, key, &entry)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        match fs::read_dir(&self.root) {
            Ok(dir) => {
                for item in dir.flatten() {
                    let path = item.path();
                    if path.is_file() {
                        fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(CacheError::io(&self.root, err)),
        }
        state.clear();
        metrics::record_cache_size(0);
        debug!(root = %self.root.display(), "disk cache cleared");
        Ok(())
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("root", &self.root)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}
