//! Shared engine for the file-backed tiers
//!
//! Entries live at `{root}/{bucket}/{key}.{ext}`, one file per entry, where
//! `bucket` is the 3-hex shard from [`KeyGenerator::bucket_of`]. Writes go to
//! a temporary file in the shard directory and are renamed over the final
//! path. A [`EntryCodec`] turns the entry JSON into on-disk bytes, which is
//! the only thing that differs between the warm and cold tiers.
//!
//! Mutations (`set`, `delete`, `clear`, eviction, expiry removal and the
//! background access refresh) are serialized by a per-store async gate, so the
//! budget check, eviction and write happen as one step. Reads never wait on
//! the gate unless they find an expired entry to remove.

use crate::cache::{
    config::DiskTierConfig,
    entry::CacheEntry,
    invalidation::{InvalidationEvent, InvalidationReason},
    key::{is_file_safe_key, KeyGenerator, BUCKET_LEN},
    types::{CacheKey, CacheStats, CacheValue, TierLevel},
};
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Converts serialized entry JSON to the bytes stored on disk and back
pub trait EntryCodec: Send + Sync + 'static {
    /// File extension, without the leading dot
    fn extension(&self) -> &'static str;

    fn encode(&self, json: &[u8]) -> Result<Vec<u8>>;

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>>;
}

/// Outcome of a successful write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Length of the entry JSON
    pub logical_bytes: u64,

    /// Length of the file written
    pub stored_bytes: u64,

    /// Keys evicted to make room
    pub evicted: Vec<CacheKey>,
}

/// The fields of a stored entry needed for expiry and recency decisions
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryStamp {
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    ttl: u64,
}

impl EntryStamp {
    fn is_expired(&self) -> bool {
        let ttl = chrono::Duration::milliseconds(i64::try_from(self.ttl).unwrap_or(i64::MAX));
        match self.created_at.checked_add_signed(ttl) {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions_size: AtomicU64,
    evictions_ttl: AtomicU64,
    invalidations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.sets,
            &self.evictions_size,
            &self.evictions_ttl,
            &self.invalidations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// State shared with the refresh worker
struct Shared<C> {
    root: PathBuf,
    level: TierLevel,
    codec: C,
    size_bytes: AtomicU64,
    counters: Counters,
    gate: Mutex<()>,
}

impl<C: EntryCodec> Shared<C> {
    fn add_size(&self, bytes: u64) {
        self.size_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn sub_size(&self, bytes: u64) {
        let _ = self
            .size_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    async fn read_stamp(&self, path: &Path) -> Option<(EntryStamp, u64)> {
        let stored = fs::read(path).await.ok()?;
        let json = self.codec.decode(&stored).ok()?;
        let stamp = serde_json::from_slice(&json).ok()?;
        Some((stamp, stored.len() as u64))
    }

    /// Remove a file, returning the bytes freed
    async fn remove_file(&self, path: &Path) -> Option<u64> {
        let len = fs::metadata(path).await.ok()?.len();
        match fs::remove_file(path).await {
            Ok(()) => {
                self.sub_size(len);
                Some(len)
            }
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove {} tier file {:?}: {}", self.level, path, e);
                }
                None
            }
        }
    }

    /// Write back refreshed access metadata unless the entry changed meanwhile
    async fn apply_refresh(&self, path: &Path, created_at: DateTime<Utc>, bytes: Vec<u8>) -> Result<()> {
        let _gate = self.gate.lock().await;

        let Some((stamp, old_len)) = self.read_stamp(path).await else {
            debug!("Skipping refresh of deleted {} tier entry {:?}", self.level, path);
            return Ok(());
        };
        if stamp.created_at != created_at {
            debug!("Skipping refresh of replaced {} tier entry {:?}", self.level, path);
            return Ok(());
        }

        let new_len = bytes.len() as u64;
        atomic_write(path, &bytes).await?;
        self.sub_size(old_len);
        self.add_size(new_len);
        Ok(())
    }
}

enum RefreshJob {
    Write {
        path: PathBuf,
        created_at: DateTime<Utc>,
        bytes: Vec<u8>,
    },
    Flush(oneshot::Sender<()>),
}

/// Drains access-metadata refreshes; failures are logged and dropped
async fn run_refresh_worker<C: EntryCodec>(shared: Arc<Shared<C>>, mut rx: mpsc::Receiver<RefreshJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            RefreshJob::Write {
                path,
                created_at,
                bytes,
            } => {
                if let Err(e) = shared.apply_refresh(&path, created_at, bytes).await {
                    debug!("Dropped {} tier access refresh for {:?}: {}", shared.level, path, e);
                }
            }
            RefreshJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("{} tier refresh worker stopped", shared.level);
}

/// Write `bytes` to a temporary sibling of `path`, then rename it into place
pub(crate) async fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "entry path has no parent"))?;
    fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("entry");
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let result = async {
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

/// A file found under the root: key, path, on-disk length
struct StoredFile {
    key: CacheKey,
    path: PathBuf,
    len: u64,
}

fn is_shard_name(name: &str) -> bool {
    name.len() == BUCKET_LEN && name.chars().all(|c| c.is_ascii_hexdigit())
}

/// Walk every shard directory, collecting entry files and leftover temp files
async fn scan_shards(root: &Path, extension: &str) -> std::io::Result<(Vec<StoredFile>, Vec<PathBuf>)> {
    let suffix = format!(".{}", extension);
    let mut files = Vec::new();
    let mut temps = Vec::new();

    let mut shards = match fs::read_dir(root).await {
        Ok(shards) => shards,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((files, temps)),
        Err(e) => return Err(e),
    };

    while let Some(shard) = shards.next_entry().await? {
        let shard_name = shard.file_name();
        let Some(shard_name) = shard_name.to_str() else {
            continue;
        };
        if !is_shard_name(shard_name) {
            continue;
        }
        match shard.file_type().await {
            Ok(kind) if kind.is_dir() => {}
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }

        // files may vanish under a concurrent delete or clear
        let mut entries = match fs::read_dir(shard.path()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                if name.ends_with(".tmp") {
                    temps.push(entry.path());
                }
                continue;
            }
            let Some(key) = name.strip_suffix(&suffix) else {
                continue;
            };
            let len = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta.len(),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            files.push(StoredFile {
                key: key.to_string(),
                path: entry.path(),
                len,
            });
        }
    }

    Ok((files, temps))
}

/// One-file-per-entry store used by the warm and cold tiers
pub struct FileStore<T, C: EntryCodec> {
    config: DiskTierConfig,
    keys: KeyGenerator,
    shared: Arc<Shared<C>>,
    refresh_tx: mpsc::Sender<RefreshJob>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CacheValue, C: EntryCodec> FileStore<T, C> {
    /// Prepare the root, recover the tracked size and start the refresh worker
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(config: DiskTierConfig, codec: C, level: TierLevel) -> Result<Self> {
        let root = config.root.clone();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::InitializationError {
                path: root.clone(),
                reason: e.to_string(),
            })?;

        let (files, temps) = scan_shards(&root, codec.extension())
            .await
            .map_err(|e| CacheError::InitializationError {
                path: root.clone(),
                reason: e.to_string(),
            })?;

        for tmp in &temps {
            let _ = fs::remove_file(tmp).await;
        }
        if !temps.is_empty() {
            debug!("Removed {} leftover temp files from {} tier", temps.len(), level);
        }

        let size: u64 = files.iter().map(|f| f.len).sum();
        info!(
            "Opened {} tier at {:?} ({} entries, {} bytes, budget {} MB)",
            level,
            root,
            files.len(),
            size,
            config.max_size_mb
        );

        let shared = Arc::new(Shared {
            root,
            level,
            codec,
            size_bytes: AtomicU64::new(size),
            counters: Counters::default(),
            gate: Mutex::new(()),
        });

        let (refresh_tx, refresh_rx) = mpsc::channel(config.refresh_queue_capacity.max(1));
        tokio::spawn(run_refresh_worker(Arc::clone(&shared), refresh_rx));

        Ok(Self {
            config,
            keys: KeyGenerator::new(),
            shared,
            refresh_tx,
            _marker: PhantomData,
        })
    }

    pub fn config(&self) -> &DiskTierConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn level(&self) -> TierLevel {
        self.shared.level
    }

    pub fn codec(&self) -> &C {
        &self.shared.codec
    }

    /// Final path of `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !is_file_safe_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self
            .shared
            .root
            .join(self.keys.bucket_of(key))
            .join(format!("{}.{}", key, self.shared.codec.extension())))
    }

    async fn read_entry(&self, path: &Path) -> Option<CacheEntry<T>> {
        let stored = match fs::read(path).await {
            Ok(stored) => stored,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    debug!("Unreadable {} tier file {:?}: {}", self.shared.level, path, e);
                }
                return None;
            }
        };

        let decoded = self
            .shared
            .codec
            .decode(&stored)
            .and_then(|json| serde_json::from_slice::<CacheEntry<T>>(&json).map_err(CacheError::from));

        match decoded {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Corrupt {} tier file {:?}: {}", self.shared.level, path, e);
                None
            }
        }
    }

    /// Remove `path` if it still holds an expired entry
    async fn remove_if_expired(&self, key: &str, path: &Path) -> bool {
        let _gate = self.shared.gate.lock().await;
        match self.shared.read_stamp(path).await {
            Some((stamp, _)) if stamp.is_expired() => {
                if self.shared.remove_file(path).await.is_some() {
                    Counters::bump(&self.shared.counters.evictions_ttl);
                    debug!("{} tier entry expired: {}", self.shared.level, key);
                }
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    fn encode(&self, entry: &CacheEntry<T>) -> Result<(Vec<u8>, u64)> {
        let json = serde_json::to_vec(entry)?;
        let stored = self.shared.codec.encode(&json)?;
        Ok((stored, json.len() as u64))
    }

    fn schedule_refresh(&self, path: PathBuf, entry: &CacheEntry<T>) {
        let bytes = match self.encode(entry) {
            Ok((bytes, _)) => bytes,
            Err(e) => {
                debug!("Skipping access refresh for {}: {}", entry.key, e);
                return;
            }
        };

        let job = RefreshJob::Write {
            path,
            created_at: entry.created_at,
            bytes,
        };
        match self.refresh_tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("{} tier refresh queue full, dropping refresh for {}", self.shared.level, entry.key);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("{} tier refresh worker is gone", self.shared.level);
            }
        }
    }

    /// Read an entry; expired entries are deleted and reported as a miss
    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        let Ok(path) = self.path_for(key) else {
            Counters::bump(&self.shared.counters.misses);
            return None;
        };

        let Some(mut entry) = self.read_entry(&path).await else {
            Counters::bump(&self.shared.counters.misses);
            debug!("{} tier miss: {}", self.shared.level, key);
            return None;
        };

        if entry.is_expired() {
            self.remove_if_expired(key, &path).await;
            Counters::bump(&self.shared.counters.misses);
            return None;
        }

        entry.mark_accessed();
        Counters::bump(&self.shared.counters.hits);
        self.schedule_refresh(path, &entry);

        debug!("{} tier hit: {}", self.shared.level, key);
        Some(entry)
    }

    /// Read without refreshing access metadata or removing expired files
    pub async fn peek_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        let path = self.path_for(key).ok()?;
        self.read_entry(&path)
            .await
            .filter(|entry| !entry.is_expired())
    }

    /// Build and store an entry; `None` uses the configured default TTL
    pub async fn set(&self, key: impl Into<CacheKey>, value: T, ttl: Option<Duration>) -> Result<WriteReport> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        self.insert_entry(CacheEntry::new(key, value, ttl)).await
    }

    /// Store a prebuilt entry, evicting least recently accessed files if needed
    pub async fn insert_entry(&self, mut entry: CacheEntry<T>) -> Result<WriteReport> {
        let path = self.path_for(&entry.key)?;

        entry.metadata.size_bytes = serde_json::to_vec(&entry)?.len() as u64;
        let (stored, logical_bytes) = self.encode(&entry)?;
        let required = stored.len() as u64;

        let max_bytes = self.config.max_size_bytes();
        if required > max_bytes {
            warn!(
                "Entry {} ({} bytes) exceeds {} tier budget of {} bytes",
                entry.key, required, self.shared.level, max_bytes
            );
            return Err(CacheError::EntryTooLarge {
                size_bytes: required,
                max_bytes,
            });
        }

        let _gate = self.shared.gate.lock().await;

        let existing = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        };
        let evicted = self
            .ensure_cache_space(required.saturating_sub(existing), &entry.key)
            .await?;

        atomic_write(&path, &stored)
            .await
            .map_err(|source| CacheError::WriteError {
                key: entry.key.clone(),
                source,
            })?;

        self.shared.sub_size(existing);
        self.shared.add_size(required);
        Counters::bump(&self.shared.counters.sets);
        debug!("Stored {} tier entry {} ({} bytes)", self.shared.level, entry.key, required);

        Ok(WriteReport {
            logical_bytes,
            stored_bytes: required,
            evicted,
        })
    }

    /// Evict by ascending `lastAccessedAt` until `required` more bytes fit.
    /// Caller must hold the gate.
    async fn ensure_cache_space(&self, required: u64, protect: &str) -> Result<Vec<CacheKey>> {
        let max_bytes = self.config.max_size_bytes();
        let fits = |shared: &Shared<C>| shared.size_bytes.load(Ordering::Relaxed) + required <= max_bytes;

        if fits(&self.shared) {
            return Ok(Vec::new());
        }

        let (files, _) = scan_shards(&self.shared.root, self.shared.codec.extension()).await?;
        let mut candidates = Vec::with_capacity(files.len());
        for file in files {
            if file.key == protect {
                continue;
            }
            // unreadable files sort first
            let accessed = match self.shared.read_stamp(&file.path).await {
                Some((stamp, _)) => stamp.last_accessed_at,
                None => DateTime::<Utc>::MIN_UTC,
            };
            candidates.push((accessed, file));
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut evicted = Vec::new();
        for (_, file) in candidates {
            if fits(&self.shared) {
                break;
            }
            if self.shared.remove_file(&file.path).await.is_some() {
                Counters::bump(&self.shared.counters.evictions_size);
                debug!("Evicted {} tier entry: {}", self.shared.level, file.key);
                evicted.push(file.key);
            }
        }

        if !fits(&self.shared) {
            // the running total drifted from what is on disk; resync once.
            // The protected key's old file stays counted: the caller swaps it
            // for the new one after the write.
            let (files, _) = scan_shards(&self.shared.root, self.shared.codec.extension()).await?;
            let actual: u64 = files.iter().map(|f| f.len).sum();
            warn!(
                "{} tier size counter drifted, resyncing to {} bytes",
                self.shared.level, actual
            );
            self.shared.size_bytes.store(actual, Ordering::Relaxed);
            if !fits(&self.shared) {
                return Err(CacheError::EntryTooLarge {
                    size_bytes: required,
                    max_bytes,
                });
            }
        }

        Ok(evicted)
    }

    /// Existence check; expired entries are deleted and reported absent
    pub async fn has(&self, key: &str) -> bool {
        let Ok(path) = self.path_for(key) else {
            return false;
        };
        match self.shared.read_stamp(&path).await {
            Some((stamp, _)) if stamp.is_expired() => {
                self.remove_if_expired(key, &path).await;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Delete an entry; returns whether a file was removed
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let Ok(path) = self.path_for(key) else {
            return Ok(false);
        };

        let _gate = self.shared.gate.lock().await;
        let removed = self.shared.remove_file(&path).await.is_some();
        if removed {
            Counters::bump(&self.shared.counters.invalidations);
            debug!("Removed {} tier entry: {}", self.shared.level, key);
        }
        Ok(removed)
    }

    /// Destroy and recreate the root; all counters reset to zero
    pub async fn clear(&self) -> Result<()> {
        let _gate = self.shared.gate.lock().await;
        let root = &self.shared.root;

        match fs::remove_dir_all(root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(root)
            .await
            .map_err(|e| CacheError::InitializationError {
                path: root.clone(),
                reason: e.to_string(),
            })?;

        self.shared.size_bytes.store(0, Ordering::Relaxed);
        self.shared.counters.reset();
        info!("Cleared {} tier at {:?}", self.shared.level, root);
        Ok(())
    }

    /// Keys of every stored file (expired entries included until discovered)
    pub async fn keys(&self) -> Result<Vec<CacheKey>> {
        let (files, _) = scan_shards(&self.shared.root, self.shared.codec.extension()).await?;
        Ok(files.into_iter().map(|f| f.key).collect())
    }

    /// Every readable, unexpired entry
    pub async fn entries(&self) -> Result<Vec<CacheEntry<T>>> {
        let (files, _) = scan_shards(&self.shared.root, self.shared.codec.extension()).await?;
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            if let Some(entry) = self.read_entry(&file.path).await {
                if !entry.is_expired() {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    /// Time left before `key` expires
    pub async fn get_remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.peek_entry(key).await?.remaining_ttl()
    }

    /// Delete every expired entry
    pub async fn purge_expired(&self) -> Result<Vec<InvalidationEvent>> {
        let _gate = self.shared.gate.lock().await;
        let (files, _) = scan_shards(&self.shared.root, self.shared.codec.extension()).await?;

        let mut expired = Vec::new();
        for file in files {
            if let Some((stamp, _)) = self.shared.read_stamp(&file.path).await {
                if stamp.is_expired() && self.shared.remove_file(&file.path).await.is_some() {
                    Counters::bump(&self.shared.counters.evictions_ttl);
                    expired.push(file.key);
                }
            }
        }

        if expired.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Purged {} expired {} tier entries", expired.len(), self.shared.level);
        let count = expired.len();
        Ok(vec![InvalidationEvent::new(
            InvalidationReason::Expired,
            self.shared.level,
            expired,
        )
        .with_context(format!("Purged {} expired entries", count))])
    }

    /// Tracked on-disk size
    pub fn size_bytes(&self) -> u64 {
        self.shared.size_bytes.load(Ordering::Relaxed)
    }

    /// Wait until every queued access refresh has been applied
    pub async fn flush_refreshes(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.refresh_tx.send(RefreshJob::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Get tier statistics; `entries` comes from a directory walk
    pub async fn stats(&self) -> CacheStats {
        let entries = match scan_shards(&self.shared.root, self.shared.codec.extension()).await {
            Ok((files, _)) => files.len(),
            Err(e) => {
                warn!("Failed to count {} tier entries: {}", self.shared.level, e);
                0
            }
        };

        let counters = &self.shared.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            sets: counters.sets.load(Ordering::Relaxed),
            entries,
            size_bytes: self.size_bytes(),
            evictions_size: counters.evictions_size.load(Ordering::Relaxed),
            evictions_ttl: counters.evictions_ttl.load(Ordering::Relaxed),
            invalidations: counters.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct PlainCodec;

    impl EntryCodec for PlainCodec {
        fn extension(&self) -> &'static str {
            "json"
        }

        fn encode(&self, json: &[u8]) -> Result<Vec<u8>> {
            Ok(json.to_vec())
        }

        fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
            Ok(stored.to_vec())
        }
    }

    fn config(root: &Path, max_size_mb: u64) -> DiskTierConfig {
        DiskTierConfig {
            root: root.to_path_buf(),
            max_size_mb,
            default_ttl: Duration::from_secs(60),
            refresh_queue_capacity: 16,
        }
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("abc").join("key.json");

        atomic_write(&path, b"{}").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path().join("abc"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["key.json".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_rename_cleans_up_temp_file() {
        let tmp = TempDir::new().unwrap();
        let shard = tmp.path().join("abc");
        // a directory at the target path makes the rename fail
        let target = shard.join("key.json");
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        assert!(atomic_write(&target, b"{}").await.is_err());

        let temps = std::fs::read_dir(&shard)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count();
        assert_eq!(temps, 0);
    }

    #[tokio::test]
    async fn test_open_recovers_size_and_removes_temps() {
        let tmp = TempDir::new().unwrap();

        {
            let store: FileStore<String, PlainCodec> =
                FileStore::open(config(tmp.path(), 1), PlainCodec, TierLevel::Warm)
                    .await
                    .unwrap();
            store.set("k1", "v1".to_string(), None).await.unwrap();
            store.set("k2", "v2".to_string(), None).await.unwrap();
        }

        let shard = tmp.path().join("fff");
        std::fs::create_dir_all(&shard).unwrap();
        std::fs::write(shard.join(".k3.json.abc.tmp"), b"partial").unwrap();

        let store: FileStore<String, PlainCodec> =
            FileStore::open(config(tmp.path(), 1), PlainCodec, TierLevel::Warm)
                .await
                .unwrap();

        let (files, temps) = scan_shards(tmp.path(), "json").await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(temps.is_empty());
        assert_eq!(store.size_bytes(), files.iter().map(|f| f.len).sum::<u64>());
    }

    #[tokio::test]
    async fn test_invalid_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let store: FileStore<String, PlainCodec> =
            FileStore::open(config(tmp.path(), 1), PlainCodec, TierLevel::Warm)
                .await
                .unwrap();

        let result = store.set("../escape", "v".to_string(), None).await;
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
        assert!(store.get_entry("../escape").await.is_none());
        assert!(!store.delete("../escape").await.unwrap());
    }

    #[tokio::test]
    async fn test_drifted_size_resyncs_to_disk_total() {
        let tmp = TempDir::new().unwrap();
        let store: FileStore<String, PlainCodec> =
            FileStore::open(config(tmp.path(), 1), PlainCodec, TierLevel::Warm)
                .await
                .unwrap();

        store.set("a", "a".repeat(400 * 1024), None).await.unwrap();
        store.set("p", "p".repeat(300 * 1024), None).await.unwrap();

        // removed behind the store's back, so the running total is stale
        std::fs::remove_file(store.path_for("a").unwrap()).unwrap();

        let report = store.set("p", "q".repeat(800 * 1024), None).await.unwrap();
        assert!(report.evicted.is_empty());

        let (files, _) = scan_shards(tmp.path(), "json").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(store.size_bytes(), files[0].len);
        assert_eq!(store.size_bytes(), report.stored_bytes);
    }

    #[tokio::test]
    async fn test_refresh_skips_replaced_entry() {
        let tmp = TempDir::new().unwrap();
        let store: FileStore<String, PlainCodec> =
            FileStore::open(config(tmp.path(), 1), PlainCodec, TierLevel::Warm)
                .await
                .unwrap();

        store.set("k1", "old".to_string(), None).await.unwrap();
        let stale = store.peek_entry("k1").await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        store.set("k1", "new".to_string(), None).await.unwrap();

        let path = store.path_for("k1").unwrap();
        store.schedule_refresh(path, &stale);
        store.flush_refreshes().await;

        assert_eq!(store.peek_entry("k1").await.unwrap().value, "new");
    }
}
