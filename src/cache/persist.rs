//! Debounced snapshot writer shared by the response cache and the hint store
//!
//! Both stores persist as a flat JSON array of `[key, value]` pairs that is
//! fully rewritten on every flush. The first dirty mutation since the last
//! flush arms a timer; every mutation before it fires is absorbed by the
//! same pending write.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::error::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// Timer-driven write coalescer.
pub struct FlushScheduler {
    delay: Duration,
    armed: Arc<AtomicBool>,
    /// Bumped by `cancel` so an already-armed timer becomes a no-op
    generation: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
    /// Held across snapshot and rename so writes land in the order taken
    write_lock: Arc<Mutex<()>>,
}

impl FlushScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            writes: Arc::new(AtomicU64::new(0)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Whether a flush is pending
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Number of snapshot writes performed so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Arm a flush unless one is already pending.
    ///
    /// `snapshot` runs when the timer fires, so it serializes whatever state
    /// exists at that moment. Without a tokio runtime the write happens inline.
    pub fn schedule<F>(&self, path: PathBuf, snapshot: F)
    where
        F: FnOnce() -> Result<Vec<u8>> + Send + 'static,
    {
        if self.armed.swap(true, Ordering::SeqCst) {
            return;
        }

        let armed = Arc::clone(&self.armed);
        let generation = Arc::clone(&self.generation);
        let writes = Arc::clone(&self.writes);
        let write_lock = Arc::clone(&self.write_lock);
        let scheduled_gen = generation.load(Ordering::SeqCst);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let delay = self.delay;
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _guard = write_lock.lock().await;
                    if generation.load(Ordering::SeqCst) != scheduled_gen {
                        return;
                    }
                    // Disarm before snapshotting so later mutations re-arm
                    armed.store(false, Ordering::SeqCst);
                    let written = match snapshot() {
                        Ok(bytes) => write_atomic(&path, bytes).await,
                        Err(e) => Err(e),
                    };
                    match written {
                        Ok(()) => {
                            writes.fetch_add(1, Ordering::SeqCst);
                            log::debug!("Flushed snapshot to {}", path.display());
                        }
                        Err(e) => log::warn!("Snapshot flush to {} failed: {}", path.display(), e),
                    }
                });
            }
            Err(_) => {
                let _guard = write_lock.blocking_lock();
                armed.store(false, Ordering::SeqCst);
                match snapshot().and_then(|bytes| write_atomic_blocking(&path, &bytes)) {
                    Ok(()) => {
                        writes.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => log::warn!("Snapshot flush to {} failed: {}", path.display(), e),
                }
            }
        }
    }

    /// Write a snapshot now and drop any pending flush.
    ///
    /// Waits for an in-flight timer write, so this snapshot is the last one
    /// on disk.
    pub async fn flush_now<F>(&self, path: &Path, snapshot: F) -> Result<()>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        let _guard = self.write_lock.lock().await;
        self.cancel();
        write_atomic(path, snapshot()?).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Drop any pending flush
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.armed.store(false, Ordering::SeqCst);
    }
}

/// Read a `[[key, value], ...]` snapshot.
///
/// A missing or malformed file yields an empty list; persistence is never fatal.
pub fn load_pairs<K, V>(path: &Path) -> Vec<(K, V)>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No snapshot at {}, starting empty", path.display());
            return Vec::new();
        }
        Err(e) => {
            log::warn!("Failed to read snapshot {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(pairs) => pairs,
        Err(e) => {
            log::warn!("Ignoring malformed snapshot {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Serialize pairs into the snapshot format
pub fn encode_pairs<K: Serialize, V: Serialize>(pairs: &[(K, V)]) -> Result<Vec<u8>> {
    serde_json::to_vec(pairs).map_err(|e| CacheError::Serialize(e.to_string()))
}

/// Remove a snapshot file, ignoring absence
pub fn remove_snapshot(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("Failed to delete snapshot {}: {}", path.display(), e);
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write via a temp file and rename so readers never see a partial snapshot
async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CacheError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| CacheError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::Io(format!("Failed to rename {}: {}", tmp.display(), e)))
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CacheError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    let tmp = temp_path(path);
    std::fs::write(&tmp, bytes)
        .map_err(|e| CacheError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| CacheError::Io(format!("Failed to rename {}: {}", tmp.display(), e)))
}
