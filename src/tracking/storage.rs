//! Storage backends for tracking snapshots

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, warn};

use super::store::StoreState;
use crate::error::Result;

/// Longest delay between a change and the snapshot that includes it
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(250);

/// Storage backend trait
pub trait StorageBackend: Send + Sync {
    /// Persist the full tracking state
    fn save_state(&self, state: &StoreState) -> Result<()>;

    /// Load the last saved state, if any
    fn load_state(&self) -> Result<Option<StoreState>>;
}

/// Single JSON file on the local file system
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for LocalStorage {
    fn save_state(&self, state: &StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(state)?;

        // write-then-rename so readers never see a torn file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load_state(&self) -> Result<Option<StoreState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&contents)?))
    }
}

#[derive(Default)]
struct Signal {
    dirty: bool,
    shutdown: bool,
}

struct WriterShared {
    backend: Box<dyn StorageBackend>,
    state: Arc<RwLock<StoreState>>,
    signal: Mutex<Signal>,
    wake: Condvar,
    /// Serializes writes so an older copy never lands after a newer one
    save_lock: Mutex<()>,
}

impl WriterShared {
    fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock();
        let snapshot = self.state.read().clone();
        self.backend.save_state(&snapshot)?;
        debug!(
            runs = snapshot.runs.len(),
            metrics = snapshot.metrics.len(),
            "Tracking snapshot written"
        );
        Ok(())
    }

    fn run(&self, interval: Duration) {
        loop {
            let mut signal = self.signal.lock();
            while !signal.dirty && !signal.shutdown {
                self.wake.wait(&mut signal);
            }
            // coalesce every change made before the deadline
            let deadline = Instant::now() + interval;
            while !signal.shutdown {
                if self.wake.wait_until(&mut signal, deadline).timed_out() {
                    break;
                }
            }
            let dirty = std::mem::take(&mut signal.dirty);
            let shutdown = signal.shutdown;
            drop(signal);

            if dirty {
                if let Err(e) = self.save() {
                    error!(error = %e, "Tracking snapshot write failed");
                }
            }
            if shutdown {
                return;
            }
        }
    }
}

/// Mirrors a store to its backend from a background thread.
///
/// Mutations only mark the state dirty. The thread copies the state under
/// a read lock and writes the copy with no store lock held. Dropping the
/// writer performs a last write of pending changes.
pub(crate) struct SnapshotWriter {
    shared: Arc<WriterShared>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    pub(crate) fn spawn(
        backend: Box<dyn StorageBackend>,
        state: Arc<RwLock<StoreState>>,
        interval: Duration,
    ) -> Result<Self> {
        let shared = Arc::new(WriterShared {
            backend,
            state,
            signal: Mutex::new(Signal::default()),
            wake: Condvar::new(),
            save_lock: Mutex::new(()),
        });
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("runboard-snapshot".to_string())
            .spawn(move || worker.run(interval))?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub(crate) fn notify(&self) {
        self.shared.signal.lock().dirty = true;
        self.shared.wake.notify_one();
    }

    /// Write the current state on the calling thread
    pub(crate) fn flush(&self) -> Result<()> {
        self.shared.save()
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.shared.signal.lock().shutdown = true;
        self.shared.wake.notify_one();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Snapshot writer thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_storage_save_load() {
        let path = std::env::temp_dir()
            .join(format!("runboard_storage_{}", uuid::Uuid::new_v4()))
            .join("store.json");
        let storage = LocalStorage::new(&path);
        assert!(storage.load_state().unwrap().is_none());

        let state = StoreState::default();
        storage.save_state(&state).unwrap();
        assert!(path.exists());
        assert!(storage.load_state().unwrap().is_some());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let path = std::env::temp_dir().join(format!("runboard_corrupt_{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, b"{not json").unwrap();
        let storage = LocalStorage::new(&path);
        assert!(storage.load_state().is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_writer_saves_pending_changes_on_drop() {
        let path = std::env::temp_dir().join(format!("runboard_writer_{}.json", uuid::Uuid::new_v4()));
        let state = Arc::new(RwLock::new(StoreState::default()));
        let writer = SnapshotWriter::spawn(
            Box::new(LocalStorage::new(&path)),
            Arc::clone(&state),
            Duration::from_secs(60),
        )
        .unwrap();

        writer.notify();
        assert!(!path.exists(), "write waits for the deadline");
        drop(writer);

        assert!(LocalStorage::new(&path).load_state().unwrap().is_some());
        let _ = fs::remove_file(&path);
    }
}
