use crate::snapshot::{LayerSnapshot, read_glob_order, read_type_list};
use derive_more::Display;
use mimedb_config::LayerConfig;
use mimedb_format::error::ErrorKind as FormatError;
use mimedb_format::{CacheHandle, Stamp};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::instrument;

/// Where a layer is in its load cycle.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum LayerStatus {
    #[display("unloaded")]
    Unloaded,
    #[display("loading")]
    Loading,
    #[display("ready")]
    Ready,
    #[display("invalid")]
    Invalid,
}

enum LayerState {
    Unloaded,
    Loading,
    Ready(Arc<LayerSnapshot>),
    /// Skipped until `stamp` goes out of date, or until the next check when
    /// the failure was transient.
    Invalid { stamp: Stamp, reason: String, transient: bool },
}

/// One MIME data directory in a [`ProviderChain`](crate::ProviderChain).
///
/// The cache is loaded on first use. At most one thread loads a layer at a
/// time; the others wait for it and then share the same snapshot. A layer
/// whose cache is corrupt stays [`LayerStatus::Invalid`] until the file
/// changes on disk or [`invalidate`](Self::invalidate) is called.
pub struct ProviderLayer {
    name: String,
    cache_path: PathBuf,
    types_path: PathBuf,
    globs_path: PathBuf,
    stamp_files: Vec<PathBuf>,
    recheck_interval: Duration,
    state: RwLock<LayerState>,
    load_lock: Mutex<()>,
    epoch: Instant,
    /// Nanoseconds after `epoch` when the files are next due a check; zero
    /// means the next query checks.
    next_check: AtomicU64,
}
impl ProviderLayer {
    pub fn new(config: &LayerConfig, recheck_interval: Duration) -> Self {
        Self {
            name: config.name.clone(),
            cache_path: config.cache_path(),
            types_path: config.types_path(),
            globs_path: config.globs_path(),
            stamp_files: config.stamp_files.clone(),
            recheck_interval,
            state: RwLock::new(LayerState::Unloaded),
            load_lock: Mutex::new(()),
            epoch: Instant::now(),
            next_check: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn status(&self) -> LayerStatus {
        match &*self.state.read() {
            LayerState::Unloaded => LayerStatus::Unloaded,
            LayerState::Loading => LayerStatus::Loading,
            LayerState::Ready(_) => LayerStatus::Ready,
            LayerState::Invalid { .. } => LayerStatus::Invalid,
        }
    }

    /// Why the layer is invalid, if it is.
    pub fn invalid_reason(&self) -> Option<String> {
        match &*self.state.read() {
            LayerState::Invalid { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    /// The current snapshot, loading the layer first if needed. `None` while
    /// the layer is invalid.
    pub fn snapshot(&self) -> Option<Arc<LayerSnapshot>> {
        self.revalidate();
        if let Some(settled) = self.settled() {
            return settled;
        }
        let _guard = self.load_lock.lock();
        // Another thread may have finished loading while we waited.
        if let Some(settled) = self.settled() {
            return settled;
        }
        *self.state.write() = LayerState::Loading;
        let next = self.load();
        let snapshot = match &next {
            LayerState::Ready(snapshot) => Some(snapshot.clone()),
            _ => None,
        };
        *self.state.write() = next;
        snapshot
    }

    /// `Some` once the layer is ready or invalid; `None` if it still has to be loaded.
    fn settled(&self) -> Option<Option<Arc<LayerSnapshot>>> {
        match &*self.state.read() {
            LayerState::Ready(snapshot) => Some(Some(snapshot.clone())),
            LayerState::Invalid { .. } => Some(None),
            LayerState::Unloaded | LayerState::Loading => None,
        }
    }

    /// Drop the loaded snapshot so the next query loads the layer again.
    /// Queries already holding the old snapshot keep using it.
    pub fn invalidate(&self) {
        let _guard = self.load_lock.lock();
        *self.state.write() = LayerState::Unloaded;
        self.next_check.store(0, Ordering::Release);
    }

    /// Check the files on disk, at most once per recheck interval, and
    /// invalidate the layer if they changed.
    fn revalidate(&self) {
        let now = nanos(self.epoch.elapsed());
        let due = self.next_check.load(Ordering::Acquire);
        if now < due {
            return;
        }
        let next = now.saturating_add(nanos(self.recheck_interval)).max(1);
        // Only the thread that moves the deadline checks the files.
        if self.next_check.compare_exchange(due, next, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }
        let outdated = match &*self.state.read() {
            LayerState::Ready(snapshot) => snapshot.stamp().is_outdated(),
            LayerState::Invalid { transient: true, .. } => true,
            LayerState::Invalid { stamp, .. } => stamp.is_outdated(),
            LayerState::Unloaded | LayerState::Loading => false,
        };
        if outdated {
            tracing::info!(
                layer = %self.name,
                path = %self.cache_path.display(),
                "MIME cache changed on disk; reloading"
            );
            let _guard = self.load_lock.lock();
            *self.state.write() = LayerState::Unloaded;
        }
    }

    fn companions(&self) -> Vec<PathBuf> {
        self.stamp_files.iter().cloned().chain([self.types_path.clone(), self.globs_path.clone()]).collect()
    }

    #[instrument(level = "debug", skip(self), fields(layer = %self.name, path = %self.cache_path.display()))]
    fn load(&self) -> LayerState {
        let companions = self.companions();
        let listed = read_type_list(&self.types_path);
        let glob_order = read_glob_order(&self.globs_path);
        match CacheHandle::open_with_stamps(&self.cache_path, &companions) {
            Ok(cache) => {
                let stamp = cache.stamp().cloned().unwrap_or_else(|| Stamp::capture(&self.cache_path, &companions));
                tracing::debug!(listed = listed.len(), "Loaded MIME layer");
                let snapshot = LayerSnapshot::new(Some(cache), stamp, listed).with_glob_order(glob_order);
                LayerState::Ready(Arc::new(snapshot))
            },
            Err(err) if matches!(&*err, FormatError::NotFound(_)) => {
                tracing::debug!(listed = listed.len(), "No MIME cache; layer is empty");
                let stamp = Stamp::capture(&self.cache_path, &companions);
                LayerState::Ready(Arc::new(LayerSnapshot::new(None, stamp, listed).with_glob_order(glob_order)))
            },
            Err(err) => {
                let transient = !err.invalidates_cache();
                tracing::warn!(error = ?err, transient, "MIME cache unusable; skipping layer");
                LayerState::Invalid {
                    stamp: Stamp::capture(&self.cache_path, &companions),
                    reason: (*err).to_string(),
                    transient,
                }
            },
        }
    }
}
impl std::fmt::Debug for ProviderLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLayer")
            .field("name", &self.name)
            .field("cache_path", &self.cache_path)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use mimedb_format::writer::{CacheWriter, TypeDefinition};
    use std::thread;

    fn layer(dir: &Path, recheck_interval: Duration) -> ProviderLayer {
        ProviderLayer::new(&LayerConfig::new("test", dir), recheck_interval)
    }

    fn write_cache(dir: &Path, mime: &str, mtime: i64) {
        let path = dir.join(mimedb_format::CACHE_FILE_NAME);
        CacheWriter::new().with(TypeDefinition::new(mime).glob("*.foo")).write(&path).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    #[test]
    fn test_missing_cache_is_an_empty_layer() {
        let dir = tempfile::tempdir().unwrap();
        let layer = layer(dir.path(), Duration::ZERO);
        assert_eq!(layer.status(), LayerStatus::Unloaded);
        let snapshot = layer.snapshot().unwrap();
        assert!(snapshot.cache().is_none());
        assert_eq!(layer.status(), LayerStatus::Ready);
    }

    #[test]
    fn test_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), "text/x-foo", 1_000_000);
        let layer = layer(dir.path(), Duration::from_secs(3600));
        let first = layer.snapshot().unwrap();
        let second = layer.snapshot().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.knows("text/x-foo"));
    }

    #[test]
    fn test_corrupt_cache_is_invalid_until_it_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(mimedb_format::CACHE_FILE_NAME);
        std::fs::write(&path, [0xffu8; 64]).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        let layer = layer(dir.path(), Duration::ZERO);

        assert!(layer.snapshot().is_none());
        assert_eq!(layer.status(), LayerStatus::Invalid);
        assert!(layer.invalid_reason().unwrap().contains("unsupported cache version"));
        // Still invalid: nothing changed on disk.
        assert!(layer.snapshot().is_none());

        write_cache(dir.path(), "text/x-foo", 2_000_000);
        let snapshot = layer.snapshot().unwrap();
        assert!(snapshot.knows("text/x-foo"));
    }

    #[test]
    fn test_stale_cache_reloads() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), "text/x-old", 1_000_000);
        let layer = layer(dir.path(), Duration::ZERO);
        assert!(layer.snapshot().unwrap().knows("text/x-old"));

        write_cache(dir.path(), "text/x-new", 2_000_000);
        let snapshot = layer.snapshot().unwrap();
        assert!(snapshot.knows("text/x-new"));
        assert!(!snapshot.knows("text/x-old"));
    }

    #[test]
    fn test_recheck_is_throttled() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), "text/x-old", 1_000_000);
        let layer = layer(dir.path(), Duration::from_secs(3600));
        assert!(layer.snapshot().unwrap().knows("text/x-old"));

        write_cache(dir.path(), "text/x-new", 2_000_000);
        assert!(layer.snapshot().unwrap().knows("text/x-old"));
        layer.invalidate();
        assert!(layer.snapshot().unwrap().knows("text/x-new"));
    }

    #[test]
    fn test_check_deadline_moves_once_per_interval() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), "text/x-old", 1_000_000);
        let layer = layer(dir.path(), Duration::from_secs(3600));
        let first = layer.snapshot().unwrap();
        let due = layer.next_check.load(Ordering::Acquire);
        assert!(due >= nanos(Duration::from_secs(3600)));

        write_cache(dir.path(), "text/x-new", 2_000_000);
        let snapshots: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| layer.snapshot().unwrap())).collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });
        assert!(snapshots.iter().all(|snapshot| Arc::ptr_eq(snapshot, &first)));
        assert_eq!(layer.next_check.load(Ordering::Acquire), due);

        layer.invalidate();
        assert_eq!(layer.next_check.load(Ordering::Acquire), 0);
        assert!(layer.snapshot().unwrap().knows("text/x-new"));
    }

    #[test]
    fn test_cache_appearing_later() {
        let dir = tempfile::tempdir().unwrap();
        let layer = layer(dir.path(), Duration::ZERO);
        assert!(!layer.snapshot().unwrap().knows("text/x-foo"));
        write_cache(dir.path(), "text/x-foo", 1_000_000);
        assert!(layer.snapshot().unwrap().knows("text/x-foo"));
    }

    #[test]
    fn test_concurrent_first_use_shares_one_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), "text/x-foo", 1_000_000);
        let layer = layer(dir.path(), Duration::from_secs(3600));
        let snapshots: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| layer.snapshot().unwrap())).collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });
        assert!(snapshots.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }
}
