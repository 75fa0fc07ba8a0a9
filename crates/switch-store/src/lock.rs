//! Store-wide and per-object locking.
//!
//! Three primitives live here:
//!
//! - [`StoreLock`]: the coarse re-entrant lock every mutating operation
//!   takes. Callers hold it across a batch of operations with
//!   [`SwitchStore::switch_store_lock`]. It is re-entrant so trigger hooks
//!   running inside a mutation can call back into the store on the same
//!   thread.
//! - [`ObjectLocks`]: advisory, non-blocking per-handle locks used by
//!   adapters that update hardware state outside the coarse lock.
//! - [`StoreContext`]: warm-init flag, the FDB flush lock and the default
//!   scan batch size.

use crate::handle::Handle;
use crate::store::SwitchStore;
use log::{debug, trace};
use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Coarse store lock.
#[derive(Debug, Default)]
pub(crate) struct StoreLock {
    inner: ReentrantMutex<()>,
}

impl StoreLock {
    pub(crate) fn lock(&self) -> StoreLockGuard<'_> {
        StoreLockGuard {
            _guard: self.inner.lock(),
        }
    }
}

/// Holds the coarse store lock until dropped.
///
/// Operations issued by the holding thread while the guard is alive form
/// one batch that no other thread's mutation can interleave with. There is
/// no rollback: a failed operation inside the batch leaves earlier ones in
/// place.
#[must_use = "the store lock is released when the guard is dropped"]
pub struct StoreLockGuard<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
}

/// Set of handles currently holding an advisory lock.
#[derive(Debug, Default)]
pub(crate) struct ObjectLocks {
    locked: Mutex<HashSet<Handle>>,
}

impl ObjectLocks {
    /// Runs `f` with the lock set held, so an existence check inside `f`
    /// and the insert happen atomically with respect to `clear`.
    pub(crate) fn try_lock_if(&self, handle: Handle, exists: impl FnOnce() -> bool) -> bool {
        let mut locked = self.locked.lock();
        if locked.contains(&handle) || !exists() {
            return false;
        }
        locked.insert(handle)
    }

    pub(crate) fn unlock(&self, handle: Handle) -> bool {
        self.locked.lock().remove(&handle)
    }

    pub(crate) fn is_locked(&self, handle: Handle) -> bool {
        self.locked.lock().contains(&handle)
    }

    pub(crate) fn clear(&self, handle: Handle) {
        self.locked.lock().remove(&handle);
    }

    pub(crate) fn clear_all(&self) {
        self.locked.lock().clear();
    }
}

/// Batch size for [`SwitchStore::object_scan`] until configured.
pub const DEFAULT_SCAN_BATCH: usize = 256;

/// Process-wide flags shared by adapters.
#[derive(Debug)]
pub(crate) struct StoreContext {
    warm_init: AtomicBool,
    fdb_flush: Mutex<()>,
    dump_path: Mutex<Option<PathBuf>>,
    scan_batch: AtomicUsize,
}

impl Default for StoreContext {
    fn default() -> Self {
        Self {
            warm_init: AtomicBool::new(false),
            fdb_flush: Mutex::new(()),
            dump_path: Mutex::new(None),
            scan_batch: AtomicUsize::new(DEFAULT_SCAN_BATCH),
        }
    }
}

impl StoreContext {
    pub(crate) fn scan_batch(&self) -> usize {
        self.scan_batch.load(Ordering::Relaxed)
    }

    pub(crate) fn set_scan_batch(&self, size: usize) {
        self.scan_batch.store(size.max(1), Ordering::Relaxed);
    }

    pub(crate) fn set_warm_init(&self, on: bool) -> bool {
        self.warm_init.swap(on, Ordering::SeqCst)
    }

    pub(crate) fn warm_init(&self) -> bool {
        self.warm_init.load(Ordering::SeqCst)
    }

    pub(crate) fn set_dump_path(&self, path: Option<PathBuf>) {
        *self.dump_path.lock() = path;
    }

    pub(crate) fn dump_path(&self) -> Option<PathBuf> {
        self.dump_path.lock().clone()
    }
}

impl SwitchStore {
    /// Takes the coarse lock for a batch of operations.
    pub fn switch_store_lock(&self) -> StoreLockGuard<'_> {
        trace!("store lock acquired");
        self.store_lock.lock()
    }

    /// Releases a batch guard. Equivalent to dropping it.
    pub fn switch_store_unlock(&self, guard: StoreLockGuard<'_>) {
        drop(guard);
        trace!("store lock released");
    }

    /// Non-blocking advisory lock on a live object.
    ///
    /// Returns false if the object is already locked or does not exist.
    /// Deleting the object clears its lock.
    pub fn object_try_lock(&self, handle: Handle) -> bool {
        let acquired = self
            .object_locks
            .try_lock_if(handle, || self.object_exists(handle));
        debug!("try_lock {} -> {}", handle, acquired);
        acquired
    }

    /// Releases an advisory lock. Returns false if it was not held.
    pub fn object_unlock(&self, handle: Handle) -> bool {
        self.object_locks.unlock(handle)
    }

    pub fn object_is_locked(&self, handle: Handle) -> bool {
        self.object_locks.is_locked(handle)
    }

    /// Serializes FDB flush sequences across adapters.
    pub fn fdb_flush_lock(&self) -> MutexGuard<'_, ()> {
        self.context.fdb_flush.lock()
    }

    /// Whether a warm-init replay is in progress.
    pub fn is_warm_init(&self) -> bool {
        self.context.warm_init()
    }

    pub fn warm_init_begin(&self) {
        if !self.context.set_warm_init(true) {
            debug!("warm init started");
        }
    }

    pub fn warm_init_end(&self) {
        if self.context.set_warm_init(false) {
            debug!("warm init finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ObjectType;

    #[test]
    fn test_object_lock_is_exclusive() {
        let locks = ObjectLocks::default();
        let h = Handle::new(ObjectType(1), 1);
        assert!(locks.try_lock_if(h, || true));
        assert!(!locks.try_lock_if(h, || true));
        assert!(locks.unlock(h));
        assert!(!locks.unlock(h));
        assert!(locks.try_lock_if(h, || true));
        locks.clear(h);
        assert!(!locks.is_locked(h));
    }

    #[test]
    fn test_missing_object_cannot_be_locked() {
        let locks = ObjectLocks::default();
        let h = Handle::new(ObjectType(1), 1);
        assert!(!locks.try_lock_if(h, || false));
        assert!(!locks.is_locked(h));
    }

    #[test]
    fn test_store_lock_is_reentrant() {
        let lock = StoreLock::default();
        let _a = lock.lock();
        let _b = lock.lock();
    }

    #[test]
    fn test_warm_init_flag() {
        let ctx = StoreContext::default();
        assert!(!ctx.warm_init());
        assert!(!ctx.set_warm_init(true));
        assert!(ctx.warm_init());
        assert!(ctx.set_warm_init(false));
    }
}
