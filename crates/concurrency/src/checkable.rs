//! Reader/writer lock with debug-only state assertions
//!
//! [`CheckableRwLock`] wraps `parking_lot::RwLock` and, in debug builds
//! only, tracks the holder state in an atomic counter: `> 0` means that
//! many readers, `-1` means one writer, `0` means free. The counter adds
//! no behavior and must never be relied on for correctness; it exists so
//! that code which *requires* a lock to be held can catch missing-lock
//! bugs in tests via the `assert_*` methods.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicI32, Ordering};

/// Reader/writer lock with debug-only holder tracking.
#[derive(Debug, Default)]
pub struct CheckableRwLock<T> {
    inner: RwLock<T>,
    #[cfg(debug_assertions)]
    holders: AtomicI32,
}

impl<T> CheckableRwLock<T> {
    /// Create a lock around `value`.
    pub fn new(value: T) -> Self {
        CheckableRwLock {
            inner: RwLock::new(value),
            #[cfg(debug_assertions)]
            holders: AtomicI32::new(0),
        }
    }

    /// Acquire a shared read lock, blocking until available.
    pub fn read(&self) -> CheckedReadGuard<'_, T> {
        let guard = self.inner.read();
        #[cfg(debug_assertions)]
        self.holders.fetch_add(1, Ordering::Relaxed);
        CheckedReadGuard { guard, lock: self }
    }

    /// Acquire the exclusive write lock, blocking until available.
    pub fn write(&self) -> CheckedWriteGuard<'_, T> {
        let guard = self.inner.write();
        #[cfg(debug_assertions)]
        self.holders.store(-1, Ordering::Relaxed);
        CheckedWriteGuard { guard, lock: self }
    }

    /// Assert that at least one reader or the writer holds the lock.
    ///
    /// No-op in release builds.
    pub fn assert_some_lock(&self) {
        #[cfg(debug_assertions)]
        debug_assert_ne!(self.holders.load(Ordering::Relaxed), 0);
    }

    /// Assert that at least one reader holds the lock.
    ///
    /// No-op in release builds.
    pub fn assert_some_rdlock(&self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.holders.load(Ordering::Relaxed) > 0);
    }

    /// Assert that the writer holds the lock.
    ///
    /// No-op in release builds.
    pub fn assert_some_wrlock(&self) {
        #[cfg(debug_assertions)]
        debug_assert_eq!(self.holders.load(Ordering::Relaxed), -1);
    }

    /// Assert that nobody holds the lock.
    ///
    /// No-op in release builds.
    pub fn assert_no_lock(&self) {
        #[cfg(debug_assertions)]
        debug_assert_eq!(self.holders.load(Ordering::Relaxed), 0);
    }
}

/// Shared read guard returned by [`CheckableRwLock::read`].
pub struct CheckedReadGuard<'a, T> {
    guard: RwLockReadGuard<'a, T>,
    lock: &'a CheckableRwLock<T>,
}

impl<T> Deref for CheckedReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for CheckedReadGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.lock.holders.fetch_sub(1, Ordering::Relaxed);
        #[cfg(not(debug_assertions))]
        let _ = self.lock;
    }
}

/// Exclusive write guard returned by [`CheckableRwLock::write`].
pub struct CheckedWriteGuard<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
    lock: &'a CheckableRwLock<T>,
}

impl<T> Deref for CheckedWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for CheckedWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for CheckedWriteGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.lock.holders.store(0, Ordering::Relaxed);
        #[cfg(not(debug_assertions))]
        let _ = self.lock;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_read_write_data() {
        let lock = CheckableRwLock::new(vec![1, 2]);
        assert_eq!(lock.read().len(), 2);
        lock.write().push(3);
        assert_eq!(lock.read().len(), 3);
    }

    #[test]
    fn test_asserts_reflect_state() {
        let lock = CheckableRwLock::new(0u32);
        lock.assert_no_lock();
        {
            let _r = lock.read();
            lock.assert_some_rdlock();
            lock.assert_some_lock();
        }
        {
            let _w = lock.write();
            lock.assert_some_wrlock();
            lock.assert_some_lock();
        }
        lock.assert_no_lock();
    }

    #[test]
    fn test_multiple_readers() {
        let lock = CheckableRwLock::new(7u32);
        let r1 = lock.read();
        let r2 = lock.read();
        lock.assert_some_rdlock();
        assert_eq!(*r1 + *r2, 14);
    }

    #[test]
    fn test_writer_excludes_concurrent_writers() {
        let lock = Arc::new(CheckableRwLock::new(0u64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.write() += 1;
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.read(), 8000);
        lock.assert_no_lock();
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn test_missing_lock_is_caught() {
        let lock = CheckableRwLock::new(());
        lock.assert_some_wrlock();
    }
}
