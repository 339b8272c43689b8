//! Per-SIDNO mutex and condition variable array
//!
//! [`MutexCondArray`] holds one mutex + condition variable pair per
//! SIDNO. Sessions working on unrelated replication sources lock
//! different pairs and never contend; sessions waiting for a specific
//! group to be ended block on that SIDNO's condition variable and are
//! woken by [`MutexCondArray::broadcast`].
//!
//! The backing array grows like every SIDNO-indexed structure in this
//! subsystem: check under the read lock, release, take the write lock,
//! re-check (another thread may have grown it already), grow. There is a
//! short window between the two acquisitions with no lock held at all;
//! callers must not assume atomicity across [`ensure_sidno`].
//!
//! The base wait has no timeout. Cancellation is the caller's job:
//! re-check a kill flag every time the wait returns.
//!
//! [`ensure_sidno`]: MutexCondArray::ensure_sidno

use grouplog_core::Sidno;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::sync::Arc;

#[derive(Default)]
struct SidnoCond {
    mutex: Mutex<()>,
    cond: Condvar,
}

/// Growable array of one mutex + condition variable per SIDNO.
#[derive(Default)]
pub struct MutexCondArray {
    // Arc per slot: a clone stays valid across array growth, so a thread
    // parked on a condition variable never holds the array lock.
    slots: RwLock<Vec<Arc<SidnoCond>>>,
}

impl MutexCondArray {
    /// Create an empty array.
    pub fn new() -> Self {
        MutexCondArray::default()
    }

    /// Highest SIDNO the array currently covers (0 when empty).
    pub fn max_sidno(&self) -> Sidno {
        self.slots.read().len() as Sidno
    }

    /// Grow the array so that `sidno` has a mutex and condition variable.
    ///
    /// Safe to call concurrently; whichever thread wins the write lock
    /// performs the growth, the rest re-check and return.
    pub fn ensure_sidno(&self, sidno: Sidno) {
        debug_assert!(sidno > 0);
        if (self.slots.read().len() as Sidno) >= sidno {
            return;
        }
        // No lock held here: another thread may grow the array first.
        let mut slots = self.slots.write();
        while (slots.len() as Sidno) < sidno {
            slots.push(Arc::new(SidnoCond::default()));
        }
    }

    fn slot(&self, sidno: Sidno) -> Arc<SidnoCond> {
        self.ensure_sidno(sidno);
        Arc::clone(&self.slots.read()[sidno as usize - 1])
    }

    /// Run `f` while holding `sidno`'s mutex.
    ///
    /// The closure receives a [`SidnoLock`] through which it can wait on
    /// the SIDNO's condition variable; the mutex is released (and
    /// re-acquired) around each wait, and released for good when the
    /// closure returns.
    pub fn with_locked<R>(&self, sidno: Sidno, f: impl FnOnce(&mut SidnoLock<'_>) -> R) -> R {
        let slot = self.slot(sidno);
        let guard = slot.mutex.lock();
        let mut lock = SidnoLock {
            guard,
            cond: &slot.cond,
        };
        f(&mut lock)
    }

    /// Run `f` while holding the mutexes of every SIDNO in `sidnos`.
    ///
    /// Mutexes are always acquired in increasing SIDNO order so that two
    /// threads locking overlapping SIDNO sets cannot deadlock.
    pub fn with_all_locked<R>(&self, sidnos: &[Sidno], f: impl FnOnce() -> R) -> R {
        let mut ordered: Vec<Sidno> = sidnos.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        let slots: Vec<Arc<SidnoCond>> = ordered.iter().map(|&s| self.slot(s)).collect();
        let guards: Vec<MutexGuard<'_, ()>> = slots.iter().map(|s| s.mutex.lock()).collect();
        let result = f();
        drop(guards);
        result
    }

    /// Wake every thread waiting on `sidno`'s condition variable.
    pub fn broadcast(&self, sidno: Sidno) {
        self.slot(sidno).cond.notify_all();
    }
}

/// Handle to one held SIDNO mutex, passed to [`MutexCondArray::with_locked`]
/// closures.
pub struct SidnoLock<'a> {
    guard: MutexGuard<'a, ()>,
    cond: &'a Condvar,
}

impl SidnoLock<'_> {
    /// Block until the SIDNO's condition variable is broadcast.
    ///
    /// The mutex is released while parked and held again on return.
    /// Spurious wakeups are possible; callers re-check their predicate
    /// (and their kill flag) in a loop.
    pub fn wait(&mut self) {
        self.cond.wait(&mut self.guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_grows_on_demand() {
        let array = MutexCondArray::new();
        assert_eq!(array.max_sidno(), 0);
        array.ensure_sidno(3);
        assert_eq!(array.max_sidno(), 3);
        // Growing to a smaller sidno is a no-op
        array.ensure_sidno(1);
        assert_eq!(array.max_sidno(), 3);
    }

    #[test]
    fn test_with_locked_is_mutually_exclusive() {
        let array = Arc::new(MutexCondArray::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let array = Arc::clone(&array);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    array.with_locked(1, |_| {
                        let seen = counter.load(Ordering::Relaxed);
                        counter.store(seen + 1, Ordering::Relaxed);
                    });
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 2000);
    }

    #[test]
    fn test_broadcast_wakes_waiter() {
        let array = Arc::new(MutexCondArray::new());
        array.ensure_sidno(2);
        let done = Arc::new(AtomicBool::new(false));

        let waiter = {
            let array = Arc::clone(&array);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                array.with_locked(2, |lock| {
                    while !done.load(Ordering::Relaxed) {
                        lock.wait();
                    }
                });
            })
        };

        thread::sleep(Duration::from_millis(20));
        array.with_locked(2, |_| done.store(true, Ordering::Relaxed));
        array.broadcast(2);
        waiter.join().unwrap();
    }

    #[test]
    fn test_overlapping_multi_lock_does_not_deadlock() {
        let array = Arc::new(MutexCondArray::new());
        array.ensure_sidno(4);
        let a = {
            let array = Arc::clone(&array);
            // Deliberately pass sidnos out of order
            thread::spawn(move || {
                for _ in 0..200 {
                    array.with_all_locked(&[3, 1, 2], || {});
                }
            })
        };
        let b = {
            let array = Arc::clone(&array);
            thread::spawn(move || {
                for _ in 0..200 {
                    array.with_all_locked(&[2, 4, 3], || {});
                }
            })
        };
        a.join().unwrap();
        b.join().unwrap();
    }
}
