//! Aggregate state of the group log: ended groups, owned groups, and
//! the per-SIDNO locks that coordinate the two.
//!
//! [`GroupLogState`] upholds one invariant: a given `(sidno, gno)` is
//! in at most one of the ended set and the owned map at any instant.
//! Every mutation that moves a group between the two happens while
//! holding the ended set's write lock, and every reader that inspects
//! both holds its read lock, so the transition is never partially
//! visible.
//!
//! Lock order is always SIDNO mutex first, ended-set lock second.
//! [`acquire_ownership`], [`get_automatic_gno`], [`mark_partial`] and
//! [`abandon`] expect the caller to already hold the SIDNO's mutex via
//! [`with_sidno_locked`], so that GNO allocation and ownership
//! acquisition are atomic with respect to other sessions on the same
//! SIDNO. [`end_group`] and [`wait_for_group`] take the mutex
//! themselves.
//!
//! [`acquire_ownership`]: GroupLogState::acquire_ownership
//! [`get_automatic_gno`]: GroupLogState::get_automatic_gno
//! [`mark_partial`]: GroupLogState::mark_partial
//! [`abandon`]: GroupLogState::abandon
//! [`end_group`]: GroupLogState::end_group
//! [`wait_for_group`]: GroupLogState::wait_for_group
//! [`with_sidno_locked`]: GroupLogState::with_sidno_locked

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use grouplog_concurrency::{CheckableRwLock, CheckedReadGuard, MutexCondArray, SidnoLock};
use grouplog_core::{Error, Gno, Group, GroupStatus, Owner, Result, Sidno};
use grouplog_storage::{GroupSet, SidMap};
use tracing::{debug, trace};

use crate::owned::OwnedGroups;

/// Ended set, owned map, and per-SIDNO locks of one group log.
pub struct GroupLogState {
    sid_map: Arc<SidMap>,
    locks: MutexCondArray,
    ended: CheckableRwLock<GroupSet>,
    owned: OwnedGroups,
}

impl GroupLogState {
    /// Create an empty state over `sid_map`.
    pub fn new(sid_map: Arc<SidMap>) -> Self {
        let ended = GroupSet::new(Arc::clone(&sid_map));
        GroupLogState {
            sid_map,
            locks: MutexCondArray::new(),
            ended: CheckableRwLock::new(ended),
            owned: OwnedGroups::new(),
        }
    }

    /// The SID map identities are resolved against.
    pub fn sid_map(&self) -> &Arc<SidMap> {
        &self.sid_map
    }

    /// Grow every SIDNO-indexed structure to cover `sidno`.
    pub fn ensure_sidno(&self, sidno: Sidno) {
        self.locks.ensure_sidno(sidno);
        self.owned.ensure_sidno(sidno);
        self.ended.write().ensure_sidno(sidno);
    }

    /// Run `f` while holding `sidno`'s mutex.
    pub fn with_sidno_locked<R>(&self, sidno: Sidno, f: impl FnOnce(&mut SidnoLock<'_>) -> R) -> R {
        self.locks.with_locked(sidno, f)
    }

    /// Run `f` while holding the mutex of every SIDNO in `set`.
    ///
    /// Mutexes are acquired in increasing SIDNO order regardless of the
    /// set's internal order, so overlapping callers cannot deadlock.
    pub fn with_set_locked<R>(&self, set: &GroupSet, f: impl FnOnce() -> R) -> R {
        let sidnos = self.sid_map.sidnos_in_sid_order();
        let touched: Vec<Sidno> = sidnos
            .into_iter()
            .filter(|&sidno| set.intervals(sidno).next().is_some())
            .collect();
        self.locks.with_all_locked(&touched, f)
    }

    /// Record `owner` as the owner of `(sidno, gno)`.
    ///
    /// Caller holds the SIDNO's mutex. Fails when the group has already
    /// been ended or is owned by another session.
    pub fn acquire_ownership(&self, sidno: Sidno, gno: Gno, owner: Owner) -> Result<()> {
        let ended = self.ended.read();
        if ended.contains_group(Group::new(sidno, gno)) {
            return Err(Error::GroupEnded { sidno, gno });
        }
        self.owned.add(sidno, gno, owner)?;
        drop(ended);
        trace!(sidno, gno, "ownership acquired");
        Ok(())
    }

    /// The GNO an automatically numbered transaction on `sidno` gets:
    /// one past the largest GNO in the ended set or the owned map.
    ///
    /// Caller holds the SIDNO's mutex across this call and the
    /// following [`acquire_ownership`](Self::acquire_ownership), or two
    /// sessions may compute the same number.
    pub fn get_automatic_gno(&self, sidno: Sidno) -> Gno {
        let ended_next = self.ended.read().next_free_gno(sidno);
        let owned_max = self.owned.max_gno(sidno);
        ended_next.max(owned_max + 1)
    }

    /// Allocate the next automatic GNO and acquire ownership of it.
    pub fn acquire_automatic(&self, sidno: Sidno, owner: Owner) -> Result<Gno> {
        let gno = self.get_automatic_gno(sidno);
        self.acquire_ownership(sidno, gno, owner)?;
        Ok(gno)
    }

    /// Mark that the group's first statement is durably logged.
    ///
    /// Caller holds the SIDNO's mutex. Marking twice is a caller bug.
    pub fn mark_partial(&self, sidno: Sidno, gno: Gno) -> Result<()> {
        let previous = self
            .owned
            .mark_partial(sidno, gno)
            .ok_or(Error::NotOwned { sidno, gno })?;
        debug_assert!(!previous, "group {sidno}:{gno} marked partial twice");
        Ok(())
    }

    /// Release ownership of `(sidno, gno)` without ending it.
    ///
    /// Caller holds the SIDNO's mutex. The group returns to the
    /// unlogged state and its GNO may be reissued.
    pub fn abandon(&self, sidno: Sidno, gno: Gno) -> Result<()> {
        // Taken for writing so the removal cannot interleave with a
        // reader snapshotting both structures.
        let ended = self.ended.write();
        self.owned
            .remove(sidno, gno)
            .ok_or(Error::NotOwned { sidno, gno })?;
        drop(ended);
        debug!(sidno, gno, "ownership abandoned");
        Ok(())
    }

    /// Move `(sidno, gno)` from owned to ended and wake its waiters.
    ///
    /// Takes the SIDNO's mutex itself; the caller must not hold it. A
    /// group that was never owned (log replay at startup) is added to
    /// the ended set directly.
    pub fn end_group(&self, sidno: Sidno, gno: Gno) -> Result<()> {
        self.ensure_sidno(sidno);
        self.locks.with_locked(sidno, |_| {
            let mut ended = self.ended.write();
            self.owned.remove(sidno, gno);
            ended.add_group(Group::new(sidno, gno));
        });
        self.locks.broadcast(sidno);
        trace!(sidno, gno, "group ended");
        Ok(())
    }

    /// Lifecycle state of `(sidno, gno)`.
    pub fn group_status(&self, sidno: Sidno, gno: Gno) -> GroupStatus {
        // Holding the ended read lock pins the owned map too: the
        // owned-to-ended transition mutates both under the write lock.
        let ended = self.ended.read();
        if ended.contains_group(Group::new(sidno, gno)) {
            GroupStatus::Ended
        } else if self.owned.contains(sidno, gno) {
            GroupStatus::Owned
        } else {
            GroupStatus::Unlogged
        }
    }

    /// Block until `(sidno, gno)` is ended or `killed` is set.
    ///
    /// Takes the SIDNO's mutex itself. The kill flag is re-checked
    /// after every wakeup, so setting it and broadcasting the SIDNO
    /// interrupts the wait.
    pub fn wait_for_group(&self, sidno: Sidno, gno: Gno, killed: &AtomicBool) -> Result<()> {
        self.ensure_sidno(sidno);
        self.locks.with_locked(sidno, |lock| loop {
            if self.ended.read().contains_group(Group::new(sidno, gno)) {
                return Ok(());
            }
            if killed.load(Ordering::Relaxed) {
                return Err(Error::Interrupted);
            }
            lock.wait();
        })
    }

    /// Wake every waiter on `sidno`, for kill-flag delivery.
    pub fn broadcast_sidno(&self, sidno: Sidno) {
        self.locks.broadcast(sidno);
    }

    /// Read access to the ended set.
    pub fn ended(&self) -> CheckedReadGuard<'_, GroupSet> {
        self.ended.read()
    }

    /// What is known about an owned group, if it is owned.
    pub fn owned_info(&self, sidno: Sidno, gno: Gno) -> Option<crate::owned::OwnedInfo> {
        self.owned.get(sidno, gno)
    }
}
