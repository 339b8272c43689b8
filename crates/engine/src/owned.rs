//! In-flight transaction ownership, per SIDNO.
//!
//! [`OwnedGroups`] is a growable array of per-SIDNO hash maps from GNO
//! to the owning session. An entry is created when a session acquires
//! ownership, mutated when the group's first statement reaches the log
//! (`mark_partial`) or when ownership is handed to another session, and
//! deleted on release.
//!
//! The outer array grows like every SIDNO-indexed structure here:
//! check under the read lock, release, re-check under the write lock.
//! The inner maps are sharded hash maps, so sessions owning different
//! groups of the same SIDNO rarely contend.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use grouplog_core::{Error, Gno, Owner, Result, Sidno};
use parking_lot::RwLock;

/// What is known about one owned group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedInfo {
    /// The owning session.
    pub owner: Owner,
    /// Whether the group's first statement is already durably logged.
    pub is_partial: bool,
}

/// Per-SIDNO map of in-flight group ownership.
#[derive(Debug, Default)]
pub struct OwnedGroups {
    sidnos: RwLock<Vec<DashMap<Gno, OwnedInfo>>>,
}

impl OwnedGroups {
    /// Create an empty structure covering no SIDNOs.
    pub fn new() -> Self {
        OwnedGroups::default()
    }

    /// Highest SIDNO currently covered (0 when empty).
    pub fn max_sidno(&self) -> Sidno {
        self.sidnos.read().len() as Sidno
    }

    /// Grow the array so that `sidno` has an ownership map.
    pub fn ensure_sidno(&self, sidno: Sidno) {
        debug_assert!(sidno > 0);
        if (self.sidnos.read().len() as Sidno) >= sidno {
            return;
        }
        let mut sidnos = self.sidnos.write();
        while (sidnos.len() as Sidno) < sidno {
            sidnos.push(DashMap::new());
        }
    }

    /// Record `owner` as the owner of `(sidno, gno)`.
    ///
    /// Fails with [`Error::OwnershipConflict`] when the group is already
    /// owned; the existing entry is untouched. The caller holds the
    /// SIDNO's mutex.
    pub fn add(&self, sidno: Sidno, gno: Gno, owner: Owner) -> Result<()> {
        let sidnos = self.sidnos.read();
        let map = sidnos
            .get(sidno as usize - 1)
            .ok_or(Error::UnknownSidno(sidno))?;
        let outcome = match map.entry(gno) {
            Entry::Occupied(_) => Err(Error::OwnershipConflict { sidno, gno }),
            Entry::Vacant(slot) => {
                slot.insert(OwnedInfo {
                    owner,
                    is_partial: false,
                });
                Ok(())
            }
        };
        outcome
    }

    /// Release `(sidno, gno)`, returning what was known about it.
    pub fn remove(&self, sidno: Sidno, gno: Gno) -> Option<OwnedInfo> {
        let sidnos = self.sidnos.read();
        let map = sidnos.get(sidno as usize - 1)?;
        map.remove(&gno).map(|(_, info)| info)
    }

    /// What is known about `(sidno, gno)`, if it is owned.
    pub fn get(&self, sidno: Sidno, gno: Gno) -> Option<OwnedInfo> {
        let sidnos = self.sidnos.read();
        let map = sidnos.get(sidno as usize - 1)?;
        map.get(&gno).map(|info| *info)
    }

    /// Whether `(sidno, gno)` is currently owned.
    pub fn contains(&self, sidno: Sidno, gno: Gno) -> bool {
        self.get(sidno, gno).is_some()
    }

    /// Mark that the group's first statement is durably logged.
    ///
    /// Returns the previous flag value so the caller can detect a
    /// double mark, or `None` when the group is not owned.
    pub fn mark_partial(&self, sidno: Sidno, gno: Gno) -> Option<bool> {
        let sidnos = self.sidnos.read();
        let map = sidnos.get(sidno as usize - 1)?;
        let mut info = map.get_mut(&gno)?;
        let previous = info.is_partial;
        info.is_partial = true;
        Some(previous)
    }

    /// Hand ownership of `(sidno, gno)` to `owner`.
    ///
    /// Returns the previous owner, or `None` when the group is not
    /// owned (in which case nothing changes).
    pub fn set_owner(&self, sidno: Sidno, gno: Gno, owner: Owner) -> Option<Owner> {
        let sidnos = self.sidnos.read();
        let map = sidnos.get(sidno as usize - 1)?;
        let mut info = map.get_mut(&gno)?;
        let previous = info.owner;
        info.owner = owner;
        Some(previous)
    }

    /// Largest owned GNO for `sidno`, or 0 when none are owned.
    pub fn max_gno(&self, sidno: Sidno) -> Gno {
        let sidnos = self.sidnos.read();
        match sidnos.get(sidno as usize - 1) {
            Some(map) => map.iter().map(|entry| *entry.key()).max().unwrap_or(0),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(thread_id: u64) -> Owner {
        Owner::new(1, thread_id)
    }

    #[test]
    fn test_add_and_release() {
        let owned = OwnedGroups::new();
        owned.ensure_sidno(2);
        owned.add(2, 5, owner(10)).unwrap();
        assert!(owned.contains(2, 5));
        assert_eq!(owned.get(2, 5).unwrap().owner, owner(10));
        assert!(!owned.get(2, 5).unwrap().is_partial);

        let info = owned.remove(2, 5).unwrap();
        assert_eq!(info.owner, owner(10));
        assert!(!owned.contains(2, 5));
        assert!(owned.remove(2, 5).is_none());
    }

    #[test]
    fn test_second_add_conflicts() {
        let owned = OwnedGroups::new();
        owned.ensure_sidno(1);
        owned.add(1, 1, owner(10)).unwrap();
        let err = owned.add(1, 1, owner(11)).unwrap_err();
        assert!(matches!(err, Error::OwnershipConflict { sidno: 1, gno: 1 }));
        // The original owner survives the failed add
        assert_eq!(owned.get(1, 1).unwrap().owner, owner(10));
    }

    #[test]
    fn test_unknown_sidno_is_an_error() {
        let owned = OwnedGroups::new();
        owned.ensure_sidno(1);
        assert!(matches!(
            owned.add(2, 1, owner(10)),
            Err(Error::UnknownSidno(2))
        ));
    }

    #[test]
    fn test_mark_partial_reports_previous_value() {
        let owned = OwnedGroups::new();
        owned.ensure_sidno(1);
        owned.add(1, 3, owner(10)).unwrap();
        assert_eq!(owned.mark_partial(1, 3), Some(false));
        assert_eq!(owned.mark_partial(1, 3), Some(true));
        assert_eq!(owned.mark_partial(1, 4), None);
    }

    #[test]
    fn test_set_owner_hands_over() {
        let owned = OwnedGroups::new();
        owned.ensure_sidno(1);
        owned.add(1, 2, owner(10)).unwrap();
        owned.mark_partial(1, 2).unwrap();
        assert_eq!(owned.set_owner(1, 2, owner(20)), Some(owner(10)));
        let info = owned.get(1, 2).unwrap();
        assert_eq!(info.owner, owner(20));
        // Handover does not reset the partial flag
        assert!(info.is_partial);
    }

    #[test]
    fn test_max_gno() {
        let owned = OwnedGroups::new();
        owned.ensure_sidno(1);
        assert_eq!(owned.max_gno(1), 0);
        owned.add(1, 7, owner(10)).unwrap();
        owned.add(1, 3, owner(11)).unwrap();
        assert_eq!(owned.max_gno(1), 7);
        assert_eq!(owned.max_gno(9), 0);
    }
}
