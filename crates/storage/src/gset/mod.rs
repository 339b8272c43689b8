//! Interval-compressed set of groups
//!
//! A [`GroupSet`] records, per SIDNO, which GNOs have been seen, as a
//! sorted linked list of half-open `[start, end)` intervals. The list
//! invariant is strict: intervals are sorted, non-empty, and
//! non-adjacent (`end[i] < start[i + 1]`), so adjacent or overlapping
//! spans are merged on insert. That is an invariant, not an
//! optimization: equality and subset tests compare interval lists
//! structurally.
//!
//! Nodes live in a per-set index arena with a free list
//! (see [`arena`]); nothing is individually allocated or freed.
//!
//! `GroupSet` is plain data: it does no locking of its own. Containers
//! that share one across threads protect it with the concurrency
//! crate's primitives and follow the grow-under-write-lock discipline
//! for [`ensure_sidno`](GroupSet::ensure_sidno).

mod arena;
mod text;

use arena::IntervalArena;
use grouplog_core::{Gno, Group, Result, Sid, Sidno};
use std::sync::Arc;

use crate::sid_map::SidMap;

/// One half-open interval of GNOs: `start <= gno < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// First GNO in the interval
    pub start: Gno,
    /// One past the last GNO in the interval
    pub end: Gno,
}

/// Per-SIDNO interval-compressed set of groups.
pub struct GroupSet {
    sid_map: Arc<SidMap>,
    /// SIDNO - 1 → head of that SIDNO's interval list
    heads: Vec<Option<u32>>,
    arena: IntervalArena,
}

impl GroupSet {
    /// Create an empty set whose SIDNOs are interpreted through `sid_map`.
    pub fn new(sid_map: Arc<SidMap>) -> Self {
        GroupSet {
            sid_map,
            heads: Vec::new(),
            arena: IntervalArena::default(),
        }
    }

    /// The map this set's SIDNOs are interpreted through.
    pub fn sid_map(&self) -> &Arc<SidMap> {
        &self.sid_map
    }

    /// Highest SIDNO this set has capacity for (0 when empty).
    pub fn max_sidno(&self) -> Sidno {
        self.heads.len() as Sidno
    }

    /// Grow the SIDNO-indexed backing array to cover `sidno`.
    ///
    /// Capacity grows monotonically and never shrinks.
    pub fn ensure_sidno(&mut self, sidno: Sidno) {
        debug_assert!(sidno > 0);
        if (self.heads.len() as Sidno) < sidno {
            self.heads.resize(sidno as usize, None);
        }
    }

    /// Whether no SIDNO has any interval.
    pub fn is_empty(&self) -> bool {
        self.heads.iter().all(|head| head.is_none())
    }

    /// Iterate `sidno`'s intervals in ascending order.
    ///
    /// A SIDNO beyond the set's capacity yields nothing.
    pub fn intervals(&self, sidno: Sidno) -> IntervalIter<'_> {
        let cur = if sidno >= 1 && (sidno as usize) <= self.heads.len() {
            self.heads[sidno as usize - 1]
        } else {
            None
        };
        IntervalIter { set: self, cur }
    }

    /// Add the half-open interval `[start, end)` to `sidno`.
    ///
    /// Merges with any overlapping or adjacent intervals so the list
    /// invariant holds.
    pub fn add_gno_interval(&mut self, sidno: Sidno, start: Gno, end: Gno) {
        debug_assert!(sidno > 0 && start > 0 && start < end);
        if sidno <= 0 || start <= 0 || start >= end {
            return;
        }
        self.ensure_sidno(sidno);
        let slot = sidno as usize - 1;

        let mut prev: Option<u32> = None;
        let mut cur = self.heads[slot];
        // Skip intervals that end strictly before the new span begins
        // (end == start means adjacent, which merges).
        while let Some(index) = cur {
            let node = *self.arena.node(index);
            if node.end >= start {
                break;
            }
            prev = Some(index);
            cur = node.next;
        }
        // Absorb every interval that overlaps or touches [start, end)
        let mut new_start = start;
        let mut new_end = end;
        while let Some(index) = cur {
            let node = *self.arena.node(index);
            if node.start > new_end {
                break;
            }
            new_start = new_start.min(node.start);
            new_end = new_end.max(node.end);
            cur = node.next;
            self.arena.release(index);
        }
        let merged = self.arena.alloc(new_start, new_end, cur);
        match prev {
            Some(index) => self.arena.node_mut(index).next = Some(merged),
            None => self.heads[slot] = Some(merged),
        }
    }

    /// Remove the half-open interval `[start, end)` from `sidno`.
    ///
    /// Splits, trims or deletes existing intervals as needed; removing
    /// something that is not present is a no-op.
    pub fn remove_gno_interval(&mut self, sidno: Sidno, start: Gno, end: Gno) {
        debug_assert!(start > 0 && start < end);
        if sidno <= 0 || (sidno as usize) > self.heads.len() || start <= 0 || start >= end {
            return;
        }
        let slot = sidno as usize - 1;

        let mut prev: Option<u32> = None;
        let mut cur = self.heads[slot];
        while let Some(index) = cur {
            let node = *self.arena.node(index);
            if node.start >= end {
                break;
            }
            if node.end <= start {
                prev = Some(index);
                cur = node.next;
                continue;
            }
            if node.start < start && node.end > end {
                // Removal is strictly inside: split into two intervals
                let tail = self.arena.alloc(end, node.end, node.next);
                let node = self.arena.node_mut(index);
                node.end = start;
                node.next = Some(tail);
                break;
            } else if node.start < start {
                // Keep the left part
                self.arena.node_mut(index).end = start;
                prev = Some(index);
                cur = node.next;
            } else if node.end > end {
                // Keep the right part
                self.arena.node_mut(index).start = end;
                break;
            } else {
                // Fully covered: unlink and recycle
                match prev {
                    Some(p) => self.arena.node_mut(p).next = node.next,
                    None => self.heads[slot] = node.next,
                }
                self.arena.release(index);
                cur = node.next;
            }
        }
    }

    /// Add a single group.
    pub fn add_group(&mut self, group: Group) {
        self.add_gno_interval(group.sidno, group.gno, group.gno + 1);
    }

    /// Remove a single group.
    pub fn remove_group(&mut self, group: Group) {
        self.remove_gno_interval(group.sidno, group.gno, group.gno + 1);
    }

    /// Whether `group` is in the set.
    pub fn contains_group(&self, group: Group) -> bool {
        for interval in self.intervals(group.sidno) {
            if group.gno < interval.start {
                return false;
            }
            if group.gno < interval.end {
                return true;
            }
        }
        false
    }

    /// One past the highest GNO recorded for `sidno` (1 when none).
    pub fn next_free_gno(&self, sidno: Sidno) -> Gno {
        self.intervals(sidno).last().map_or(1, |ivl| ivl.end)
    }

    /// Union `other` into this set.
    ///
    /// When the two sets use different sid maps, `other`'s SIDNOs are
    /// translated through their SIDs, assigning new SIDNOs in this
    /// set's map as needed.
    pub fn add_set(&mut self, other: &GroupSet) -> Result<()> {
        for sidno in 1..=other.max_sidno() {
            let Some(my_sidno) = self.translate_for_add(other, sidno)? else {
                continue;
            };
            for interval in other.intervals(sidno) {
                self.add_gno_interval(my_sidno, interval.start, interval.end);
            }
        }
        Ok(())
    }

    /// Subtract `other` from this set.
    pub fn remove_set(&mut self, other: &GroupSet) -> Result<()> {
        for sidno in 1..=other.max_sidno() {
            if other.intervals(sidno).next().is_none() {
                continue;
            }
            let my_sidno = if Arc::ptr_eq(&self.sid_map, &other.sid_map) {
                sidno
            } else {
                let sid = other.sid_map.sidno_to_sid(sidno)?;
                match self.sid_map.sid_to_sidno(&sid) {
                    Some(s) => s,
                    None => continue, // nothing of this source here
                }
            };
            for interval in other.intervals(sidno) {
                self.remove_gno_interval(my_sidno, interval.start, interval.end);
            }
        }
        Ok(())
    }

    fn translate_for_add(&mut self, other: &GroupSet, sidno: Sidno) -> Result<Option<Sidno>> {
        if other.intervals(sidno).next().is_none() {
            return Ok(None);
        }
        if Arc::ptr_eq(&self.sid_map, &other.sid_map) {
            return Ok(Some(sidno));
        }
        let sid = other.sid_map.sidno_to_sid(sidno)?;
        Ok(Some(self.sid_map.add_permanent(&sid)?))
    }

    /// Whether every group in this set is also in `sup`.
    pub fn is_subset(&self, sup: &GroupSet) -> bool {
        let same_map = Arc::ptr_eq(&self.sid_map, &sup.sid_map);
        for sidno in 1..=self.max_sidno() {
            let mut mine = self.intervals(sidno).peekable();
            if mine.peek().is_none() {
                continue;
            }
            let sup_sidno = if same_map {
                sidno
            } else {
                let Ok(sid) = self.sid_map.sidno_to_sid(sidno) else {
                    return false;
                };
                match sup.sid_map.sid_to_sidno(&sid) {
                    Some(s) => s,
                    None => return false,
                }
            };
            let mut theirs = sup.intervals(sup_sidno).peekable();
            for a in mine {
                loop {
                    match theirs.peek() {
                        None => return false,
                        Some(b) if b.end < a.end => {
                            theirs.next();
                        }
                        Some(b) => {
                            if b.start > a.start {
                                return false;
                            }
                            break;
                        }
                    }
                }
            }
        }
        true
    }

    fn sid_of(&self, sidno: Sidno) -> Option<Sid> {
        self.sid_map.sidno_to_sid(sidno).ok()
    }
}

impl PartialEq for GroupSet {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.sid_map, &other.sid_map) {
            let max = self.max_sidno().max(other.max_sidno());
            return (1..=max).all(|s| self.intervals(s).eq(other.intervals(s)));
        }
        // Different maps: compare through SIDs, both directions
        for sidno in 1..=self.max_sidno() {
            if self.intervals(sidno).next().is_none() {
                continue;
            }
            let matched = self
                .sid_of(sidno)
                .and_then(|sid| other.sid_map.sid_to_sidno(&sid))
                .is_some_and(|theirs| self.intervals(sidno).eq(other.intervals(theirs)));
            if !matched {
                return false;
            }
        }
        for sidno in 1..=other.max_sidno() {
            if other.intervals(sidno).next().is_none() {
                continue;
            }
            let matched = other
                .sid_of(sidno)
                .and_then(|sid| self.sid_map.sid_to_sidno(&sid))
                .is_some_and(|mine| self.intervals(mine).next().is_some());
            if !matched {
                return false;
            }
        }
        true
    }
}

impl Eq for GroupSet {}

impl std::fmt::Debug for GroupSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for sidno in 1..=self.max_sidno() {
            let intervals: Vec<Interval> = self.intervals(sidno).collect();
            if !intervals.is_empty() {
                map.entry(&sidno, &intervals);
            }
        }
        map.finish()
    }
}

/// Iterator over one SIDNO's intervals, ascending.
pub struct IntervalIter<'a> {
    set: &'a GroupSet,
    cur: Option<u32>,
}

impl Iterator for IntervalIter<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        let index = self.cur?;
        let node = self.set.arena.node(index);
        self.cur = node.next;
        Some(Interval {
            start: node.start,
            end: node.end,
        })
    }
}
