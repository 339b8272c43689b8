//! Crash-safe transaction identity tracking for replicated servers.
//!
//! Every transaction a server replicates is identified by a group: a
//! `(SIDNO, GNO)` pair, where the SIDNO is a dense integer standing in
//! for the originating server's UUID and the GNO is a sequence number
//! within it. This crate tracks which groups a server has applied
//! ([`GroupSet`]), which are in flight ([`GroupLogState`]), and keeps
//! both durable across crashes ([`SidMap`], [`GroupLog`], [`AtomFile`]).
//!
//! The implementation is split into layered crates, re-exported here:
//!
//! - `grouplog-core`: identifiers, the compact integer codec, errors
//! - `grouplog-concurrency`: per-SIDNO locks and checkable rwlocks
//! - `grouplog-storage`: the SID map and the interval-compressed set
//! - `grouplog-durability`: crash-safe files and the subgroup log
//! - `grouplog-engine`: ownership and lifecycle coordination
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use grouplog::{GroupLog, GroupLogState, Owner, SidMap, Subgroup, SubgroupType};
//!
//! # fn main() -> grouplog::Result<()> {
//! let sid_map = Arc::new(SidMap::open("sids", true)?);
//! let sidno = sid_map.add_permanent(&"3E11FA47-71CA-11E1-9E33-C80AA9429562".parse()?)?;
//!
//! let state = GroupLogState::new(Arc::clone(&sid_map));
//! state.ensure_sidno(sidno);
//! let gno = state.with_sidno_locked(sidno, |_| {
//!     state.acquire_automatic(sidno, Owner::new(1, 42))
//! })?;
//!
//! let mut log = GroupLog::open("group.log")?;
//! log.write_subgroup(&Subgroup {
//!     subgroup_type: SubgroupType::Normal,
//!     sidno,
//!     gno,
//!     binlog_no: 0,
//!     binlog_pos: 4,
//!     binlog_length: 100,
//!     binlog_offset_after_last_statement: 104,
//!     owner_type: 1,
//!     group_end: true,
//!     group_commit: true,
//!     lgid: 0,
//! })?;
//! log.sync()?;
//! state.end_group(sidno, gno)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use grouplog_core::{
    compact, Error, Gno, Group, GroupSpec, GroupStatus, Lgid, Owner, Result, Sid, Sidno,
};

pub use grouplog_concurrency::{CheckableRwLock, MutexCondArray};

pub use grouplog_storage::{GroupSet, Interval, SidMap};

pub use grouplog_durability::{
    AppendError, AtomFile, GroupLog, GroupLogReader, ReadOutcome, ReplayFilter, RotFile, Subgroup,
    SubgroupCoder, SubgroupType,
};

pub use grouplog_engine::{GroupLogState, OwnedGroups};
