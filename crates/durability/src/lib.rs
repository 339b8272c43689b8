//! Crash-safe log files for the transaction group subsystem.
//!
//! This crate provides the on-disk layer: low-level positioned reader
//! and appender abstractions ([`io`]), atomic whole-file overwrite with
//! crash recovery ([`atom_file`]), the rotatable append-only log file
//! ([`rot_file`]), and the subgroup record codec plus the group log
//! built on top of it ([`subgroup`], [`group_log`]).
//!
//! All multi-byte integers on disk are little-endian. Variable-length
//! integers use the compact encoding from `grouplog_core::compact`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atom_file;
pub mod group_log;
pub mod io;
pub mod rot_file;
pub mod subgroup;

pub use atom_file::AtomFile;
pub use group_log::{GroupLog, GroupLogReader, ReplayFilter};
pub use io::{AppendError, Appender, ReadOutcome, Reader};
pub use rot_file::{RotFile, RotFileReader};
pub use subgroup::{Subgroup, SubgroupCoder, SubgroupType};
