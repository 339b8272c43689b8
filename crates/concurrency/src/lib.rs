//! Concurrency primitives for grouplog
//!
//! This crate implements the two locking building blocks the subsystem
//! is built on:
//!
//! - [`CheckableRwLock`]: a reader/writer lock whose guards maintain a
//!   debug-only holder counter, so code paths can assert the lock state
//!   they require without paying anything in release builds
//! - [`MutexCondArray`]: one mutex + condition variable per SIDNO, so
//!   transactions on unrelated replication sources never contend
//!
//! All waiting is blocking; there is no async scheduling in this
//! subsystem. Cancellation is layered by callers polling a kill flag
//! between wait attempts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkable;
pub mod cond_array;

pub use checkable::{CheckableRwLock, CheckedReadGuard, CheckedWriteGuard};
pub use cond_array::{MutexCondArray, SidnoLock};
