//! Identifier map and interval-set structures for grouplog
//!
//! This crate holds the two SIDNO-indexed in-memory structures:
//!
//! - [`SidMap`]: append-only, disk-backed bidirectional map from source
//!   UUID to the dense SIDNO integer used everywhere else
//! - [`GroupSet`]: per-SIDNO sorted list of half-open GNO intervals
//!   representing "all transaction numbers seen for this source", with
//!   set algebra and a textual encoding
//!
//! Neither structure does its own per-SIDNO locking; that granularity
//! lives in the engine crate. `SidMap` is internally thread-safe,
//! `GroupSet` is plain data its container must protect.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gset;
pub mod sid_map;

pub use gset::{GroupSet, Interval};
pub use sid_map::SidMap;
