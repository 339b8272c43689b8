//! Ownership tracking and state coordination for transaction groups.
//!
//! A group moves through three mutually exclusive states: unlogged
//! (never seen), owned (a session is working on it), and ended (its
//! work is durably logged and ownership released). [`OwnedGroups`]
//! tracks the in-flight middle state; [`GroupLogState`] aggregates it
//! with the ended set and the per-SIDNO locks, and enforces that a
//! group is never visible in two states at once.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod owned;
pub mod state;

pub use owned::{OwnedGroups, OwnedInfo};
pub use state::GroupLogState;
