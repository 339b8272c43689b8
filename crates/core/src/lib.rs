//! Core types for the grouplog subsystem
//!
//! This crate defines the vocabulary shared by every other grouplog crate:
//!
//! - Identifier types: [`Sid`], SIDNO, GNO, [`Group`], [`GroupSpec`]
//! - The crate-wide [`Error`] and [`Result`] types
//! - The compact self-describing integer codec used by every on-disk format
//!
//! Nothing in this crate touches disk or takes a lock; it is pure data.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compact;
pub mod error;
pub mod group_spec;
pub mod sid;
pub mod types;

pub use error::{Error, Result};
pub use group_spec::GroupSpec;
pub use sid::Sid;
pub use types::{Gno, Group, GroupStatus, Lgid, Owner, Sidno};
