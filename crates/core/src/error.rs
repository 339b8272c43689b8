//! Error types for the grouplog subsystem
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Two conventions matter here:
//!
//! - End-of-file and truncated-record conditions on the read path are *not*
//!   errors; they are ordinary outcomes modeled by the durability crate's
//!   read types. An `Error` on the read path always means the operation
//!   itself failed.
//! - Every variant except [`Error::Unreported`] carries its own diagnostic.
//!   `Unreported` marks a failure whose diagnostic was already emitted at a
//!   lower level, so callers inside tight locking sections can propagate it
//!   without producing a second message.

use crate::types::{Gno, Sidno};
use std::io;
use thiserror::Error;

/// Result type alias for grouplog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the grouplog subsystem
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted file violates its format
    #[error("corrupted file: {0}")]
    Corruption(String),

    /// Malformed textual input (UUID, group set, or group specification)
    #[error("malformed text: {0}")]
    InvalidText(String),

    /// A decoded value exceeds the caller-supplied maximum
    #[error("value {value} out of range (maximum {max})")]
    OutOfRange {
        /// The decoded value
        value: u64,
        /// The maximum the caller allows
        max: u64,
    },

    /// A SIDNO outside the range the map has assigned
    #[error("unknown sidno {0}")]
    UnknownSidno(Sidno),

    /// The group is already owned by another session
    #[error("group {sidno}:{gno} is already owned")]
    OwnershipConflict {
        /// SIDNO of the contested group
        sidno: Sidno,
        /// GNO of the contested group
        gno: Gno,
    },

    /// The group is not currently owned by any session
    #[error("group {sidno}:{gno} is not owned")]
    NotOwned {
        /// SIDNO of the group
        sidno: Sidno,
        /// GNO of the group
        gno: Gno,
    },

    /// The group has already been ended (durably logged and released)
    #[error("group {sidno}:{gno} has already been ended")]
    GroupEnded {
        /// SIDNO of the group
        sidno: Sidno,
        /// GNO of the group
        gno: Gno,
    },

    /// A declared but not-yet-implemented operation was invoked
    #[error("{0} is not implemented")]
    Unsupported(&'static str),

    /// A blocking wait was interrupted by the caller's kill flag
    #[error("wait interrupted")]
    Interrupted,

    /// Failure whose diagnostic was already emitted at a lower level
    #[error("operation failed (diagnostic already reported)")]
    Unreported,
}

impl Error {
    /// Whether this error carries its own diagnostic.
    ///
    /// `false` only for [`Error::Unreported`]: the failure was already
    /// diagnosed where it happened and must not be reported twice.
    pub fn is_reported(&self) -> bool {
        !matches!(self, Error::Unreported)
    }
}
