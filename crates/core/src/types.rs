//! Identifier and ownership types
//!
//! A transaction is identified by a [`Group`]: a `(SIDNO, GNO)` pair.
//! The SIDNO is a dense positive integer standing in for a source UUID
//! (see [`crate::sid::Sid`] and the storage crate's `SidMap`); the GNO is
//! a positive sequence number unique within its SIDNO.

/// Dense positive integer standing in for a source UUID.
///
/// Assigned by `SidMap::add_permanent`, starting at 1, permanent for the
/// life of the map. `0` is never a valid SIDNO.
pub type Sidno = i32;

/// Sequence number of a transaction within its SIDNO.
///
/// Always positive; `0` is never a valid GNO.
pub type Gno = i64;

/// Monotonically increasing sequence number of records in the group log.
///
/// Assigned by the subgroup coder while encoding or decoding, starting
/// at 1. Not stored in the records themselves.
pub type Lgid = i64;

/// Identity of one transaction: a `(SIDNO, GNO)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Group {
    /// SIDNO of the transaction's source
    pub sidno: Sidno,
    /// Sequence number within the SIDNO
    pub gno: Gno,
}

impl Group {
    /// Create a group from its components.
    pub fn new(sidno: Sidno, gno: Gno) -> Self {
        Group { sidno, gno }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.sidno, self.gno)
    }
}

/// Opaque owner identity supplied by the session layer.
///
/// The subsystem never interprets these fields; it only stores them while
/// a group is owned and persists `owner_type` in subgroup records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    /// Kind of owner (session class), persisted in subgroup records
    pub owner_type: u32,
    /// Numeric identity of the owning session thread
    pub thread_id: u64,
}

impl Owner {
    /// Create an owner identity from its components.
    pub fn new(owner_type: u32, thread_id: u64) -> Self {
        Owner {
            owner_type,
            thread_id,
        }
    }
}

/// Lifecycle state of a group with respect to the log.
///
/// A group is in exactly one of these states at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    /// Durably logged and released
    Ended,
    /// In flight: a session holds ownership
    Owned,
    /// Never seen
    Unlogged,
}
