//! Source identifier (SID)
//!
//! A SID is the 128-bit UUID of a transaction source. Its textual form is
//! exactly 36 ASCII characters: 32 hex digits with dashes at positions
//! 8, 13, 18 and 23. Parsing accepts upper- or lower-case hex; formatting
//! always emits lower-case.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of the binary form in bytes.
pub const BYTE_LENGTH: usize = 16;

/// Length of the textual form in characters.
pub const TEXT_LENGTH: usize = 36;

/// 128-bit globally unique identifier of a transaction source.
///
/// Immutable once parsed. Ordering and hashing follow the raw byte order,
/// which is what the sid-sorted index in `SidMap` relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sid(Uuid);

impl Sid {
    /// Build a SID from its 16 raw bytes.
    pub fn from_bytes(bytes: [u8; BYTE_LENGTH]) -> Self {
        Sid(Uuid::from_bytes(bytes))
    }

    /// The 16 raw bytes of this SID.
    pub fn as_bytes(&self) -> &[u8; BYTE_LENGTH] {
        self.0.as_bytes()
    }
}

impl FromStr for Sid {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Error> {
        let bytes = text.as_bytes();
        if bytes.len() != TEXT_LENGTH {
            return Err(Error::InvalidText(format!(
                "invalid UUID {text:?}: expected {TEXT_LENGTH} characters"
            )));
        }
        for (i, &b) in bytes.iter().enumerate() {
            let ok = match i {
                8 | 13 | 18 | 23 => b == b'-',
                _ => b.is_ascii_hexdigit(),
            };
            if !ok {
                return Err(Error::InvalidText(format!(
                    "invalid UUID {text:?}: unexpected character at position {i}"
                )));
            }
        }
        // Shape is validated above, so this parse cannot fail.
        let uuid = Uuid::try_parse(text)
            .map_err(|e| Error::InvalidText(format!("invalid UUID {text:?}: {e}")))?;
        Ok(Sid(uuid))
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}
