//! Group specification
//!
//! The per-session "next transaction identity" setting. A specification is
//! one of:
//!
//! - `AUTOMATIC`: the server assigns the GNO when the transaction commits
//! - `ANONYMOUS`: the transaction has no stable identity
//! - `UUID:GNO`: a fixed identity named explicitly by the session
//!
//! Both sentinel tokens are matched case-insensitively on input and
//! rendered upper-case on output.

use crate::error::Error;
use crate::sid::Sid;
use crate::types::Gno;
use std::fmt;
use std::str::FromStr;

/// Requested identity for the next transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSpec {
    /// GNO to be assigned at commit time
    Automatic,
    /// No stable identity
    Anonymous,
    /// Explicitly named identity
    Fixed {
        /// Source UUID
        sid: Sid,
        /// Sequence number within the source, always positive
        gno: Gno,
    },
}

impl FromStr for GroupSpec {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Error> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("AUTOMATIC") {
            return Ok(GroupSpec::Automatic);
        }
        if trimmed.eq_ignore_ascii_case("ANONYMOUS") {
            return Ok(GroupSpec::Anonymous);
        }
        let (sid_text, gno_text) = trimmed.split_once(':').ok_or_else(|| {
            Error::InvalidText(format!("invalid group specification {text:?}: expected UUID:GNO"))
        })?;
        let sid: Sid = sid_text.trim().parse()?;
        let gno: Gno = gno_text.trim().parse().map_err(|_| {
            Error::InvalidText(format!("invalid group specification {text:?}: bad GNO"))
        })?;
        if gno <= 0 {
            return Err(Error::InvalidText(format!(
                "invalid group specification {text:?}: GNO must be positive"
            )));
        }
        Ok(GroupSpec::Fixed { sid, gno })
    }
}

impl fmt::Display for GroupSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupSpec::Automatic => write!(f, "AUTOMATIC"),
            GroupSpec::Anonymous => write!(f, "ANONYMOUS"),
            GroupSpec::Fixed { sid, gno } => write!(f, "{sid}:{gno}"),
        }
    }
}
