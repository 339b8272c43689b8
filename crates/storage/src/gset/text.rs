//! Textual encoding of group sets
//!
//! # Format
//!
//! ```text
//! UUID[:N[-M]](:N[-M])*(,UUID...)*     or the literal token ANONYMOUS
//! ```
//!
//! Ranges are inclusive in text (`1-5` is GNOs 1 through 5); internally
//! they become half-open intervals. A UUID with no range registers the
//! source without adding any group. The `ANONYMOUS` token is only legal
//! when the caller explicitly permits it.
//!
//! This is both an input format (configuration and specification
//! strings) and an output format (diagnostics, textual persistence).

use super::GroupSet;
use crate::sid_map::SidMap;
use grouplog_core::{Error, Gno, Result, Sid};
use std::sync::Arc;

impl GroupSet {
    /// Render the set, e.g. `uuid:1-5:11,uuid:47`.
    ///
    /// SIDNOs appear in ascending order; the empty set renders as `""`.
    /// Fails only if a SIDNO has no SID in the map, which means the set
    /// and its map got out of sync.
    pub fn to_text(&self) -> Result<String> {
        let mut out = String::new();
        for sidno in 1..=self.max_sidno() {
            let mut intervals = self.intervals(sidno).peekable();
            if intervals.peek().is_none() {
                continue;
            }
            if !out.is_empty() {
                out.push(',');
            }
            out.push_str(&self.sid_map().sidno_to_sid(sidno)?.to_string());
            for interval in intervals {
                out.push(':');
                if interval.end == interval.start + 1 {
                    out.push_str(&interval.start.to_string());
                } else {
                    out.push_str(&format!("{}-{}", interval.start, interval.end - 1));
                }
            }
        }
        Ok(out)
    }

    /// Parse `text` and add its groups to this set.
    ///
    /// New SIDs are permanently assigned in the sid map. When
    /// `anonymous` is `Some`, the `ANONYMOUS` token is accepted and
    /// reported through the flag instead of being an error.
    pub fn add_text(&mut self, text: &str, anonymous: Option<&mut bool>) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        if trimmed.eq_ignore_ascii_case("ANONYMOUS") {
            return match anonymous {
                Some(flag) => {
                    *flag = true;
                    Ok(())
                }
                None => Err(Error::InvalidText(
                    "ANONYMOUS is not permitted here".to_string(),
                )),
            };
        }
        for chunk in trimmed.split(',') {
            let mut parts = chunk.trim().split(':');
            // split always yields at least one element
            let sid: Sid = parts.next().unwrap_or_default().trim().parse()?;
            let sidno = self.sid_map().add_permanent(&sid)?;
            self.ensure_sidno(sidno);
            for range in parts {
                let (start, end) = parse_range(range)?;
                self.add_gno_interval(sidno, start, end);
            }
        }
        Ok(())
    }

    /// Parse `text` into a fresh set over `sid_map`.
    pub fn from_text(sid_map: Arc<SidMap>, text: &str) -> Result<GroupSet> {
        let mut set = GroupSet::new(sid_map);
        set.add_text(text, None)?;
        Ok(set)
    }
}

/// Parse one `N` or `N-M` range into a half-open interval.
fn parse_range(range: &str) -> Result<(Gno, Gno)> {
    let range = range.trim();
    let (start_text, end_text) = match range.split_once('-') {
        Some((a, b)) => (a, b),
        None => (range, range),
    };
    let start: Gno = start_text
        .trim()
        .parse()
        .map_err(|_| Error::InvalidText(format!("bad GNO in range {range:?}")))?;
    let end_incl: Gno = end_text
        .trim()
        .parse()
        .map_err(|_| Error::InvalidText(format!("bad GNO in range {range:?}")))?;
    if start <= 0 {
        return Err(Error::InvalidText(format!(
            "GNO must be positive in range {range:?}"
        )));
    }
    if end_incl < start {
        return Err(Error::InvalidText(format!(
            "non-monotonic range {range:?}"
        )));
    }
    if end_incl == Gno::MAX {
        return Err(Error::InvalidText(format!("GNO overflow in range {range:?}")));
    }
    Ok((start, end_incl + 1))
}
