//! Bidirectional SID ⇄ SIDNO map with append-only disk persistence
//!
//! # File Format
//!
//! The map file is a sequence of `<type-code:1><payload>` records:
//!
//! - type `0x00`: 16 raw UUID bytes, no length prefix. One SID
//!   assignment; SIDNOs are implied by record order, starting at 1
//! - odd type codes: `<compact-length><skip bytes>`. Extension records,
//!   skipped on replay and preserved verbatim in the file
//! - even unknown type codes: invalid
//!
//! Replay is optimistic about crashes: a truncated record or an invalid
//! type code at the tail is assumed to be an interrupted write, and the
//! file is truncated back to the last good record boundary.
//!
//! # Locking
//!
//! Lookups take the shared lock. `add_permanent` uses the
//! check-release-recheck pattern: look up under the read lock, release,
//! take the write lock, look up again (a concurrent caller may have won
//! the race), and only then append to disk and assign the next SIDNO.
//! There is a short window between the two acquisitions with no lock
//! held at all.

use grouplog_concurrency::CheckableRwLock;
use grouplog_core::compact::{self, CompactError};
use grouplog_core::{Error, Result, Sid, Sidno};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Type code of a SID assignment record.
pub const SID_RECORD_TYPE: u8 = 0x00;

/// Largest skip length accepted in an extension record.
const MAX_SKIP_LENGTH: u64 = 1 << 30;

#[derive(Default)]
struct Inner {
    /// SIDNO - 1 → SID
    sidno_to_sid: Vec<Sid>,
    /// SID → SIDNO
    sid_to_sidno: HashMap<Sid, Sidno>,
    /// SIDNOs ordered by their SID's byte order, maintained by binary insertion
    sorted: Vec<Sidno>,
}

impl Inner {
    fn insert(&mut self, sid: Sid) -> Sidno {
        let sidno = self.sidno_to_sid.len() as Sidno + 1;
        self.sidno_to_sid.push(sid);
        self.sid_to_sidno.insert(sid, sidno);
        let pos = {
            let sidno_to_sid = &self.sidno_to_sid;
            self.sorted
                .partition_point(|&s| sidno_to_sid[s as usize - 1] < sid)
        };
        self.sorted.insert(pos, sidno);
        sidno
    }
}

/// Append-only, disk-backed bidirectional map from [`Sid`] to SIDNO.
///
/// SIDNO assignments are permanent for the life of the map. The map may
/// also run purely in memory (see [`SidMap::new`]) for embedding and
/// tests.
pub struct SidMap {
    inner: CheckableRwLock<Inner>,
    /// Append handle; file writes happen only under the write lock, the
    /// `Mutex` additionally serializes explicit `sync()` calls.
    file: Mutex<Option<File>>,
    path: Option<PathBuf>,
    sync_on_add: bool,
}

impl SidMap {
    /// Create an in-memory map with no backing file.
    pub fn new() -> Self {
        SidMap {
            inner: CheckableRwLock::new(Inner::default()),
            file: Mutex::new(None),
            path: None,
            sync_on_add: false,
        }
    }

    /// Open (or create) a disk-backed map, replaying the file.
    ///
    /// `sync_on_add` controls whether every new assignment is fsynced
    /// before its SIDNO is returned.
    pub fn open<P: AsRef<Path>>(path: P, sync_on_add: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let mut inner = Inner::default();
        let good = Self::replay(&path, &data, &mut inner)?;
        if (good as u64) < data.len() as u64 {
            warn!(
                path = %path.display(),
                good_bytes = good,
                file_bytes = data.len(),
                "truncating sid map file at last good record boundary"
            );
            file.set_len(good as u64)?;
        }
        file.seek(SeekFrom::End(0))?;
        debug!(path = %path.display(), sids = inner.sidno_to_sid.len(), "opened sid map");

        Ok(SidMap {
            inner: CheckableRwLock::new(inner),
            file: Mutex::new(Some(file)),
            path: Some(path),
            sync_on_add,
        })
    }

    /// Replay `data`, filling `inner`. Returns the offset of the last
    /// good record boundary.
    fn replay(path: &Path, data: &[u8], inner: &mut Inner) -> Result<usize> {
        let mut offset = 0usize;
        let mut good = 0usize;
        while offset < data.len() {
            let code = data[offset];
            if code == SID_RECORD_TYPE {
                if offset + 1 + grouplog_core::sid::BYTE_LENGTH > data.len() {
                    break; // torn record at the tail
                }
                let mut bytes = [0u8; grouplog_core::sid::BYTE_LENGTH];
                bytes.copy_from_slice(&data[offset + 1..offset + 17]);
                let sid = Sid::from_bytes(bytes);
                if inner.sid_to_sidno.contains_key(&sid) {
                    // A duplicate cannot come from a torn tail write;
                    // the file content itself is wrong.
                    return Err(Error::Corruption(format!(
                        "duplicate SID {sid} in {}",
                        path.display()
                    )));
                }
                inner.insert(sid);
                offset += 17;
                good = offset;
            } else if compact::type_code_is_skippable(code) {
                match compact::decode_bytes(&data[offset + 1..], MAX_SKIP_LENGTH) {
                    Ok((_, consumed)) => {
                        offset += 1 + consumed;
                        good = offset;
                    }
                    Err(CompactError::Truncated) => break, // torn extension record
                    Err(_) => break, // bad length marker: assume torn write
                }
            } else {
                // Unknown even type code: assume an interrupted write and
                // truncate here rather than guessing at record boundaries.
                break;
            }
        }
        Ok(good)
    }

    /// Look up or permanently assign the SIDNO for `sid`.
    ///
    /// Idempotent: adding a SID twice returns the same SIDNO. On a miss
    /// the record is appended to the backing file (and fsynced when the
    /// map was opened with `sync_on_add`) before the SIDNO becomes
    /// visible to other threads.
    pub fn add_permanent(&self, sid: &Sid) -> Result<Sidno> {
        {
            let inner = self.inner.read();
            if let Some(&sidno) = inner.sid_to_sidno.get(sid) {
                return Ok(sidno);
            }
        }
        // No lock held here; a concurrent caller may assign this SID first.
        let mut inner = self.inner.write();
        if let Some(&sidno) = inner.sid_to_sidno.get(sid) {
            return Ok(sidno);
        }
        if let Some(file) = self.file.lock().as_mut() {
            let mut record = [0u8; 17];
            record[0] = SID_RECORD_TYPE;
            record[1..].copy_from_slice(sid.as_bytes());
            // A failed partial write leaves a torn tail that the next
            // open truncates away.
            file.write_all(&record)?;
            if self.sync_on_add {
                file.sync_data()?;
            }
        }
        Ok(inner.insert(*sid))
    }

    /// SIDNO assigned to `sid`, if any.
    pub fn sid_to_sidno(&self, sid: &Sid) -> Option<Sidno> {
        self.inner.read().sid_to_sidno.get(sid).copied()
    }

    /// SID behind an assigned SIDNO.
    pub fn sidno_to_sid(&self, sidno: Sidno) -> Result<Sid> {
        let inner = self.inner.read();
        if sidno <= 0 || sidno as usize > inner.sidno_to_sid.len() {
            return Err(Error::UnknownSidno(sidno));
        }
        Ok(inner.sidno_to_sid[sidno as usize - 1])
    }

    /// Highest assigned SIDNO (0 when the map is empty).
    pub fn max_sidno(&self) -> Sidno {
        self.inner.read().sidno_to_sid.len() as Sidno
    }

    /// All assigned SIDNOs, ordered by their SID's byte order.
    pub fn sidnos_in_sid_order(&self) -> Vec<Sidno> {
        self.inner.read().sorted.clone()
    }

    /// Force the backing file to disk.
    pub fn sync(&self) -> Result<()> {
        if let Some(file) = self.file.lock().as_mut() {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Path of the backing file, when disk-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Default for SidMap {
    fn default() -> Self {
        SidMap::new()
    }
}
