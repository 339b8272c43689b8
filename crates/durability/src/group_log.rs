//! Sequential writer and filtering reader over the subgroup log.
//!
//! A [`GroupLog`] owns the [`RotFile`] and the writer-side
//! [`SubgroupCoder`]. Opening an existing log replays it once to resume
//! the lgid sequence and, when the last record is torn (crash during
//! append), truncates the tail back to the last complete record.
//!
//! [`GroupLogReader`] is an independent cursor over the same file. Its
//! [`seek`](GroupLogReader::seek) skips forward to the first record
//! matching a [`ReplayFilter`], which is how a restarting server
//! replays only the part of history relevant to a requested starting
//! position.

use std::path::Path;

use grouplog_core::{Group, Lgid, Result};
use grouplog_storage::GroupSet;
use tracing::{info, warn};

use crate::io::{AppendError, Appender, ReadOutcome, Reader};
use crate::rot_file::{RotFile, RotFileReader};
use crate::subgroup::{Subgroup, SubgroupCoder, SubgroupType};

/// Append-only log of subgroup records.
#[derive(Debug)]
pub struct GroupLog {
    file: RotFile,
    coder: SubgroupCoder,
}

impl GroupLog {
    /// Open or create the log at `path`.
    ///
    /// Existing records are scanned so the writer continues the lgid
    /// sequence where it left off. A torn or unparseable tail is
    /// assumed to be an interrupted append and truncated away.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = RotFile::open(path)?;
        let mut coder = SubgroupCoder::new();

        let mut reader = file.reader()?;
        let mut scan = SubgroupCoder::new();
        let mut good = 0u64;
        loop {
            match scan.decode(&mut reader) {
                Ok(ReadOutcome::Record(_)) => good = reader.tell(),
                Ok(ReadOutcome::Eof) => break,
                Ok(ReadOutcome::Truncated) => {
                    warn!(
                        path = %file.path().display(),
                        offset = good,
                        "truncating torn record at log tail"
                    );
                    file.truncate(good)?;
                    file.sync()?;
                    break;
                }
                Err(e @ grouplog_core::Error::Corruption(_)) => {
                    // Bad bytes at the tail read the same as a torn
                    // record: assume an interrupted write and cut it off.
                    warn!(
                        path = %file.path().display(),
                        offset = good,
                        error = %e,
                        "truncating unparseable log tail"
                    );
                    file.truncate(good)?;
                    file.sync()?;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        coder.set_next_lgid(scan.next_lgid());
        info!(
            path = %file.path().display(),
            records = scan.next_lgid() - 1,
            "opened group log"
        );
        Ok(Self { file, coder })
    }

    /// Append one subgroup record, returning its lgid.
    ///
    /// `RolledBack` means the log is unchanged and the write may be
    /// retried; `Broken` means the file must be closed.
    pub fn write_subgroup(
        &mut self,
        subgroup: &Subgroup,
    ) -> std::result::Result<Lgid, AppendError> {
        self.coder.encode(subgroup, &mut self.file)
    }

    /// The lgid the next written record will receive.
    pub fn next_lgid(&self) -> Lgid {
        self.coder.next_lgid()
    }

    /// Flush appended records to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()
    }

    /// Advisory segment size for future rotation.
    pub fn set_rotation_limit(&mut self, limit: Option<u64>) {
        self.file.set_rotation_limit(limit);
    }

    /// A new independent reader positioned before the first record.
    pub fn reader(&self) -> Result<GroupLogReader> {
        Ok(GroupLogReader {
            reader: self.file.reader()?,
            coder: SubgroupCoder::new(),
            peeked: None,
        })
    }
}

/// Predicates a [`GroupLogReader::seek`] target must satisfy, all at
/// once.
///
/// The default filter matches every record.
#[derive(Debug, Clone, Copy)]
pub struct ReplayFilter<'a> {
    /// Restrict to groups inside this set (or outside, with `exclude`).
    pub groups: Option<&'a GroupSet>,
    /// Invert the `groups` membership test.
    pub exclude: bool,
    /// Whether anonymous subgroups match at all.
    pub include_anonymous: bool,
    /// Skip records with a smaller lgid.
    pub first_lgid: Option<Lgid>,
    /// Stop at records with a larger lgid.
    pub last_lgid: Option<Lgid>,
    /// Skip records before this binary log file number.
    pub binlog_no: i64,
    /// Skip records before this position within `binlog_no`.
    pub binlog_pos: i64,
}

impl Default for ReplayFilter<'_> {
    fn default() -> Self {
        Self {
            groups: None,
            exclude: false,
            include_anonymous: true,
            first_lgid: None,
            last_lgid: None,
            binlog_no: 0,
            binlog_pos: 0,
        }
    }
}

impl ReplayFilter<'_> {
    fn matches(&self, subgroup: &Subgroup) -> bool {
        if let Some(first) = self.first_lgid {
            if subgroup.lgid < first {
                return false;
            }
        }
        if let Some(last) = self.last_lgid {
            if subgroup.lgid > last {
                return false;
            }
        }
        let past_position = subgroup.binlog_no > self.binlog_no
            || (subgroup.binlog_no == self.binlog_no && subgroup.binlog_pos >= self.binlog_pos);
        if !past_position {
            return false;
        }
        if subgroup.subgroup_type == SubgroupType::Anonymous {
            return self.include_anonymous;
        }
        match self.groups {
            Some(set) => {
                let in_set = set.contains_group(Group::new(subgroup.sidno, subgroup.gno));
                in_set != self.exclude
            }
            None => true,
        }
    }
}

/// Cursor over a [`GroupLog`] with peek and filtered seek.
#[derive(Debug)]
pub struct GroupLogReader {
    reader: RotFileReader,
    coder: SubgroupCoder,
    peeked: Option<Subgroup>,
}

impl GroupLogReader {
    /// Read and consume the next subgroup record.
    pub fn read_subgroup(&mut self) -> Result<ReadOutcome<Subgroup>> {
        if let Some(subgroup) = self.peeked.take() {
            return Ok(ReadOutcome::Record(subgroup));
        }
        self.coder.decode(&mut self.reader)
    }

    /// Read the next subgroup record without consuming it.
    pub fn peek_subgroup(&mut self) -> Result<ReadOutcome<Subgroup>> {
        if let Some(subgroup) = self.peeked {
            return Ok(ReadOutcome::Record(subgroup));
        }
        match self.coder.decode(&mut self.reader)? {
            ReadOutcome::Record(subgroup) => {
                self.peeked = Some(subgroup);
                Ok(ReadOutcome::Record(subgroup))
            }
            ReadOutcome::Eof => Ok(ReadOutcome::Eof),
            ReadOutcome::Truncated => Ok(ReadOutcome::Truncated),
        }
    }

    /// Skip forward to the first record matching `filter`.
    ///
    /// The matching record is left unconsumed, so the next
    /// [`read_subgroup`](Self::read_subgroup) returns it. `Eof` means no
    /// remaining record can match (end of log, or past `last_lgid`).
    pub fn seek(&mut self, filter: &ReplayFilter<'_>) -> Result<ReadOutcome<()>> {
        loop {
            let subgroup = match self.peek_subgroup()? {
                ReadOutcome::Record(subgroup) => subgroup,
                ReadOutcome::Eof => return Ok(ReadOutcome::Eof),
                ReadOutcome::Truncated => return Ok(ReadOutcome::Truncated),
            };
            if let Some(last) = filter.last_lgid {
                if subgroup.lgid > last {
                    return Ok(ReadOutcome::Eof);
                }
            }
            if filter.matches(&subgroup) {
                return Ok(ReadOutcome::Record(()));
            }
            self.peeked = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn subgroup(sidno: i32, gno: i64, binlog_no: i64, binlog_pos: i64) -> Subgroup {
        Subgroup {
            subgroup_type: SubgroupType::Normal,
            sidno,
            gno,
            binlog_no,
            binlog_pos,
            binlog_length: 100,
            binlog_offset_after_last_statement: binlog_pos + 100,
            owner_type: 0,
            group_end: true,
            group_commit: true,
            lgid: 0,
        }
    }

    #[test]
    fn test_lgid_sequence_continues_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("group.log");
        {
            let mut log = GroupLog::open(&path).unwrap();
            assert_eq!(log.write_subgroup(&subgroup(1, 1, 0, 4)).unwrap(), 1);
            assert_eq!(log.write_subgroup(&subgroup(1, 2, 0, 200)).unwrap(), 2);
            log.sync().unwrap();
        }
        let mut log = GroupLog::open(&path).unwrap();
        assert_eq!(log.next_lgid(), 3);
        assert_eq!(log.write_subgroup(&subgroup(1, 3, 0, 400)).unwrap(), 3);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let dir = TempDir::new().unwrap();
        let mut log = GroupLog::open(dir.path().join("group.log")).unwrap();
        log.write_subgroup(&subgroup(1, 1, 0, 4)).unwrap();

        let mut reader = log.reader().unwrap();
        let peeked = reader.peek_subgroup().unwrap().record().unwrap();
        let read = reader.read_subgroup().unwrap().record().unwrap();
        assert_eq!(peeked, read);
        assert!(reader.read_subgroup().unwrap().is_eof());
    }

    #[test]
    fn test_seek_by_lgid_range() {
        let dir = TempDir::new().unwrap();
        let mut log = GroupLog::open(dir.path().join("group.log")).unwrap();
        for gno in 1..=5 {
            log.write_subgroup(&subgroup(1, gno, 0, gno * 100)).unwrap();
        }

        let mut reader = log.reader().unwrap();
        let filter = ReplayFilter {
            first_lgid: Some(3),
            last_lgid: Some(4),
            ..ReplayFilter::default()
        };
        assert_eq!(reader.seek(&filter).unwrap(), ReadOutcome::Record(()));
        assert_eq!(reader.read_subgroup().unwrap().record().unwrap().lgid, 3);
        assert_eq!(reader.seek(&filter).unwrap(), ReadOutcome::Record(()));
        assert_eq!(reader.read_subgroup().unwrap().record().unwrap().lgid, 4);
        assert!(reader.seek(&filter).unwrap().is_eof());
    }

    #[test]
    fn test_seek_by_binlog_position() {
        let dir = TempDir::new().unwrap();
        let mut log = GroupLog::open(dir.path().join("group.log")).unwrap();
        log.write_subgroup(&subgroup(1, 1, 0, 400)).unwrap();
        log.write_subgroup(&subgroup(1, 2, 1, 4)).unwrap();
        log.write_subgroup(&subgroup(1, 3, 1, 900)).unwrap();

        let mut reader = log.reader().unwrap();
        let filter = ReplayFilter {
            binlog_no: 1,
            binlog_pos: 500,
            ..ReplayFilter::default()
        };
        assert_eq!(reader.seek(&filter).unwrap(), ReadOutcome::Record(()));
        assert_eq!(reader.read_subgroup().unwrap().record().unwrap().gno, 3);
    }

    #[test]
    fn test_seek_excluding_group_set() {
        use grouplog_storage::SidMap;
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let mut log = GroupLog::open(dir.path().join("group.log")).unwrap();
        for gno in 1..=4 {
            log.write_subgroup(&subgroup(1, gno, 0, gno * 100)).unwrap();
        }

        let sid_map = Arc::new(SidMap::new());
        sid_map
            .add_permanent(&"3E11FA47-71CA-11E1-9E33-C80AA9429562".parse().unwrap())
            .unwrap();
        let mut applied = GroupSet::new(Arc::clone(&sid_map));
        applied.ensure_sidno(1);
        applied.add_gno_interval(1, 1, 3); // gnos 1 and 2 already applied

        let mut reader = log.reader().unwrap();
        let filter = ReplayFilter {
            groups: Some(&applied),
            exclude: true,
            ..ReplayFilter::default()
        };
        assert_eq!(reader.seek(&filter).unwrap(), ReadOutcome::Record(()));
        assert_eq!(reader.read_subgroup().unwrap().record().unwrap().gno, 3);
    }

    #[test]
    fn test_torn_tail_is_truncated_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("group.log");
        {
            let mut log = GroupLog::open(&path).unwrap();
            log.write_subgroup(&subgroup(1, 1, 0, 4)).unwrap();
            log.write_subgroup(&subgroup(1, 2, 0, 200)).unwrap();
            log.sync().unwrap();
        }
        // Tear the last record in half.
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 20).unwrap();
        drop(file);

        let mut log = GroupLog::open(&path).unwrap();
        assert_eq!(log.next_lgid(), 2);
        let mut reader = log.reader().unwrap();
        assert_eq!(reader.read_subgroup().unwrap().record().unwrap().gno, 1);
        assert!(reader.read_subgroup().unwrap().is_eof());
        // New appends continue after the surviving record.
        assert_eq!(log.write_subgroup(&subgroup(1, 2, 0, 200)).unwrap(), 2);
    }
}
