//! Binary record format for one logged unit of replicated work.
//!
//! Every log record starts with a two-byte tag `{0xFF, subtype}`. The
//! only subtype currently written is `FULL_SUBGROUP`, a fixed-width
//! record. Three further even subtypes are reserved for multi-segment
//! rotation and owner handover; their wire format is not defined yet
//! and reading one fails with [`Error::Unsupported`]. Odd subtypes are
//! skippable extension records carrying a compact length prefix, so
//! readers built before a new record kind can step over it.
//!
//! # Binary Format
//!
//! `FULL_SUBGROUP`, 51 bytes after the tag, integers little-endian:
//!
//! ```text
//! +------+-------+-----+-----------+------------+---------------+
//! | type | sidno | gno | binlog_no | binlog_pos | binlog_length |
//! | 1    | 4     | 8   | 8         | 8          | 8             |
//! +------+-------+-----+-----------+------------+---------------+
//! +----------------------+------------+-----------+--------------+
//! | offset_after_last_st | owner_type | group_end | group_commit |
//! | 8                    | 4          | 1         | 1            |
//! +----------------------+------------+-----------+--------------+
//! ```
//!
//! The log sequence number (`lgid`) is not stored: both the writer and
//! the reader count records from 1, so the lgid of a record is its
//! ordinal position in the log.

use grouplog_core::{Error, Gno, Lgid, Result, Sidno};

use crate::io::{
    read_compact_unsigned, skip_bytes, AppendError, Appender, ReadOutcome, Reader,
};

/// First byte of every record tag.
pub const RECORD_TAG: u8 = 0xFF;

/// Subtype of a full subgroup record.
pub const TYPE_FULL_SUBGROUP: u8 = 0x00;
/// Reserved for segment rotation markers.
pub const TYPE_BINLOG_ROTATE: u8 = 0x02;
/// Reserved for binary-log gap markers.
pub const TYPE_BINLOG_GAP: u8 = 0x04;
/// Reserved for owner handover markers.
pub const TYPE_FLIP_OWNER: u8 = 0x06;

/// Fixed payload size of a full subgroup record, after the tag.
pub const FULL_SUBGROUP_SIZE: usize = 51;

/// Largest accepted payload of a skippable extension record.
const MAX_SKIP_LENGTH: u64 = 1 << 30;

/// Kind of work a subgroup represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubgroupType {
    /// An ordinary group-identified transaction.
    Normal = 0,
    /// Work with no stable group identity.
    Anonymous = 1,
    /// A placeholder that ends a group without carrying work.
    Dummy = 2,
}

impl SubgroupType {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(SubgroupType::Normal),
            1 => Some(SubgroupType::Anonymous),
            2 => Some(SubgroupType::Dummy),
            _ => None,
        }
    }
}

/// One logged unit of work, with its binary-log coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subgroup {
    /// Kind of subgroup.
    pub subgroup_type: SubgroupType,
    /// Source index of the group, 0 for anonymous.
    pub sidno: Sidno,
    /// Transaction number of the group, 0 for anonymous.
    pub gno: Gno,
    /// Binary log file number the work was written to.
    pub binlog_no: i64,
    /// Byte offset of the work within that binary log file.
    pub binlog_pos: i64,
    /// Length in bytes of the work in the binary log.
    pub binlog_length: i64,
    /// Binary log offset just past the group's last statement.
    pub binlog_offset_after_last_statement: i64,
    /// Numeric kind of the owning session, persisted as-is.
    pub owner_type: u32,
    /// Whether this subgroup completes its group.
    pub group_end: bool,
    /// Whether the group commits at this subgroup.
    pub group_commit: bool,
    /// Log sequence number, assigned by the coder, never stored.
    pub lgid: Lgid,
}

/// Encoder/decoder for subgroup records, tracking the lgid sequence.
///
/// A coder counts records from 1. The writer and every reader each hold
/// their own coder over the same log, and arrive at the same lgid for a
/// given record because lgid is position, not content.
#[derive(Debug)]
pub struct SubgroupCoder {
    next_lgid: Lgid,
}

impl Default for SubgroupCoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubgroupCoder {
    /// A coder positioned before the first record.
    pub fn new() -> Self {
        Self { next_lgid: 1 }
    }

    /// The lgid the next encoded or decoded record will receive.
    pub fn next_lgid(&self) -> Lgid {
        self.next_lgid
    }

    /// Start the sequence at `next`, used when resuming an existing log.
    pub fn set_next_lgid(&mut self, next: Lgid) {
        self.next_lgid = next;
    }

    /// Serialize `subgroup` as one record into `out`, returning its lgid.
    ///
    /// The record is written with a single append so the appender's
    /// rollback guarantee covers it whole.
    pub fn encode(
        &mut self,
        subgroup: &Subgroup,
        out: &mut dyn Appender,
    ) -> std::result::Result<Lgid, AppendError> {
        let mut buf = [0u8; 2 + FULL_SUBGROUP_SIZE];
        buf[0] = RECORD_TAG;
        buf[1] = TYPE_FULL_SUBGROUP;
        buf[2] = subgroup.subgroup_type as u8;
        buf[3..7].copy_from_slice(&subgroup.sidno.to_le_bytes());
        buf[7..15].copy_from_slice(&subgroup.gno.to_le_bytes());
        buf[15..23].copy_from_slice(&subgroup.binlog_no.to_le_bytes());
        buf[23..31].copy_from_slice(&subgroup.binlog_pos.to_le_bytes());
        buf[31..39].copy_from_slice(&subgroup.binlog_length.to_le_bytes());
        buf[39..47].copy_from_slice(&subgroup.binlog_offset_after_last_statement.to_le_bytes());
        buf[47..51].copy_from_slice(&subgroup.owner_type.to_le_bytes());
        buf[51] = subgroup.group_end as u8;
        buf[52] = subgroup.group_commit as u8;
        out.append(&buf)?;
        let lgid = self.next_lgid;
        self.next_lgid += 1;
        Ok(lgid)
    }

    /// Read the next subgroup record, skipping extension records.
    ///
    /// On `Truncated` the reader is rewound to the start of the torn
    /// record, including a torn extension record.
    pub fn decode<R: Reader + ?Sized>(&mut self, reader: &mut R) -> Result<ReadOutcome<Subgroup>> {
        loop {
            let start = reader.tell();
            let mut tag = [0u8; 2];
            match reader.read_exact(&mut tag)? {
                ReadOutcome::Record(()) => {}
                ReadOutcome::Eof => return Ok(ReadOutcome::Eof),
                ReadOutcome::Truncated => return Ok(ReadOutcome::Truncated),
            }
            if tag[0] != RECORD_TAG {
                return Err(Error::Corruption(format!(
                    "bad record tag {:#04x} at log offset {start}",
                    tag[0]
                )));
            }
            match tag[1] {
                TYPE_FULL_SUBGROUP => {
                    let mut body = [0u8; FULL_SUBGROUP_SIZE];
                    match reader.read_exact(&mut body)? {
                        ReadOutcome::Record(()) => {}
                        ReadOutcome::Eof | ReadOutcome::Truncated => {
                            reader.seek(start)?;
                            return Ok(ReadOutcome::Truncated);
                        }
                    }
                    let subgroup = self.parse_full(&body, start)?;
                    return Ok(ReadOutcome::Record(subgroup));
                }
                TYPE_BINLOG_ROTATE | TYPE_BINLOG_GAP | TYPE_FLIP_OWNER => {
                    return Err(Error::Unsupported("reserved log record type"));
                }
                subtype if subtype & 1 == 1 => {
                    // Skippable extension record.
                    let length = match read_compact_unsigned(reader, MAX_SKIP_LENGTH)? {
                        ReadOutcome::Record(length) => length,
                        ReadOutcome::Eof | ReadOutcome::Truncated => {
                            reader.seek(start)?;
                            return Ok(ReadOutcome::Truncated);
                        }
                    };
                    match skip_bytes(reader, length, start)? {
                        ReadOutcome::Record(()) => continue,
                        ReadOutcome::Eof | ReadOutcome::Truncated => {
                            return Ok(ReadOutcome::Truncated)
                        }
                    }
                }
                subtype => {
                    return Err(Error::Corruption(format!(
                        "unknown record type {subtype:#04x} at log offset {start}"
                    )));
                }
            }
        }
    }

    fn parse_full(&mut self, body: &[u8; FULL_SUBGROUP_SIZE], offset: u64) -> Result<Subgroup> {
        let corrupt = |what: &str| {
            Error::Corruption(format!("subgroup record at log offset {offset}: {what}"))
        };
        let subgroup_type =
            SubgroupType::from_byte(body[0]).ok_or_else(|| corrupt("invalid subgroup type"))?;
        let sidno = Sidno::from_le_bytes(body[1..5].try_into().unwrap());
        let gno = Gno::from_le_bytes(body[5..13].try_into().unwrap());
        if subgroup_type != SubgroupType::Anonymous && (sidno < 1 || gno < 1) {
            return Err(corrupt("non-positive group identifier"));
        }
        let flag = |byte: u8, what: &str| match byte {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(corrupt(what)),
        };
        let subgroup = Subgroup {
            subgroup_type,
            sidno,
            gno,
            binlog_no: i64::from_le_bytes(body[13..21].try_into().unwrap()),
            binlog_pos: i64::from_le_bytes(body[21..29].try_into().unwrap()),
            binlog_length: i64::from_le_bytes(body[29..37].try_into().unwrap()),
            binlog_offset_after_last_statement: i64::from_le_bytes(body[37..45].try_into().unwrap()),
            owner_type: u32::from_le_bytes(body[45..49].try_into().unwrap()),
            group_end: flag(body[49], "invalid group_end flag")?,
            group_commit: flag(body[50], "invalid group_commit flag")?,
            lgid: self.next_lgid,
        };
        self.next_lgid += 1;
        Ok(subgroup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryAppender, MemoryReader};
    use grouplog_core::compact::encode_bytes;

    fn sample(sidno: Sidno, gno: Gno) -> Subgroup {
        Subgroup {
            subgroup_type: SubgroupType::Normal,
            sidno,
            gno,
            binlog_no: 3,
            binlog_pos: 1000,
            binlog_length: 217,
            binlog_offset_after_last_statement: 1190,
            owner_type: 1,
            group_end: true,
            group_commit: false,
            lgid: 0,
        }
    }

    #[test]
    fn test_encode_decode_sequence() {
        let mut out = MemoryAppender::new();
        let mut coder = SubgroupCoder::new();
        assert_eq!(coder.encode(&sample(1, 1), &mut out).unwrap(), 1);
        assert_eq!(coder.encode(&sample(2, 5), &mut out).unwrap(), 2);

        let mut reader = MemoryReader::new(out.into_inner());
        let mut coder = SubgroupCoder::new();
        let first = coder.decode(&mut reader).unwrap().record().unwrap();
        assert_eq!((first.sidno, first.gno, first.lgid), (1, 1, 1));
        assert_eq!(first.binlog_pos, 1000);
        assert!(first.group_end);
        let second = coder.decode(&mut reader).unwrap().record().unwrap();
        assert_eq!((second.sidno, second.gno, second.lgid), (2, 5, 2));
        assert!(coder.decode(&mut reader).unwrap().is_eof());
    }

    #[test]
    fn test_torn_record_rewinds() {
        let mut out = MemoryAppender::new();
        let mut coder = SubgroupCoder::new();
        coder.encode(&sample(1, 1), &mut out).unwrap();
        let mut bytes = out.into_inner();
        bytes.truncate(bytes.len() - 10);

        let mut reader = MemoryReader::new(bytes);
        let mut coder = SubgroupCoder::new();
        assert_eq!(coder.decode(&mut reader).unwrap(), ReadOutcome::Truncated);
        assert_eq!(reader.tell(), 0);
        // lgid was not consumed by the failed read
        assert_eq!(coder.next_lgid(), 1);
    }

    #[test]
    fn test_skippable_record_is_stepped_over() {
        let mut out = MemoryAppender::new();
        let mut coder = SubgroupCoder::new();
        // Extension record with subtype 0x03 and a 4-byte payload.
        let mut extension = vec![RECORD_TAG, 0x03];
        encode_bytes(&[0xAA; 4], &mut extension);
        out.append(&extension).unwrap();
        coder.encode(&sample(7, 9), &mut out).unwrap();

        let mut reader = MemoryReader::new(out.into_inner());
        let mut coder = SubgroupCoder::new();
        let decoded = coder.decode(&mut reader).unwrap().record().unwrap();
        assert_eq!((decoded.sidno, decoded.gno, decoded.lgid), (7, 9, 1));
    }

    #[test]
    fn test_reserved_types_are_unsupported() {
        for subtype in [TYPE_BINLOG_ROTATE, TYPE_BINLOG_GAP, TYPE_FLIP_OWNER] {
            let mut reader = MemoryReader::new(vec![RECORD_TAG, subtype]);
            assert!(matches!(
                SubgroupCoder::new().decode(&mut reader),
                Err(Error::Unsupported(_))
            ));
        }
    }

    #[test]
    fn test_unknown_even_type_is_corruption() {
        let mut reader = MemoryReader::new(vec![RECORD_TAG, 0x08, 0, 0]);
        assert!(matches!(
            SubgroupCoder::new().decode(&mut reader),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_bad_tag_byte_is_corruption() {
        let mut reader = MemoryReader::new(vec![0x00, 0x00]);
        assert!(matches!(
            SubgroupCoder::new().decode(&mut reader),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_anonymous_allows_zero_identifiers() {
        let mut out = MemoryAppender::new();
        let mut anon = sample(0, 0);
        anon.subgroup_type = SubgroupType::Anonymous;
        SubgroupCoder::new().encode(&anon, &mut out).unwrap();

        let mut reader = MemoryReader::new(out.into_inner());
        let decoded = SubgroupCoder::new()
            .decode(&mut reader)
            .unwrap()
            .record()
            .unwrap();
        assert_eq!(decoded.subgroup_type, SubgroupType::Anonymous);
        assert_eq!(decoded.sidno, 0);
    }
}
