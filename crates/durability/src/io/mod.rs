//! Positioned reader and appender abstractions.
//!
//! Log files are read through the [`Reader`] trait and written through
//! the [`Appender`] trait. A reader distinguishes three non-error
//! outcomes via [`ReadOutcome`]: a complete record, a clean end of
//! input, or a torn record at the tail. Returning truncation as data
//! rather than as an error keeps "the file ends mid-record" on the
//! normal control path, where callers decide whether to wait, rewind,
//! or truncate.
//!
//! Appenders report failure through [`AppendError`], which tells the
//! caller whether the partial write was rolled back (the file is still
//! usable) or could not be (the file must be closed).

use grouplog_core::compact::{
    self, length_from_first_byte, length_from_second_byte, CompactError, MAX_ENCODED_LENGTH,
};
use grouplog_core::{Error, Result};
use thiserror::Error as ThisError;

mod file;
mod memory;

pub use file::{FileAppender, FileReader};
pub use memory::{MemoryAppender, MemoryReader};

/// Outcome of a read that is not an I/O or corruption error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    /// A complete record was read.
    Record(T),
    /// The input ends exactly at a record boundary.
    Eof,
    /// The input ends in the middle of a record. The reader position has
    /// been restored to the start of the torn record.
    Truncated,
}

impl<T> ReadOutcome<T> {
    /// Apply `f` to the record payload, preserving `Eof` and `Truncated`.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ReadOutcome<U> {
        match self {
            ReadOutcome::Record(t) => ReadOutcome::Record(f(t)),
            ReadOutcome::Eof => ReadOutcome::Eof,
            ReadOutcome::Truncated => ReadOutcome::Truncated,
        }
    }

    /// The record payload, or `None` for `Eof` and `Truncated`.
    pub fn record(self) -> Option<T> {
        match self {
            ReadOutcome::Record(t) => Some(t),
            _ => None,
        }
    }

    /// True for `Eof`.
    pub fn is_eof(&self) -> bool {
        matches!(self, ReadOutcome::Eof)
    }
}

/// Failure of an append, classified by whether the file survived it.
#[derive(Debug, ThisError)]
pub enum AppendError {
    /// The write failed but the partial bytes were removed. The file is
    /// back in its pre-append state and may be retried.
    #[error("append rolled back: {0}")]
    RolledBack(#[source] Error),

    /// The write failed and the partial bytes could not be removed. The
    /// file ends mid-record and must not receive further appends.
    #[error("append left file broken: {0}")]
    Broken(#[source] Error),
}

impl From<AppendError> for Error {
    fn from(e: AppendError) -> Self {
        match e {
            AppendError::RolledBack(inner) | AppendError::Broken(inner) => inner,
        }
    }
}

/// Positioned sequential reader over a log file.
///
/// Implementations restore the position to the start of the attempted
/// read before returning `Eof` or `Truncated`, so a caller that sees
/// either can retry the same read after the file grows.
pub trait Reader {
    /// Read exactly `buf.len()` bytes at the current position.
    ///
    /// Returns `Eof` when no bytes remain, `Truncated` when some but not
    /// all remain. In both cases the position is unchanged.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<ReadOutcome<()>>;

    /// Move the read position to `offset`.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Current read position.
    fn tell(&self) -> u64;
}

/// Append-only writer for a log file.
pub trait Appender {
    /// Append `data` atomically with respect to crash recovery: either
    /// all of it becomes part of the file or none of it does.
    fn append(&mut self, data: &[u8]) -> std::result::Result<(), AppendError>;

    /// Shrink the file to `size` bytes.
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Current end-of-file position.
    fn tell(&self) -> u64;

    /// Flush appended data to stable storage.
    fn sync(&mut self) -> Result<()>;
}

/// Read one compact-encoded unsigned integer, rejecting values above `max`.
///
/// On `Eof` and `Truncated` the reader is rewound to where the integer
/// started. An invalid length marker or an out-of-range value is
/// corruption.
pub fn read_compact_unsigned<R: Reader + ?Sized>(
    reader: &mut R,
    max: u64,
) -> Result<ReadOutcome<u64>> {
    let start = reader.tell();
    let mut buf = [0u8; MAX_ENCODED_LENGTH];

    match reader.read_exact(&mut buf[..1])? {
        ReadOutcome::Record(()) => {}
        ReadOutcome::Eof => return Ok(ReadOutcome::Eof),
        ReadOutcome::Truncated => return Ok(ReadOutcome::Truncated),
    }
    let len = match length_from_first_byte(buf[0]) {
        Some(len) => len,
        None => {
            match reader.read_exact(&mut buf[1..2])? {
                ReadOutcome::Record(()) => {}
                // A lone zero byte at the tail is a torn record, not eof.
                ReadOutcome::Eof | ReadOutcome::Truncated => {
                    reader.seek(start)?;
                    return Ok(ReadOutcome::Truncated);
                }
            }
            length_from_second_byte(buf[1])
                .map_err(|_| Error::Corruption("invalid compact length marker".into()))?
        }
    };
    let consumed = if len > 8 { 2 } else { 1 };
    if len > consumed {
        match reader.read_exact(&mut buf[consumed..len])? {
            ReadOutcome::Record(()) => {}
            ReadOutcome::Eof | ReadOutcome::Truncated => {
                reader.seek(start)?;
                return Ok(ReadOutcome::Truncated);
            }
        }
    }
    match compact::decode_unsigned_bounded(&buf[..len], max) {
        Ok((value, _)) => Ok(ReadOutcome::Record(value)),
        Err(CompactError::OutOfRange { max }) => Err(Error::Corruption(format!(
            "compact value exceeds maximum {max}"
        ))),
        Err(e) => Err(Error::Corruption(e.to_string())),
    }
}

/// Skip `count` bytes by reading and discarding them.
///
/// Seeking past the end of a file does not fail, so skipping must read
/// to detect a torn payload. Rewinds to `start` on `Eof`/`Truncated`.
pub fn skip_bytes<R: Reader + ?Sized>(
    reader: &mut R,
    count: u64,
    start: u64,
) -> Result<ReadOutcome<()>> {
    let mut remaining = count;
    let mut chunk = [0u8; 4096];
    while remaining > 0 {
        let take = remaining.min(chunk.len() as u64) as usize;
        match reader.read_exact(&mut chunk[..take])? {
            ReadOutcome::Record(()) => remaining -= take as u64,
            ReadOutcome::Eof | ReadOutcome::Truncated => {
                reader.seek(start)?;
                return Ok(ReadOutcome::Truncated);
            }
        }
    }
    Ok(ReadOutcome::Record(()))
}
