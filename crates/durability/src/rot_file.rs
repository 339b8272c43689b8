//! Growable append-only log file with a rotation-ready header.
//!
//! A [`RotFile`] is logically one continuously growing byte stream.
//! Physically it is a single segment file today; the header reserves a
//! compact-encoded rotation offset so that a future version can span
//! multiple segments without a format change. [`rotate`](RotFile::rotate)
//! and [`purge`](RotFile::purge) exist as named extension points and
//! fail with [`Error::Unsupported`] rather than silently doing nothing.
//!
//! # Binary Format
//!
//! ```text
//! +---------------------------+-------------+
//! | rotation offset (compact) | records ... |
//! +---------------------------+-------------+
//! ```
//!
//! The rotation offset is always 0 in a single-segment file, encoding
//! to the single byte `0x01`.
//!
//! Appends are single-writer; any number of concurrent readers may hold
//! independent cursors over the same file.

use std::path::{Path, PathBuf};

use grouplog_core::compact::{encode_unsigned, MAX_ENCODED_LENGTH};
use grouplog_core::{Error, Result};
use tracing::debug;

use crate::io::{
    read_compact_unsigned, AppendError, Appender, FileAppender, FileReader, ReadOutcome, Reader,
};

/// Single-segment append-only log file.
#[derive(Debug)]
pub struct RotFile {
    path: PathBuf,
    appender: FileAppender,
    header_len: u64,
    rotation_limit: Option<u64>,
}

impl RotFile {
    /// Open `path` for appending, creating it with a fresh header when
    /// absent or empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut appender = FileAppender::open(&path)?;

        let header_len = if appender.tell() == 0 {
            let mut buf = [0u8; MAX_ENCODED_LENGTH];
            let len = encode_unsigned(0, &mut buf);
            appender.append(&buf[..len]).map_err(Error::from)?;
            appender.sync()?;
            debug!(path = %path.display(), "created log segment");
            len as u64
        } else {
            let mut reader = FileReader::open(&path)?;
            match read_compact_unsigned(&mut reader, i64::MAX as u64)? {
                ReadOutcome::Record(offset) => {
                    if offset != 0 {
                        return Err(Error::Unsupported(
                            "log segment with nonzero rotation offset",
                        ));
                    }
                    reader.tell()
                }
                // The header is written in one append and never again;
                // a torn header cannot be recovered by truncation.
                ReadOutcome::Eof | ReadOutcome::Truncated => {
                    return Err(Error::Corruption(format!(
                        "log segment {} has a torn header",
                        path.display()
                    )))
                }
            }
        };

        Ok(Self {
            path,
            appender,
            header_len,
            rotation_limit: None,
        })
    }

    /// Size in bytes of the record area, excluding the header.
    pub fn size(&self) -> u64 {
        self.appender.tell() - self.header_len
    }

    /// Path of the current segment.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Advisory segment size at which a future rotation would trigger.
    pub fn rotation_limit(&self) -> Option<u64> {
        self.rotation_limit
    }

    /// Set the advisory rotation limit. Has no effect until rotation is
    /// implemented.
    pub fn set_rotation_limit(&mut self, limit: Option<u64>) {
        self.rotation_limit = limit;
    }

    /// Begin a new segment. Not yet implemented.
    pub fn rotate(&mut self) -> Result<()> {
        Err(Error::Unsupported("log segment rotation"))
    }

    /// Remove segments older than `_through_offset`. Not yet implemented.
    pub fn purge(&mut self, _through_offset: u64) -> Result<()> {
        Err(Error::Unsupported("log segment purge"))
    }

    /// A new independent reader positioned at the first record.
    pub fn reader(&self) -> Result<RotFileReader> {
        let mut inner = FileReader::open(&self.path)?;
        inner.seek(self.header_len)?;
        Ok(RotFileReader {
            inner,
            header_len: self.header_len,
        })
    }
}

impl Appender for RotFile {
    fn append(&mut self, data: &[u8]) -> std::result::Result<(), AppendError> {
        self.appender.append(data)
    }

    /// Truncate the record area to `size` bytes. The header always stays.
    fn truncate(&mut self, size: u64) -> Result<()> {
        self.appender.truncate(self.header_len + size)
    }

    fn tell(&self) -> u64 {
        self.appender.tell() - self.header_len
    }

    fn sync(&mut self) -> Result<()> {
        self.appender.sync()
    }
}

/// Reader over a [`RotFile`] with logical offsets.
///
/// Offset 0 is the first record byte; the header is invisible.
#[derive(Debug)]
pub struct RotFileReader {
    inner: FileReader,
    header_len: u64,
}

impl Reader for RotFileReader {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<ReadOutcome<()>> {
        self.inner.read_exact(buf)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(self.header_len + offset)
    }

    fn tell(&self) -> u64 {
        self.inner.tell() - self.header_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_header_is_invisible_to_readers() {
        let dir = TempDir::new().unwrap();
        let mut log = RotFile::open(dir.path().join("log")).unwrap();
        assert_eq!(log.size(), 0);
        log.append(b"abcdef").unwrap();
        assert_eq!(log.size(), 6);

        let mut reader = log.reader().unwrap();
        assert_eq!(reader.tell(), 0);
        let mut buf = [0u8; 6];
        assert_eq!(reader.read_exact(&mut buf).unwrap(), ReadOutcome::Record(()));
        assert_eq!(&buf, b"abcdef");
        reader.seek(2).unwrap();
        assert_eq!(reader.read_exact(&mut buf[..2]).unwrap(), ReadOutcome::Record(()));
        assert_eq!(&buf[..2], b"cd");
    }

    #[test]
    fn test_reopen_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log");
        {
            let mut log = RotFile::open(&path).unwrap();
            log.append(&[1, 2, 3]).unwrap();
            log.sync().unwrap();
        }
        let log = RotFile::open(&path).unwrap();
        assert_eq!(log.size(), 3);
        let mut reader = log.reader().unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(reader.read_exact(&mut buf).unwrap(), ReadOutcome::Record(()));
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_truncate_uses_logical_sizes() {
        let dir = TempDir::new().unwrap();
        let mut log = RotFile::open(dir.path().join("log")).unwrap();
        log.append(&[9; 10]).unwrap();
        log.truncate(4).unwrap();
        assert_eq!(log.size(), 4);
        log.append(&[7]).unwrap();
        assert_eq!(log.size(), 5);
    }

    #[test]
    fn test_rotation_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let mut log = RotFile::open(dir.path().join("log")).unwrap();
        log.set_rotation_limit(Some(1 << 20));
        assert_eq!(log.rotation_limit(), Some(1 << 20));
        assert!(matches!(log.rotate(), Err(Error::Unsupported(_))));
        assert!(matches!(log.purge(0), Err(Error::Unsupported(_))));
    }
}
