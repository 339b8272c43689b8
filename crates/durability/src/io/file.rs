//! File-backed reader and appender.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use grouplog_core::{Error, Result};

use super::{AppendError, Appender, ReadOutcome, Reader};

/// Sequential reader over a file.
#[derive(Debug)]
pub struct FileReader {
    file: File,
    pos: u64,
}

impl FileReader {
    /// Wrap an already-open file, starting at offset zero.
    pub fn new(mut file: File) -> Result<Self> {
        file.seek(SeekFrom::Start(0))?;
        Ok(Self { file, pos: 0 })
    }

    /// Open `path` read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(File::open(path)?)
    }
}

impl Reader for FileReader {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<ReadOutcome<()>> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        if filled == buf.len() {
            self.pos += filled as u64;
            return Ok(ReadOutcome::Record(()));
        }
        // Short read: put the cursor back where this read started.
        self.file.seek(SeekFrom::Start(self.pos))?;
        if filled == 0 {
            Ok(ReadOutcome::Eof)
        } else {
            Ok(ReadOutcome::Truncated)
        }
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }
}

/// Appender over a file, rolling back partial writes.
#[derive(Debug)]
pub struct FileAppender {
    file: File,
    len: u64,
}

impl FileAppender {
    /// Open `path` for appending, creating it when absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    /// Wrap an already-open writable file, appending after `len` bytes.
    pub fn from_file(file: File, len: u64) -> Self {
        Self { file, len }
    }
}

impl Appender for FileAppender {
    fn append(&mut self, data: &[u8]) -> std::result::Result<(), AppendError> {
        let restore = |file: &mut File, len: u64, cause: std::io::Error| {
            match file.set_len(len) {
                Ok(()) => AppendError::RolledBack(Error::Io(cause)),
                Err(_) => AppendError::Broken(Error::Io(cause)),
            }
        };
        if let Err(e) = self.file.seek(SeekFrom::Start(self.len)) {
            return Err(AppendError::RolledBack(Error::Io(e)));
        }
        if let Err(e) = self.file.write_all(data) {
            return Err(restore(&mut self.file, self.len, e));
        }
        self.len += data.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.file.set_len(size)?;
        self.len = size;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.len
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
