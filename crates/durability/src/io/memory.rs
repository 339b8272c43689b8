//! In-memory reader and appender, used by the codec and in tests.

use grouplog_core::Result;

use super::{AppendError, Appender, ReadOutcome, Reader};

/// Reader over an in-memory byte buffer.
#[derive(Debug)]
pub struct MemoryReader {
    data: Vec<u8>,
    pos: u64,
}

impl MemoryReader {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl Reader for MemoryReader {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<ReadOutcome<()>> {
        let available = self.data.len() as u64 - self.pos.min(self.data.len() as u64);
        if buf.is_empty() {
            return Ok(ReadOutcome::Record(()));
        }
        if available == 0 {
            return Ok(ReadOutcome::Eof);
        }
        if available < buf.len() as u64 {
            return Ok(ReadOutcome::Truncated);
        }
        let start = self.pos as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        self.pos += buf.len() as u64;
        Ok(ReadOutcome::Record(()))
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.pos = offset;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }
}

/// Appender into an in-memory byte buffer. Appends never fail.
#[derive(Debug, Default)]
pub struct MemoryAppender {
    buf: Vec<u8>,
}

impl MemoryAppender {
    /// Create an empty appender.
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the appender, returning the accumulated bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Appender for MemoryAppender {
    fn append(&mut self, data: &[u8]) -> std::result::Result<(), AppendError> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.buf.truncate(size as usize);
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.buf.len() as u64
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
