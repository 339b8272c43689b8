//! Crash-safe truncate-and-append over a main file plus a shadow file.
//!
//! An [`AtomFile`] is a pair of files: the main file `name` and a shadow
//! overwrite file `name.overwrite` that exists only while a
//! [`truncate_and_append`](AtomFile::truncate_and_append) is in flight.
//! A crash at any point leaves enough state on disk for [`AtomFile::open`]
//! to restore either the exact pre-write or the exact post-write content,
//! never a mix.
//!
//! # Binary Format
//!
//! The overwrite file:
//!
//! ```text
//! +--------+------------------+------------------+
//! | state  | target offset    | payload          |
//! | 1 byte | 8 bytes, LE u64  | remaining bytes  |
//! +--------+------------------+------------------+
//! ```
//!
//! `state` is 0 while the shadow is being written (pending) and 1 once
//! it is complete (committed). The write protocol:
//!
//! 1. Create the shadow exclusively, write `{0, offset}` and the
//!    payload, fsync.
//! 2. Flip `state` to 1 in place, fsync.
//! 3. Write the payload into the main file at `offset`, truncate the
//!    main file to `offset + payload`, fsync.
//! 4. Delete the shadow.
//!
//! Recovery at open: no shadow means clean. A shadow that is empty or
//! still pending means step 1 never finished, so it is deleted
//! (rollback). A committed shadow means steps 2-4 may not have
//! finished, so they are redone from the stored offset (roll-forward,
//! idempotent). Anything else is a format error.
//!
//! The protocol assumes a single writer per file pair; the caller
//! serializes writers. Read-only openers never mutate: they serve reads
//! by splicing a committed shadow over the main file's tail.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use grouplog_core::{Error, Result};
use tracing::{debug, warn};

/// File name suffix of the shadow file.
pub const OVERWRITE_SUFFIX: &str = ".overwrite";

const HEADER_SIZE: u64 = 9;
const STATE_PENDING: u8 = 0;
const STATE_COMMITTED: u8 = 1;

/// A committed shadow observed by a read-only opener, served by
/// splicing over the main file at `offset`.
#[derive(Debug)]
struct Splice {
    offset: u64,
    payload: Vec<u8>,
}

/// Main file plus shadow overwrite file with crash-safe
/// truncate-and-append.
#[derive(Debug)]
pub struct AtomFile {
    file: File,
    overwrite_path: PathBuf,
    writable: bool,
    splice: Option<Splice>,
    len: u64,
}

impl AtomFile {
    /// Open `path`, running crash recovery first.
    ///
    /// A writable open repairs interrupted writes on disk. A read-only
    /// open mutates nothing and instead serves spliced reads over a
    /// committed shadow left by a crashed writer.
    pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> Result<Self> {
        let path = path.as_ref();
        let mut name = path.as_os_str().to_os_string();
        name.push(OVERWRITE_SUFFIX);
        let overwrite_path = PathBuf::from(name);

        let mut file = OpenOptions::new()
            .read(true)
            .write(writable)
            .create(writable)
            .open(path)?;
        let mut len = file.metadata()?.len();
        let mut splice = None;

        if overwrite_path.exists() {
            let shadow = fs::read(&overwrite_path)?;
            if shadow.is_empty() || shadow[0] == STATE_PENDING {
                // Step 1 never completed. The main file is untouched.
                if writable {
                    warn!(
                        path = %overwrite_path.display(),
                        "removing pending overwrite file left by interrupted write"
                    );
                    fs::remove_file(&overwrite_path)?;
                }
            } else if shadow[0] == STATE_COMMITTED {
                if (shadow.len() as u64) < HEADER_SIZE {
                    return Err(Error::Corruption(format!(
                        "overwrite file {} is committed but shorter than its header",
                        overwrite_path.display()
                    )));
                }
                let offset = u64::from_le_bytes(shadow[1..9].try_into().unwrap());
                let payload = shadow[HEADER_SIZE as usize..].to_vec();
                if writable {
                    warn!(
                        path = %overwrite_path.display(),
                        offset,
                        length = payload.len(),
                        "rolling forward committed overwrite file"
                    );
                    len = apply_overwrite(&mut file, offset, &payload)?;
                    fs::remove_file(&overwrite_path)?;
                } else {
                    len = offset + payload.len() as u64;
                    splice = Some(Splice { offset, payload });
                }
            } else {
                return Err(Error::Corruption(format!(
                    "overwrite file {} has invalid state byte {}",
                    overwrite_path.display(),
                    shadow[0]
                )));
            }
        }

        Ok(Self {
            file,
            overwrite_path,
            writable,
            splice,
            len,
        })
    }

    /// Logical size in bytes, including any splice.
    pub fn size(&self) -> u64 {
        self.len
    }

    /// Whether this handle may write.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Read up to `buf.len()` bytes at `offset`, returning the count.
    ///
    /// Reads past the logical end return fewer bytes, or zero at the
    /// end itself.
    pub fn pread(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let want = buf.len().min((self.len - offset) as usize);
        let buf = &mut buf[..want];

        match &self.splice {
            Some(splice) if offset + want as u64 > splice.offset => {
                // Part of the range is covered by the shadow payload.
                let from_main = splice.offset.saturating_sub(offset) as usize;
                if from_main > 0 {
                    read_at(&mut self.file, offset, &mut buf[..from_main])?;
                }
                let skip = offset.saturating_sub(splice.offset) as usize;
                buf[from_main..].copy_from_slice(&splice.payload[skip..skip + want - from_main]);
            }
            _ => read_at(&mut self.file, offset, buf)?,
        }
        Ok(want)
    }

    /// Append `data` at the logical end. Not crash-atomic.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(())
    }

    /// Replace everything from `offset` onward with `data`, crash-atomically.
    ///
    /// After this returns, the file content is the first `offset` bytes
    /// followed by `data`. If the process dies at any point inside, the
    /// next [`open`](AtomFile::open) restores either the full old
    /// content or the full new content.
    pub fn truncate_and_append(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        if offset > self.len {
            return Err(Error::Corruption(format!(
                "truncate_and_append offset {offset} beyond file size {}",
                self.len
            )));
        }

        // Step 1: build the shadow in pending state.
        let mut shadow = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.overwrite_path)?;
        shadow.write_all(&[STATE_PENDING])?;
        shadow.write_all(&offset.to_le_bytes())?;
        shadow.write_all(data)?;
        shadow.sync_data()?;

        // Step 2: commit the shadow.
        shadow.seek(SeekFrom::Start(0))?;
        shadow.write_all(&[STATE_COMMITTED])?;
        shadow.sync_data()?;
        drop(shadow);

        // Step 3: apply to the main file.
        self.len = apply_overwrite(&mut self.file, offset, data)?;

        // Step 4: the write is durable, discard the shadow.
        fs::remove_file(&self.overwrite_path)?;
        debug!(offset, length = data.len(), "truncate_and_append complete");
        Ok(())
    }

    /// Flush the main file to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::Unsupported("write on read-only atom file"))
        }
    }
}

/// Write `payload` into `file` at `offset`, truncate to the new end,
/// and fsync. Returns the new length. Idempotent, used both by the
/// write path and by roll-forward recovery.
fn apply_overwrite(file: &mut File, offset: u64, payload: &[u8]) -> Result<u64> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(payload)?;
    let new_len = offset + payload.len() as u64;
    file.set_len(new_len)?;
    file.sync_data()?;
    Ok(new_len)
}

fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::Corruption(
                    "file shorter than its recorded logical size".into(),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_all(file: &mut AtomFile) -> Vec<u8> {
        let mut buf = vec![0u8; file.size() as usize];
        let n = file.pread(0, &mut buf).unwrap();
        assert_eq!(n, buf.len());
        buf
    }

    #[test]
    fn test_append_and_pread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("atom");
        let mut file = AtomFile::open(&path, true).unwrap();
        file.append(b"hello world").unwrap();
        assert_eq!(file.size(), 11);

        let mut buf = [0u8; 5];
        assert_eq!(file.pread(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(file.pread(11, &mut buf).unwrap(), 0);
        // A read spanning the end is shortened, not failed.
        assert_eq!(file.pread(9, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ld");
    }

    #[test]
    fn test_truncate_and_append_replaces_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("atom");
        let mut file = AtomFile::open(&path, true).unwrap();
        file.append(b"aaaabbbb").unwrap();
        file.truncate_and_append(4, b"cc").unwrap();
        assert_eq!(file.size(), 6);
        assert_eq!(read_all(&mut file), b"aaaacc");
        assert!(!dir.path().join("atom.overwrite").exists());

        drop(file);
        let mut reopened = AtomFile::open(&path, true).unwrap();
        assert_eq!(read_all(&mut reopened), b"aaaacc");
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("atom");
        AtomFile::open(&path, true).unwrap().append(b"x").unwrap();

        let mut file = AtomFile::open(&path, false).unwrap();
        assert!(matches!(file.append(b"y"), Err(Error::Unsupported(_))));
        assert!(matches!(
            file.truncate_and_append(0, b"y"),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_invalid_shadow_state_byte_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("atom");
        AtomFile::open(&path, true).unwrap().append(b"abc").unwrap();

        let mut shadow = vec![7u8];
        shadow.extend_from_slice(&0u64.to_le_bytes());
        fs::write(dir.path().join("atom.overwrite"), shadow).unwrap();
        assert!(matches!(
            AtomFile::open(&path, true),
            Err(Error::Corruption(_))
        ));
    }
}
