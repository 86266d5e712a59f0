//! Byte scanning and bounded file access.
//!
//! Everything in a firmware image is recognized by scanning for fixed byte
//! patterns; there is no length-prefixed framing to walk. The helpers here
//! keep file handles scoped to a single call and only ever open files
//! read-only.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Hard ceiling on any firmware file read in full.
pub const MAX_FIRMWARE_FILE_SIZE: u64 = 256_000;

/// One element of a byte pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternByte {
    /// Matches exactly this byte.
    Exact(u8),
    /// Matches any ASCII control character (0x00-0x1F, 0x7F).
    Control,
}

impl PatternByte {
    fn matches(self, b: u8) -> bool {
        match self {
            PatternByte::Exact(v) => v == b,
            PatternByte::Control => b.is_ascii_control(),
        }
    }
}

/// Find the first occurrence of a literal byte sequence.
pub fn find(data: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > data.len() {
        return None;
    }
    data.windows(needle.len()).position(|w| w == needle)
}

/// Find the first occurrence of a pattern that may contain wildcards.
pub fn find_pattern(data: &[u8], pattern: &[PatternByte]) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > data.len() {
        return None;
    }
    data.windows(pattern.len())
        .position(|w| w.iter().zip(pattern).all(|(&b, p)| p.matches(b)))
}

/// Decode bytes as single-byte ASCII text. Non-ASCII bytes become `?`.
pub fn ascii_lossy(data: &[u8]) -> String {
    data.iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// Length of a file in bytes, without opening it for reading.
pub fn file_len(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

/// Read up to `len` bytes starting at `offset`.
///
/// Returns fewer bytes if the file ends first.
pub fn read_window(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read the final `len` bytes of a file, or the whole file if it is shorter.
pub fn read_tail(path: &Path, len: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let start = size.saturating_sub(len as u64);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// A firmware file loaded into memory. Never mutated after loading.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    path: PathBuf,
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Load a firmware file, rejecting anything over [`MAX_FIRMWARE_FILE_SIZE`]
    /// before a single byte is read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let size = file_len(path)?;
        if size > MAX_FIRMWARE_FILE_SIZE {
            return Err(Error::InputTooLarge { size });
        }

        let data = std::fs::read(path)?;
        debug!(path = %path.display(), size = data.len(), "Loaded firmware image");
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
