//! Firmware extraction from raw flash backups.
//!
//! A backup is a straight dump of module flash. It is either 120 KiB
//! (firmware + EEPROM) or 128 KiB, in which case it may start with the
//! 8 KiB bootloader:
//!
//! ```text
//! 128 KiB: [ bootloader 8K ][ firmware ............ ][ EEPROM 2K ]
//! 120 KiB:                  [ firmware ............ ][ EEPROM 2K ]
//! ```

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::bootloader::{BOOTLOADER_SIZE, check_for_bootloader};
use crate::error::{Error, Result};
use crate::prompt::{BackupPrompt, Choice};
use crate::scan::file_len;

/// Backup of a module flashed without a bootloader region.
pub const BACKUP_SIZE_120K: u64 = 120 * 1024;

/// Backup of the full 128 KiB flash.
pub const BACKUP_SIZE_128K: u64 = 128 * 1024;

/// EEPROM region at the end of every backup.
pub const EEPROM_SIZE: u64 = 2048;

/// Byte range to carve out of a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupLayout {
    pub total_size: u64,
    pub bootloader_present: bool,
    pub start_offset: u64,
    pub end_offset: u64,
}

impl BackupLayout {
    /// Compute the range for a backup of `total_size` bytes.
    ///
    /// `bootloader_present` only matters for 128 KiB backups.
    pub fn compute(total_size: u64, bootloader_present: bool, include_eeprom: bool) -> Result<Self> {
        let start_offset = match total_size {
            BACKUP_SIZE_120K => 0,
            BACKUP_SIZE_128K if bootloader_present => BOOTLOADER_SIZE,
            BACKUP_SIZE_128K => 0,
            size => return Err(Error::BackupSizeInvalid { size }),
        };
        let end_offset = if include_eeprom {
            total_size
        } else {
            total_size - EEPROM_SIZE
        };

        if start_offset > end_offset {
            return Err(Error::InvalidRange {
                start: start_offset,
                end: end_offset,
            });
        }

        Ok(Self {
            total_size,
            bootloader_present: total_size == BACKUP_SIZE_128K && bootloader_present,
            start_offset,
            end_offset,
        })
    }

    /// Number of bytes in the range.
    pub fn len(&self) -> u64 {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check that a backup exists and has a valid size.
///
/// Returns its size and whether it starts with a bootloader.
#[instrument]
pub fn inspect_backup(path: &Path) -> Result<(u64, bool)> {
    if !path.is_file() {
        return Err(Error::BackupNotFound {
            path: path.to_path_buf(),
        });
    }

    let size = file_len(path)?;
    if size != BACKUP_SIZE_120K && size != BACKUP_SIZE_128K {
        return Err(Error::BackupSizeInvalid { size });
    }

    let bootloader = size == BACKUP_SIZE_128K && check_for_bootloader(path)?;
    debug!(size, bootloader, "Backup inspected");
    Ok((size, bootloader))
}

/// Copy exactly the layout's range from `source` to a new file at `dest`.
///
/// The whole range is read before `dest` is created, so `dest` may be the
/// backup itself. A failed write leaves no file behind.
pub fn extract_range(source: &Path, layout: &BackupLayout, dest: &Path) -> Result<u64> {
    let mut input = File::open(source)?;
    input.seek(SeekFrom::Start(layout.start_offset))?;

    let mut buf = vec![0u8; layout.len() as usize];
    input.read_exact(&mut buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("backup ended before 0x{:X}", layout.end_offset),
            )
        } else {
            e
        }
    })?;
    drop(input);

    let same_file = match (source.canonicalize(), dest.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    let write = || -> io::Result<()> {
        let mut output = File::create(dest)?;
        output.write_all(&buf)?;
        output.sync_all()
    };
    if let Err(e) = write() {
        if !same_file {
            let _ = std::fs::remove_file(dest);
        }
        return Err(e.into());
    }

    let written = buf.len() as u64;
    info!(
        start = %format!("0x{:X}", layout.start_offset),
        end = %format!("0x{:X}", layout.end_offset),
        written,
        dest = %dest.display(),
        "Extracted backup range"
    );
    Ok(written)
}

/// Completed extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub layout: BackupLayout,
    pub destination: PathBuf,
    pub include_eeprom: bool,
}

impl Extraction {
    pub fn message(&self) -> String {
        format!(
            "Firmware {}extracted to {} ({} bytes).",
            if self.include_eeprom {
                "and EEPROM data "
            } else {
                ""
            },
            self.destination.display(),
            self.layout.len()
        )
    }
}

/// Default output name next to the backup.
fn suggested_destination(backup: &Path) -> PathBuf {
    let stem = backup
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "backup".to_string());
    backup.with_file_name(format!("{}_firmware.bin", stem))
}

/// Extract the firmware from a backup, asking `prompt` whether to keep the
/// EEPROM region and where to write the result.
#[instrument(skip(prompt))]
pub fn extract_backup(path: &Path, prompt: &dyn BackupPrompt) -> Result<Extraction> {
    let (size, bootloader) = inspect_backup(path)?;

    let include_eeprom = match prompt.include_eeprom() {
        Choice::Yes => true,
        Choice::No => false,
        Choice::Cancel => return Err(Error::UserCancelled),
    };

    let layout = BackupLayout::compute(size, bootloader, include_eeprom)?;
    let destination = prompt
        .destination(&suggested_destination(path))
        .ok_or(Error::UserCancelled)?;

    extract_range(path, &layout, &destination)?;
    Ok(Extraction {
        layout,
        destination,
        include_eeprom,
    })
}
