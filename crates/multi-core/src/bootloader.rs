//! Bootloader detection in flash backups.

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::scan::read_window;

/// Size of the bootloader block at the start of flash.
pub const BOOTLOADER_SIZE: u64 = 8192;

/// First 32 bytes of the stock module bootloader: initial stack pointer
/// followed by the first vector table entries.
pub const BOOTLOADER_HEADER: [u8; 32] = [
    0x00, 0x50, 0x00, 0x20, 0xD1, 0x01, 0x00, 0x08, 0x6D, 0x01, 0x00, 0x08, 0x71, 0x01, 0x00, 0x08,
    0x75, 0x01, 0x00, 0x08, 0x79, 0x01, 0x00, 0x08, 0x7D, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00,
];

/// Compare a header window against the bootloader signature.
///
/// Anything shorter or different is simply not a bootloader.
pub fn header_matches(header: &[u8]) -> bool {
    header == BOOTLOADER_HEADER
}

/// Check whether a file begins with the bootloader.
pub fn check_for_bootloader(path: &Path) -> Result<bool> {
    let header = read_window(path, 0, BOOTLOADER_HEADER.len())?;
    let found = header_matches(&header);
    debug!(path = %path.display(), found, "Bootloader check");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_header_matches() {
        assert!(header_matches(&BOOTLOADER_HEADER));
        assert!(!header_matches(&BOOTLOADER_HEADER[..31]));
        assert!(!header_matches(&[]));

        let mut changed = BOOTLOADER_HEADER;
        changed[31] ^= 0x80;
        assert!(!header_matches(&changed));
    }

    #[test]
    fn test_check_file() {
        let mut data = BOOTLOADER_HEADER.to_vec();
        data.extend_from_slice(&[0xFF; 1024]);
        let file = temp_file(&data);
        assert!(check_for_bootloader(file.path()).unwrap());

        let file = temp_file(&[0xFF; 1024]);
        assert!(!check_for_bootloader(file.path()).unwrap());

        let file = temp_file(&BOOTLOADER_HEADER[..16]);
        assert!(!check_for_bootloader(file.path()).unwrap());
    }
}
