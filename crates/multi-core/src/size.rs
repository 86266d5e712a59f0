//! Firmware file size validation.
//!
//! The usable flash depends on the bootloader the module runs: the USB
//! bootloader occupies 8 KiB more than the serial one. Images that carry
//! an EEPROM page may use the 2 KiB EEPROM region on top of that.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::eeprom::EepromPageLocator;
use crate::error::{Error, Result};
use crate::scan::{self, FirmwareImage, MAX_FIRMWARE_FILE_SIZE};
use crate::usb::has_usb_support;

/// Flash available to firmware on a USB-bootloader module.
pub const USB_FIRMWARE_CAPACITY: u64 = 120_832;

/// Flash available to firmware on a serial-bootloader module.
pub const SERIAL_FIRMWARE_CAPACITY: u64 = 129_024;

/// Extra room when the image includes the EEPROM region.
pub const EEPROM_RESERVE: u64 = 2048;

/// Capacity an image is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeConstraint {
    pub base_capacity: u64,
    pub eeprom_reserve: u64,
}

impl SizeConstraint {
    pub fn new(usb_support: bool, eeprom_present: bool) -> Self {
        Self {
            base_capacity: if usb_support {
                USB_FIRMWARE_CAPACITY
            } else {
                SERIAL_FIRMWARE_CAPACITY
            },
            eeprom_reserve: if eeprom_present { EEPROM_RESERVE } else { 0 },
        }
    }

    pub fn maximum(&self) -> u64 {
        self.base_capacity + self.eeprom_reserve
    }

    pub fn check(&self, size: u64) -> Result<()> {
        if size > self.maximum() {
            return Err(Error::SizeExceeded {
                actual: size,
                maximum: self.maximum(),
            });
        }
        Ok(())
    }
}

/// Validate an in-memory image. Returns the constraint it satisfied.
pub fn validate_image(data: &[u8], eeprom: &dyn EepromPageLocator) -> Result<SizeConstraint> {
    let size = data.len() as u64;
    if size > MAX_FIRMWARE_FILE_SIZE {
        return Err(Error::InputTooLarge { size });
    }

    let constraint = SizeConstraint::new(has_usb_support(data), eeprom.has_valid_page(data));
    constraint.check(size)?;
    Ok(constraint)
}

/// Validate a firmware file against the capacity of its target module.
///
/// Oversized files are rejected from their metadata alone.
#[instrument(skip(eeprom))]
pub fn check_firmware_file_size(
    path: &Path,
    eeprom: &dyn EepromPageLocator,
) -> Result<SizeConstraint> {
    let size = scan::file_len(path)?;
    if size > MAX_FIRMWARE_FILE_SIZE {
        warn!(size, "Firmware file exceeds hard size limit");
        return Err(Error::InputTooLarge { size });
    }

    let image = FirmwareImage::load(path)?;
    let constraint = validate_image(image.data(), eeprom)?;
    info!(
        size,
        maximum = constraint.maximum(),
        "Firmware file size is valid"
    );
    Ok(constraint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eeprom::Stm32EepromLocator;
    use std::io::Write;

    struct NoEeprom;

    impl EepromPageLocator for NoEeprom {
        fn find_valid_page(&self, _data: &[u8]) -> Option<usize> {
            None
        }
    }

    struct AlwaysEeprom;

    impl EepromPageLocator for AlwaysEeprom {
        fn find_valid_page(&self, data: &[u8]) -> Option<usize> {
            Some(data.len().saturating_sub(2048))
        }
    }

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    fn usb_image(len: usize) -> Vec<u8> {
        let mut data = vec![0xFFu8; len];
        let mut marker = Vec::new();
        for c in b"Maple" {
            marker.extend_from_slice(&[*c, 0]);
        }
        marker.extend_from_slice(&[0x12, 0x03]);
        for c in b"LeafLabs" {
            marker.extend_from_slice(&[*c, 0]);
        }
        marker.extend_from_slice(&[0x0A, 0x03]);
        data[0x200..0x200 + marker.len()].copy_from_slice(&marker);
        data
    }

    #[test]
    fn test_serial_capacity_boundary() {
        let ok = temp_file(&vec![0xFFu8; 129_024]);
        let constraint = check_firmware_file_size(ok.path(), &NoEeprom).unwrap();
        assert_eq!(constraint.maximum(), 129_024);

        let too_big = temp_file(&vec![0xFFu8; 129_025]);
        let err = check_firmware_file_size(too_big.path(), &NoEeprom).unwrap_err();
        assert!(matches!(
            err,
            Error::SizeExceeded {
                actual: 129_025,
                maximum: 129_024
            }
        ));
    }

    #[test]
    fn test_hard_ceiling() {
        let file = temp_file(&vec![0u8; 256_001]);
        let err = check_firmware_file_size(file.path(), &AlwaysEeprom).unwrap_err();
        assert!(matches!(err, Error::InputTooLarge { size: 256_001 }));
    }

    #[test]
    fn test_usb_capacity() {
        assert!(validate_image(&usb_image(120_832), &NoEeprom).is_ok());
        assert!(matches!(
            validate_image(&usb_image(120_833), &NoEeprom),
            Err(Error::SizeExceeded { maximum: 120_832, .. })
        ));
    }

    #[test]
    fn test_eeprom_reserve() {
        let constraint = validate_image(&usb_image(122_880), &AlwaysEeprom).unwrap();
        assert_eq!(constraint.maximum(), 122_880);
        assert!(validate_image(&vec![0xFFu8; 131_072], &AlwaysEeprom).is_ok());
        assert!(validate_image(&vec![0xFFu8; 131_073], &AlwaysEeprom).is_err());
    }

    #[test]
    fn test_default_locator_with_erased_tail() {
        assert!(validate_image(&vec![0xFFu8; 129_024], &Stm32EepromLocator).is_ok());
        assert!(validate_image(&vec![0xFFu8; 129_025], &Stm32EepromLocator).is_err());
    }

    #[test]
    fn test_error_message() {
        let err = SizeConstraint::new(false, false).check(200_000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Firmware file is too large.\n\nFile is 195 KB, maximum size is 126 KB."
        );
    }
}
