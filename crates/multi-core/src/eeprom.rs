//! Emulated EEPROM page lookup.
//!
//! STM32 modules keep their runtime settings in the last 2 KiB of flash,
//! laid out as two 1 KiB pages of emulated EEPROM. The first half-word of
//! each page holds its status.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

/// Size of the EEPROM region at the tail of flash.
pub const EEPROM_REGION_SIZE: usize = 2048;

/// Size of one emulated EEPROM page.
pub const EEPROM_PAGE_SIZE: usize = 1024;

/// Page status half-words.
pub const PAGE_VALID: u16 = 0x0000;
pub const PAGE_RECEIVE_DATA: u16 = 0xEEEE;
pub const PAGE_ERASED: u16 = 0xFFFF;

/// Locates a valid EEPROM page inside an image.
pub trait EepromPageLocator {
    /// Byte offset of a valid EEPROM page in `data`, or `None`.
    fn find_valid_page(&self, data: &[u8]) -> Option<usize>;

    fn has_valid_page(&self, data: &[u8]) -> bool {
        self.find_valid_page(data).is_some()
    }
}

/// Page lookup for the STM32 emulated EEPROM layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stm32EepromLocator;

impl EepromPageLocator for Stm32EepromLocator {
    fn find_valid_page(&self, data: &[u8]) -> Option<usize> {
        if data.len() < EEPROM_REGION_SIZE {
            return None;
        }

        let region_start = data.len() - EEPROM_REGION_SIZE;
        let status0 = LittleEndian::read_u16(&data[region_start..]);
        let status1 = LittleEndian::read_u16(&data[region_start + EEPROM_PAGE_SIZE..]);

        let page = match (status0, status1) {
            (PAGE_VALID, PAGE_ERASED | PAGE_RECEIVE_DATA) => Some(0),
            (PAGE_ERASED | PAGE_RECEIVE_DATA, PAGE_VALID) => Some(1),
            _ => None,
        };

        debug!(
            status0 = %format!("{:04X}", status0),
            status1 = %format!("{:04X}", status1),
            page = ?page,
            "EEPROM page status"
        );

        page.map(|p| region_start + p * EEPROM_PAGE_SIZE)
    }
}
