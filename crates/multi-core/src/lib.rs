//! Multi-Core: firmware inspection for Multi-protocol TX modules.
//!
//! This crate decodes the build signature embedded in compiled module
//! firmware, validates firmware files against the flash capacity of the
//! target hardware, and carves firmware (optionally with its EEPROM
//! configuration) out of raw flash backups.
//!
//! # Architecture
//!
//! The crate is organized leaf-first:
//!
//! - **Scan**: byte pattern search and bounded file window reads
//! - **Channel order**: the 24 stick channel permutations
//! - **USB**: detection of USB-bootloader capable images
//! - **Signature**: the two historical signature grammars
//! - **EEPROM**: locating a valid emulated-EEPROM page
//! - **Size**: flash capacity validation
//! - **Bootloader / Backup**: backup layout and extraction
//! - **Prompt**: seam to the presentation layer
//!
//! # Example
//!
//! ```no_run
//! use multi_core::signature::read_signature;
//!
//! let metadata = read_signature("multi-stm-opentx-v1.3.3.20.bin").expect("no signature");
//! println!("{}", metadata);
//! ```

pub mod backup;
pub mod bootloader;
pub mod channel_order;
pub mod config;
pub mod eeprom;
pub mod error;
pub mod firmware;
pub mod prompt;
pub mod scan;
pub mod signature;
pub mod size;
pub mod usb;

// Re-exports for convenience
pub use backup::{BackupLayout, Extraction, extract_backup, extract_range, inspect_backup};
pub use bootloader::{BOOTLOADER_HEADER, check_for_bootloader, header_matches};
pub use channel_order::{Channel, ChannelOrder};
pub use config::ToolConfig;
pub use eeprom::{EepromPageLocator, Stm32EepromLocator};
pub use error::{Error, Result};
pub use firmware::FirmwareAnalysis;
pub use prompt::{BackupPrompt, Choice, Disposition, FixedPrompt, Outcome};
pub use scan::FirmwareImage;
pub use signature::{
    FirmwareMetadata, FirmwareVersion, FlagWord, ModuleType, Signature, TelemetryType,
    decode_image, decode_signature, read_signature,
};
pub use size::{SizeConstraint, check_firmware_file_size, validate_image};
pub use usb::{check_usb_support, has_usb_support};
