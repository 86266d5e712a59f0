//! USB bootloader support detection.
//!
//! Images built for the USB-capable bootloader carry the USB string
//! descriptors of the Maple stack. The descriptors are UTF-16, so the
//! vendor name shows up as `M\0a\0p\0l\0e\0` followed by the two-byte
//! header of the next descriptor, then `L\0e\0a\0f\0L\0a\0b\0s\0` and
//! another two-byte header.

use std::path::Path;

use tracing::{debug, instrument};

use crate::error::Result;
use crate::scan::{FirmwareImage, PatternByte, find_pattern};

const PRODUCT: &[u8] = b"Maple";
const VENDOR: &[u8] = b"LeafLabs";

/// Build the interleaved descriptor pattern.
fn maple_marker() -> Vec<PatternByte> {
    let mut pattern = Vec::with_capacity((PRODUCT.len() + VENDOR.len()) * 2 + 4);
    for text in [PRODUCT, VENDOR] {
        for &c in text {
            pattern.push(PatternByte::Exact(c));
            pattern.push(PatternByte::Exact(0));
        }
        // bLength, bDescriptorType
        pattern.push(PatternByte::Control);
        pattern.push(PatternByte::Control);
    }
    pattern
}

/// Check whether an image was built with USB bootloader support.
///
/// A match at offset 0 does not count.
pub fn has_usb_support(data: &[u8]) -> bool {
    match find_pattern(data, &maple_marker()) {
        Some(offset) if offset > 0 => {
            debug!(offset, "Found Maple USB descriptor");
            true
        }
        _ => false,
    }
}

/// Load a firmware file and check it for USB bootloader support.
#[instrument]
pub fn check_usb_support(path: &Path) -> Result<bool> {
    let image = FirmwareImage::load(path)?;
    Ok(has_usb_support(image.data()))
}
