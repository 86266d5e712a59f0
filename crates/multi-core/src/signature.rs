//! Firmware signature decoding.
//!
//! The build tool appends a 24-character signature to every firmware image.
//! Two grammars have been used over time:
//!
//! - v1, textual: `multi-(avr|stm|orx)-([a-z]{5})-(\d{8})`
//! - v2, bit-packed: `multi-x([a-z0-9]{8})-(\d{8})`
//!
//! The signature normally sits at the very end of the file, so the tail is
//! checked first and the whole image is only scanned when that fails.

use std::fmt;
use std::path::Path;

use tracing::{debug, instrument};

use crate::channel_order::ChannelOrder;
use crate::error::{Error, Result};
use crate::scan::{self, FirmwareImage};

/// Every signature starts with this prefix.
pub const SIGNATURE_PREFIX: &[u8] = b"multi-";

/// Length of a complete signature in either grammar.
pub const SIGNATURE_LEN: usize = 24;

/// Bit layout of the v2 flag word.
pub mod flags {
    /// Bits 0-1: module type.
    pub const MODULE_TYPE_MASK: u32 = 0x0003;
    /// Bits 2-6: channel order index.
    pub const CHANNEL_ORDER_MASK: u32 = 0x007C;
    pub const CHANNEL_ORDER_SHIFT: u32 = 2;
    /// Bit 7
    pub const BOOTLOADER_SUPPORT: u32 = 0x0080;
    /// Bit 8
    pub const CHECK_FOR_BOOTLOADER: u32 = 0x0100;
    /// Bit 9
    pub const INVERT_TELEMETRY: u32 = 0x0200;
    /// Bits 10-11: telemetry type.
    pub const TELEMETRY_TYPE_MASK: u32 = 0x0C00;
    pub const TELEMETRY_TYPE_SHIFT: u32 = 10;
    /// Bit 12
    pub const DEBUG_SERIAL: u32 = 0x1000;
}

/// Target hardware family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    Avr,
    Stm32,
    OrangeRx,
    Unknown,
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleType::Avr => write!(f, "AVR"),
            ModuleType::Stm32 => write!(f, "STM32"),
            ModuleType::OrangeRx => write!(f, "OrangeRX"),
            ModuleType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Telemetry protocol the firmware speaks to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryType {
    OpenTx,
    ErskyTx,
    Undefined,
}

impl fmt::Display for TelemetryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryType::OpenTx => write!(f, "OpenTX"),
            TelemetryType::ErskyTx => write!(f, "erskyTx"),
            TelemetryType::Undefined => write!(f, "Undefined"),
        }
    }
}

/// Four-part firmware version, printed as `major.minor.revision.patch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    pub fn new(major: u8, minor: u8, revision: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            revision,
            patch,
        }
    }

    /// Parse eight decimal digits as four two-digit fields.
    ///
    /// Each field is read as an integer, so `"00"` becomes `0` and `"05"`
    /// becomes `5`.
    fn from_digits(digits: &[u8]) -> Option<Self> {
        if digits.len() != 8 || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let field = |i: usize| (digits[i] - b'0') * 10 + (digits[i + 1] - b'0');
        Some(Self::new(field(0), field(2), field(4), field(6)))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.patch
        )
    }
}

/// The v2 flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagWord(pub u32);

impl FlagWord {
    fn is_set(self, mask: u32) -> bool {
        self.0 & mask != 0
    }

    pub fn module_type(self) -> ModuleType {
        match self.0 & flags::MODULE_TYPE_MASK {
            0 => ModuleType::Avr,
            1 => ModuleType::Stm32,
            3 => ModuleType::OrangeRx,
            // 2 is reserved
            _ => ModuleType::Unknown,
        }
    }

    /// Raw 5-bit channel order index.
    pub fn channel_order_index(self) -> usize {
        ((self.0 & flags::CHANNEL_ORDER_MASK) >> flags::CHANNEL_ORDER_SHIFT) as usize
    }

    pub fn channel_order(self) -> Option<ChannelOrder> {
        ChannelOrder::from_index(self.channel_order_index())
    }

    pub fn bootloader_support(self) -> bool {
        self.is_set(flags::BOOTLOADER_SUPPORT)
    }

    pub fn check_for_bootloader(self) -> bool {
        self.is_set(flags::CHECK_FOR_BOOTLOADER)
    }

    pub fn invert_telemetry(self) -> bool {
        self.is_set(flags::INVERT_TELEMETRY)
    }

    pub fn debug_serial(self) -> bool {
        self.is_set(flags::DEBUG_SERIAL)
    }

    pub fn telemetry_type(self) -> TelemetryType {
        match (self.0 & flags::TELEMETRY_TYPE_MASK) >> flags::TELEMETRY_TYPE_SHIFT {
            2 => TelemetryType::OpenTx,
            1 => TelemetryType::ErskyTx,
            _ => TelemetryType::Undefined,
        }
    }
}

/// Decoded firmware build information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareMetadata {
    /// Raw matched signature text.
    pub signature: String,
    pub module_type: ModuleType,
    /// `None` when the signature does not record a channel order.
    pub channel_order: Option<ChannelOrder>,
    pub bootloader_support: bool,
    pub check_for_bootloader: bool,
    pub telemetry_type: TelemetryType,
    pub invert_telemetry: bool,
    pub debug_serial: bool,
    pub version: FirmwareVersion,
}

impl fmt::Display for FirmwareMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel_order = self
            .channel_order
            .map(|c| c.to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        writeln!(f, "Signature:            {}", self.signature)?;
        writeln!(f, "Version:              {}", self.version)?;
        writeln!(f, "Module type:          {}", self.module_type)?;
        writeln!(f, "Channel order:        {}", channel_order)?;
        writeln!(f, "Bootloader support:   {}", self.bootloader_support)?;
        writeln!(f, "Check for bootloader: {}", self.check_for_bootloader)?;
        writeln!(f, "Telemetry type:       {}", self.telemetry_type)?;
        writeln!(f, "Invert telemetry:     {}", self.invert_telemetry)?;
        write!(f, "Debug serial:         {}", self.debug_serial)
    }
}

/// A candidate signature classified by grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature<'a> {
    /// `multi-(avr|stm|orx)-([a-z]{5})-(\d{8})`
    V1 {
        module: &'a [u8],
        options: &'a [u8],
        version: &'a [u8],
    },
    /// `multi-x([a-z0-9]{8})-(\d{8})`
    V2 { flags: &'a [u8], version: &'a [u8] },
    Unrecognized,
}

impl<'a> Signature<'a> {
    /// Match a candidate against both grammars. At most one can match.
    pub fn classify(text: &'a str) -> Self {
        let bytes = text.as_bytes();
        if bytes.len() != SIGNATURE_LEN || !bytes.starts_with(SIGNATURE_PREFIX) {
            return Signature::Unrecognized;
        }
        let body = &bytes[SIGNATURE_PREFIX.len()..];
        let version = &body[10..18];
        if body[9] != b'-' || !version.iter().all(u8::is_ascii_digit) {
            return Signature::Unrecognized;
        }

        if body[0] == b'x' {
            let flags = &body[1..9];
            if flags
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            {
                return Signature::V2 { flags, version };
            }
            return Signature::Unrecognized;
        }

        let module = &body[0..3];
        let options = &body[4..9];
        if matches!(module, b"avr" | b"stm" | b"orx")
            && body[3] == b'-'
            && options.iter().all(u8::is_ascii_lowercase)
        {
            return Signature::V1 {
                module,
                options,
                version,
            };
        }

        Signature::Unrecognized
    }

    /// Decode the classified signature into metadata.
    pub fn decode(&self, text: &str) -> Result<FirmwareMetadata> {
        match *self {
            Signature::V1 {
                module,
                options,
                version,
            } => {
                let module_type = match module {
                    b"avr" => ModuleType::Avr,
                    b"stm" => ModuleType::Stm32,
                    b"orx" => ModuleType::OrangeRx,
                    _ => ModuleType::Unknown,
                };
                let telemetry_type = match options[2] {
                    b't' => TelemetryType::OpenTx,
                    b's' => TelemetryType::ErskyTx,
                    _ => TelemetryType::Undefined,
                };

                Ok(FirmwareMetadata {
                    signature: text.to_string(),
                    module_type,
                    channel_order: None,
                    bootloader_support: options[0] == b'b',
                    check_for_bootloader: options[1] == b'c',
                    telemetry_type,
                    invert_telemetry: options[3] == b'i',
                    debug_serial: options[4] == b'd',
                    version: FirmwareVersion::from_digits(version)
                        .ok_or(Error::NoSignatureFound)?,
                })
            }
            Signature::V2 { flags, version } => {
                let flags_text = String::from_utf8_lossy(flags);
                let word = u32::from_str_radix(&flags_text, 16)
                    .map(FlagWord)
                    .map_err(|_| Error::SignatureParseFailed {
                        flags: flags_text.to_string(),
                    })?;

                Ok(FirmwareMetadata {
                    signature: text.to_string(),
                    module_type: word.module_type(),
                    channel_order: word.channel_order(),
                    bootloader_support: word.bootloader_support(),
                    check_for_bootloader: word.check_for_bootloader(),
                    telemetry_type: word.telemetry_type(),
                    invert_telemetry: word.invert_telemetry(),
                    debug_serial: word.debug_serial(),
                    version: FirmwareVersion::from_digits(version)
                        .ok_or(Error::NoSignatureFound)?,
                })
            }
            Signature::Unrecognized => Err(Error::NoSignatureFound),
        }
    }
}

/// Decode signature text under whichever grammar matches.
pub fn decode_signature(text: &str) -> Result<FirmwareMetadata> {
    Signature::classify(text).decode(text)
}

/// Last line of a short text window. A trailing terminator does not start
/// a new, empty line.
fn last_line(text: &str) -> &str {
    let trimmed = text.strip_suffix('\n').unwrap_or(text);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    trimmed
        .rsplit(['\r', '\n'])
        .next()
        .unwrap_or(trimmed)
}

/// Candidate from the last line of the final bytes, if it has the prefix.
fn tail_candidate(tail: &[u8]) -> Option<String> {
    let text = scan::ascii_lossy(tail);
    let candidate = last_line(&text);
    if candidate.as_bytes().starts_with(SIGNATURE_PREFIX) {
        Some(candidate.to_string())
    } else {
        None
    }
}

/// Candidate starting at the first `multi-` anywhere in the image.
fn scan_candidate(data: &[u8]) -> Option<String> {
    let offset = scan::find(data, SIGNATURE_PREFIX)?;
    let end = (offset + SIGNATURE_LEN).min(data.len());
    debug!(offset, "Signature prefix found by scan");
    Some(scan::ascii_lossy(&data[offset..end]))
}

/// Find the candidate signature text in an image already in memory.
pub fn locate_signature_in(data: &[u8]) -> Result<String> {
    let tail = &data[data.len().saturating_sub(SIGNATURE_LEN)..];
    tail_candidate(tail)
        .or_else(|| scan_candidate(data))
        .ok_or(Error::NoSignatureFound)
}

/// Find the candidate signature text in a firmware file.
///
/// Tries the last line of the final 24 bytes first, then falls back to
/// scanning the whole image for the first `multi-`.
#[instrument]
pub fn locate_signature(path: &Path) -> Result<String> {
    if let Some(candidate) = tail_candidate(&scan::read_tail(path, SIGNATURE_LEN)?) {
        debug!(signature = %candidate, "Signature found at end of file");
        return Ok(candidate);
    }

    debug!("No signature at end of file, scanning whole image");
    let image = FirmwareImage::load(path)?;
    scan_candidate(image.data()).ok_or(Error::NoSignatureFound)
}

/// Locate and decode the signature of a firmware file.
pub fn read_signature(path: impl AsRef<Path>) -> Result<FirmwareMetadata> {
    let text = locate_signature(path.as_ref())?;
    decode_signature(&text)
}

/// Locate and decode the signature of an image already in memory.
pub fn decode_image(data: &[u8]) -> Result<FirmwareMetadata> {
    decode_signature(&locate_signature_in(data)?)
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
    fn test_v1_signature() {
        let meta = decode_signature("multi-stm-bctid-01020304").unwrap();
        assert_eq!(meta.module_type, ModuleType::Stm32);
        assert!(meta.bootloader_support);
        assert!(meta.check_for_bootloader);
        assert_eq!(meta.telemetry_type, TelemetryType::OpenTx);
        assert!(meta.invert_telemetry);
        assert!(meta.debug_serial);
        assert_eq!(meta.channel_order, None);
        assert_eq!(meta.version.to_string(), "1.2.3.4");
        assert_eq!(meta.signature, "multi-stm-bctid-01020304");
    }

    #[test]
    fn test_v1_flags_off() {
        let meta = decode_signature("multi-avr-xxsxx-01030320").unwrap();
        assert_eq!(meta.module_type, ModuleType::Avr);
        assert!(!meta.bootloader_support);
        assert!(!meta.check_for_bootloader);
        assert_eq!(meta.telemetry_type, TelemetryType::ErskyTx);
        assert!(!meta.invert_telemetry);
        assert!(!meta.debug_serial);
        assert_eq!(meta.version.to_string(), "1.3.3.20");

        let meta = decode_signature("multi-orx-aaaaa-01000000").unwrap();
        assert_eq!(meta.module_type, ModuleType::OrangeRx);
        assert_eq!(meta.telemetry_type, TelemetryType::Undefined);
    }

    #[test]
    fn test_v2_signature() {
        // STM32, TAER (17), bootloader, check, invert, OpenTX, debug
        let word = 1 | (17 << 2) | 0x80 | 0x100 | 0x200 | (2 << 10) | 0x1000;
        let text = format!("multi-x{:08x}-01030320", word);
        let meta = decode_signature(&text).unwrap();
        assert_eq!(meta.module_type, ModuleType::Stm32);
        assert_eq!(meta.channel_order.unwrap().to_string(), "TAER");
        assert!(meta.bootloader_support);
        assert!(meta.check_for_bootloader);
        assert!(meta.invert_telemetry);
        assert!(meta.debug_serial);
        assert_eq!(meta.telemetry_type, TelemetryType::OpenTx);
        assert_eq!(meta.version, FirmwareVersion::new(1, 3, 3, 20));
    }

    #[test]
    fn test_v2_exhaustive_flag_bits() {
        for word in 0u32..=0xFFF {
            let text = format!("multi-x{:08x}-01020304", word);
            let meta = decode_signature(&text).unwrap();

            let expected_module = match word & 3 {
                0 => ModuleType::Avr,
                1 => ModuleType::Stm32,
                3 => ModuleType::OrangeRx,
                _ => ModuleType::Unknown,
            };
            assert_eq!(meta.module_type, expected_module, "word {:#x}", word);

            let index = ((word & 0x7C) >> 2) as usize;
            assert_eq!(
                meta.channel_order.map(|c| c.index()),
                if index < 24 { Some(index) } else { None },
                "word {:#x}",
                word
            );

            assert_eq!(meta.bootloader_support, word & 0x80 != 0);
            assert_eq!(meta.check_for_bootloader, word & 0x100 != 0);
            assert_eq!(meta.invert_telemetry, word & 0x200 != 0);
            assert_eq!(meta.debug_serial, word & 0x1000 != 0);

            let expected_telemetry = match (word >> 10) & 3 {
                2 => TelemetryType::OpenTx,
                1 => TelemetryType::ErskyTx,
                _ => TelemetryType::Undefined,
            };
            assert_eq!(meta.telemetry_type, expected_telemetry, "word {:#x}", word);
        }
    }

    #[test]
    fn test_version_zero_fields() {
        let v1 = decode_signature("multi-avr-bctid-00000100").unwrap();
        let v2 = decode_signature("multi-x00000000-00000100").unwrap();
        assert_eq!(v1.version.to_string(), "0.0.1.0");
        assert_eq!(v2.version.to_string(), "0.0.1.0");

        let v1 = decode_signature("multi-avr-bctid-01020304").unwrap();
        let v2 = decode_signature("multi-x00000000-01020304").unwrap();
        assert_eq!(v1.version.to_string(), "1.2.3.4");
        assert_eq!(v2.version.to_string(), "1.2.3.4");
    }

    #[test]
    fn test_grammars_are_exclusive() {
        assert!(matches!(
            Signature::classify("multi-stm-bctid-01020304"),
            Signature::V1 { .. }
        ));
        assert!(matches!(
            Signature::classify("multi-x0000abcd-01020304"),
            Signature::V2 { .. }
        ));
        // "x" prefix never falls through to v1
        assert_eq!(
            Signature::classify("multi-xyz-bctid-01020304"),
            Signature::Unrecognized
        );
    }

    #[test]
    fn test_unrecognized_signatures() {
        for text in [
            "",
            "not a signature at all",
            "multi-arm-bctid-01020304",
            "multi-stm-BCTID-01020304",
            "multi-stm-bctid-0102030",
            "multi-stm-bctid-010203045",
            "multi-x0000ABCD-01020304",
            "multi-x0000abcd-0102030a",
        ] {
            assert!(
                matches!(decode_signature(text), Err(Error::NoSignatureFound)),
                "{:?}",
                text
            );
        }
    }

    #[test]
    fn test_v2_bad_hex_is_parse_failure() {
        let err = decode_signature("multi-xzzzzzzzz-01020304").unwrap_err();
        assert!(matches!(err, Error::SignatureParseFailed { ref flags } if flags == "zzzzzzzz"));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let a = decode_signature("multi-x00001a85-01030320").unwrap();
        let b = decode_signature("multi-x00001a85-01030320").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_last_line() {
        assert_eq!(last_line("abc\nmulti-x"), "multi-x");
        assert_eq!(last_line("abc\r\nmulti-x\r\n"), "multi-x");
        assert_eq!(last_line("multi-x"), "multi-x");
        assert_eq!(last_line(""), "");
    }

    #[test]
    fn test_read_signature_from_tail() {
        let mut data = vec![0xFFu8; 4096];
        data.extend_from_slice(b"multi-stm-bctid-01030320");
        let file = temp_file(&data);

        let meta = read_signature(file.path()).unwrap();
        assert_eq!(meta.signature, "multi-stm-bctid-01030320");
        assert_eq!(meta.version.to_string(), "1.3.3.20");
    }

    #[test]
    fn test_read_signature_by_scan() {
        let mut data = vec![0xFFu8; 4096];
        data[1000..1024].copy_from_slice(b"multi-x00001a85-01030320");
        let file = temp_file(&data);

        let meta = read_signature(file.path()).unwrap();
        assert_eq!(meta.signature, "multi-x00001a85-01030320");
        assert_eq!(meta.module_type, ModuleType::Stm32);
    }

    #[test]
    fn test_read_signature_short_file() {
        let file = temp_file(b"multi-avr");
        assert!(matches!(
            read_signature(file.path()),
            Err(Error::NoSignatureFound)
        ));
    }

    #[test]
    fn test_decode_image_matches_file_lookup() {
        let mut tail_signed = vec![0xFFu8; 4096];
        tail_signed.extend_from_slice(b"\nmulti-stm-bctid-01030320");
        let mut scan_signed = vec![0xFFu8; 4096];
        scan_signed[100..124].copy_from_slice(b"multi-x00001a85-01030320");

        for data in [tail_signed, scan_signed] {
            let file = temp_file(&data);
            assert_eq!(
                decode_image(&data).unwrap(),
                read_signature(file.path()).unwrap()
            );
        }
        assert!(matches!(
            decode_image(&[0u8; 64]),
            Err(Error::NoSignatureFound)
        ));
        assert!(matches!(decode_image(&[]), Err(Error::NoSignatureFound)));
    }

    #[test]
    fn test_read_signature_missing() {
        let file = temp_file(&[0u8; 2048]);
        assert!(matches!(
            read_signature(file.path()),
            Err(Error::NoSignatureFound)
        ));
    }
}
