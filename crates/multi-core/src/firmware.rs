//! Firmware Analysis Module
//!
//! Collects everything the tool knows about a firmware file into one
//! report for the CLI.

use std::path::{Path, PathBuf};

use crate::eeprom::EepromPageLocator;
use crate::error::{Error, Result};
use crate::scan::FirmwareImage;
use crate::signature::{self, FirmwareMetadata};
use crate::size::{SizeConstraint, validate_image};
use crate::usb::has_usb_support;

/// Validation check result
#[derive(Debug, Clone)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

/// Complete firmware analysis result
#[derive(Debug, Clone)]
pub struct FirmwareAnalysis {
    /// Source file path
    pub path: PathBuf,
    /// File name
    pub filename: String,
    /// File size in bytes
    pub size: u64,
    /// Built for the USB bootloader
    pub usb_support: bool,
    /// Offset of a valid EEPROM page
    pub eeprom_page: Option<usize>,
    /// Decoded signature
    pub metadata: Option<FirmwareMetadata>,
    /// Why the signature could not be decoded
    pub metadata_error: Option<String>,
    /// Capacity the file was checked against
    pub constraint: Option<SizeConstraint>,
    /// Validation checks
    pub validations: Vec<ValidationCheck>,
}

impl FirmwareAnalysis {
    /// Analyze a firmware file
    pub fn analyze(path: &Path, eeprom: &dyn EepromPageLocator) -> Result<Self> {
        let image = FirmwareImage::load(path)?;
        let data = image.data();
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let usb_support = has_usb_support(data);
        let eeprom_page = eeprom.find_valid_page(data);

        let (metadata, metadata_error) = match signature::decode_image(data) {
            Ok(m) => (Some(m), None),
            Err(e @ (Error::NoSignatureFound | Error::SignatureParseFailed { .. })) => {
                (None, Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        let size_check = validate_image(data, eeprom);
        let constraint = size_check.as_ref().ok().copied();

        let mut validations = vec![ValidationCheck {
            name: "File Size".to_string(),
            passed: size_check.is_ok(),
            message: match &size_check {
                Ok(c) => format!("{} of {} bytes", image.len(), c.maximum()),
                Err(e) => e.to_string().replace("\n\n", " "),
            },
        }];
        validations.push(ValidationCheck {
            name: "Signature".to_string(),
            passed: metadata.is_some(),
            message: match (&metadata, &metadata_error) {
                (Some(m), _) => m.signature.clone(),
                (None, Some(e)) => e.clone(),
                (None, None) => String::new(),
            },
        });

        Ok(Self {
            path: path.to_path_buf(),
            filename,
            size: image.len(),
            usb_support,
            eeprom_page,
            metadata,
            metadata_error,
            constraint,
            validations,
        })
    }

    /// Check if all validations passed
    pub fn is_valid(&self) -> bool {
        self.validations.iter().all(|v| v.passed)
    }

    /// Get validation summary
    pub fn validation_summary(&self) -> String {
        let passed = self.validations.iter().filter(|v| v.passed).count();
        let total = self.validations.len();
        format!("{}/{} checks passed", passed, total)
    }

    fn eeprom_text(&self) -> String {
        match self.eeprom_page {
            Some(offset) => format!("valid page at 0x{:05X}", offset),
            None => "none".to_string(),
        }
    }

    /// Format as text for display
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("Firmware Analysis: {}\n", self.filename));
        out.push_str(&format!("{}\n", "=".repeat(50)));
        out.push_str(&format!(
            "File size: {} bytes ({} KB)\n",
            self.size,
            self.size / 1024
        ));
        out.push_str(&format!(
            "USB bootloader support: {}\n",
            if self.usb_support { "yes" } else { "no" }
        ));
        out.push_str(&format!("EEPROM: {}\n", self.eeprom_text()));
        if let Some(c) = &self.constraint {
            out.push_str(&format!("Maximum size: {} bytes\n", c.maximum()));
        }

        if let Some(m) = &self.metadata {
            out.push_str("\nSignature:\n");
            for line in m.to_string().lines() {
                out.push_str(&format!("  {}\n", line));
            }
        }

        out.push_str(&format!("\nValidation ({}):\n", self.validation_summary()));
        for v in &self.validations {
            let icon = if v.passed { "✅" } else { "❌" };
            out.push_str(&format!("  {} {}: {}\n", icon, v.name, v.message));
        }

        out
    }

    /// Format as markdown table
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("## {}\n\n", self.filename));
        out.push_str("| Property | Value |\n");
        out.push_str("|----------|-------|\n");
        out.push_str(&format!("| Size | {} bytes |\n", self.size));
        out.push_str(&format!("| USB support | {} |\n", self.usb_support));
        out.push_str(&format!("| EEPROM | {} |\n", self.eeprom_text()));
        if let Some(m) = &self.metadata {
            let channel_order = m
                .channel_order
                .map(|c| c.to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            out.push_str(&format!("| Signature | `{}` |\n", m.signature));
            out.push_str(&format!("| Version | {} |\n", m.version));
            out.push_str(&format!("| Module type | {} |\n", m.module_type));
            out.push_str(&format!("| Channel order | {} |\n", channel_order));
            out.push_str(&format!("| Telemetry | {} |\n", m.telemetry_type));
        }
        out.push_str(&format!(
            "| Valid | {} |\n",
            if self.is_valid() { "✅" } else { "❌" }
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eeprom::Stm32EepromLocator;
    use std::io::Write;

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_analyze_signed_image() {
        let mut data = vec![0xFFu8; 32 * 1024];
        data.extend_from_slice(b"multi-x00001a85-01030320");
        let file = temp_file(&data);

        let analysis = FirmwareAnalysis::analyze(file.path(), &Stm32EepromLocator).unwrap();
        assert!(analysis.is_valid());
        assert!(!analysis.usb_support);
        assert_eq!(analysis.eeprom_page, None);
        assert_eq!(analysis.constraint.unwrap().maximum(), 129_024);
        assert_eq!(
            analysis.metadata.as_ref().unwrap().version.to_string(),
            "1.3.3.20"
        );
        assert_eq!(analysis.validation_summary(), "2/2 checks passed");

        let text = analysis.to_text();
        assert!(text.contains("Version:              1.3.3.20"));
        assert!(analysis.to_markdown().contains("| Module type | STM32 |"));
    }

    #[test]
    fn test_analyze_unsigned_oversized_image() {
        let file = temp_file(&vec![0xFFu8; 130_000]);
        let analysis = FirmwareAnalysis::analyze(file.path(), &Stm32EepromLocator).unwrap();
        assert!(!analysis.is_valid());
        assert!(analysis.metadata.is_none());
        assert_eq!(
            analysis.metadata_error.as_deref(),
            Some("No firmware signature found")
        );
        assert!(analysis.constraint.is_none());
        assert_eq!(analysis.validation_summary(), "0/2 checks passed");
    }

    #[test]
    fn test_analyze_rejects_huge_file() {
        let file = temp_file(&vec![0u8; 300_000]);
        assert!(matches!(
            FirmwareAnalysis::analyze(file.path(), &Stm32EepromLocator),
            Err(Error::InputTooLarge { .. })
        ));
    }
}
