//! Error taxonomy shared by every operation of the crate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Firmware file is too large: {size} bytes")]
    InputTooLarge { size: u64 },

    #[error(
        "Firmware file is too large.\n\nFile is {} KB, maximum size is {} KB.",
        .actual / 1024,
        .maximum / 1024
    )]
    SizeExceeded { actual: u64, maximum: u64 },

    #[error("No firmware signature found")]
    NoSignatureFound,

    #[error("Unable to parse firmware signature flags: {flags}")]
    SignatureParseFailed { flags: String },

    #[error("Backup file {} not found", .path.display())]
    BackupNotFound { path: PathBuf },

    #[error("Incorrect backup file size: {size} bytes")]
    BackupSizeInvalid { size: u64 },

    #[error("Cancelled")]
    UserCancelled,

    #[error("Invalid byte range: start 0x{start:X} is past end 0x{end:X}")]
    InvalidRange { start: u64, end: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_exceeded_uses_whole_kib() {
        let err = Error::SizeExceeded {
            actual: 129_025,
            maximum: 129_024,
        };
        let msg = err.to_string();
        assert!(msg.contains("File is 126 KB"));
        assert!(msg.contains("maximum size is 126 KB"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
