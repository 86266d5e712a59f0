//! Presentation seam.
//!
//! The core never renders dialogs. It asks its questions through
//! [`BackupPrompt`] and hands back an [`Outcome`]: a disposition plus a
//! plain message the caller may show verbatim.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Answer to a yes/no/cancel question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Yes,
    No,
    Cancel,
}

/// Questions asked while extracting a backup.
pub trait BackupPrompt {
    /// Whether the trailing EEPROM region should be kept.
    fn include_eeprom(&self) -> Choice;

    /// Where to write the extracted image. `None` cancels.
    fn destination(&self, suggested: &Path) -> Option<PathBuf>;
}

/// Prompt with answers decided up front.
#[derive(Debug, Clone)]
pub struct FixedPrompt {
    pub include_eeprom: Choice,
    pub destination: Option<PathBuf>,
}

impl FixedPrompt {
    pub fn new(include_eeprom: bool, destination: impl Into<PathBuf>) -> Self {
        Self {
            include_eeprom: if include_eeprom {
                Choice::Yes
            } else {
                Choice::No
            },
            destination: Some(destination.into()),
        }
    }
}

impl BackupPrompt for FixedPrompt {
    fn include_eeprom(&self) -> Choice {
        self.include_eeprom
    }

    fn destination(&self, _suggested: &Path) -> Option<PathBuf> {
        self.destination.clone()
    }
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Failed,
    /// The user backed out. Nothing to report.
    Cancelled,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Success => write!(f, "Success"),
            Disposition::Failed => write!(f, "Failed"),
            Disposition::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Result of an operation as the presentation layer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub disposition: Disposition,
    pub message: String,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::Success,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::Failed,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            disposition: Disposition::Cancelled,
            message: String::new(),
        }
    }

    /// Map a result, rendering success with `on_success`.
    pub fn from_result<T>(result: Result<T>, on_success: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(value) => Self::success(on_success(&value)),
            Err(Error::UserCancelled) => Self::cancelled(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}
