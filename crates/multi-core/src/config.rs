//! Tool configuration.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Defaults for the command-line tool, loaded from TOML.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Answer to the include-EEPROM question when none is given.
    pub include_eeprom: Option<bool>,
    /// Directory for extracted images when no output path is given.
    pub output_dir: Option<PathBuf>,
    /// Default log filter, e.g. `debug` or `multi_core=trace`.
    pub log_level: Option<String>,
}

impl ToolConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ToolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Output path for an extracted image named `file_name`.
    pub fn output_path(&self, file_name: &str) -> Option<PathBuf> {
        self.output_dir.as_ref().map(|dir| dir.join(file_name))
    }
}
