//! Configuration for unveil
//!
//! Configuration file: ~/.config/daedalos/unveil.yaml
//!
//! ```yaml
//! vault: ~/.1pw
//! profile: default
//! filter:
//!   command: fzf
//!   height: 20%
//! clipboard:
//!   command: wl-copy
//! ```
//!
//! Every key is optional. Command-line flags win over the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnveilConfig {
    /// Vault directory, `~` and `$VARS` are expanded
    #[serde(default = "default_vault")]
    pub vault: String,

    /// Profile to unlock
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub clipboard: ClipboardConfig,
}

fn default_vault() -> String {
    "~/.1pw".to_string()
}

fn default_profile() -> String {
    "default".to_string()
}

impl Default for UnveilConfig {
    fn default() -> Self {
        Self {
            vault: default_vault(),
            profile: default_profile(),
            filter: FilterConfig::default(),
            clipboard: ClipboardConfig::default(),
        }
    }
}

/// Selection filter command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub command: String,

    /// Extra arguments, passed before the generated ones
    pub args: Vec<String>,

    pub height: Option<String>,

    pub min_height: Option<u32>,

    pub header: Option<String>,

    /// Pass `-1` with a query so a single match is picked without asking
    pub select_one: bool,

    /// Exit codes that mean "nothing selected" rather than failure
    pub abort_codes: Vec<i32>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            command: "fzf".to_string(),
            args: vec![],
            height: Some("20%".to_string()),
            min_height: Some(15),
            header: Some("search items".to_string()),
            select_one: true,
            // fzf: 1 = no match, 130 = interrupted
            abort_codes: vec![1, 130],
        }
    }
}

/// Clipboard-set command. Detected from PATH when `command` is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl UnveilConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path, defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Self = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        config_path_in(dirs::config_dir())
    }

    /// Vault directory with `~` and environment variables expanded
    pub fn vault_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.vault)
            .with_context(|| format!("Failed to expand vault path {}", self.vault))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

fn config_path_in(config_dir: Option<PathBuf>) -> PathBuf {
    config_dir
        .unwrap_or_else(|| PathBuf::from(shellexpand::tilde("~/.config").as_ref()))
        .join("daedalos")
        .join("unveil.yaml")
}
