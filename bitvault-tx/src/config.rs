//! Configuration management for transaction construction.
//!
//! Settings are stored in TOML. Every field has a default, so a partial file
//! (or an empty one) loads into a complete [`Config`].
//!
//! ```toml
//! [selection]
//! strategy = "oldest_first"
//! tie_break = "larger_value_first"
//! min_confirmations = 1
//! dust_threshold = 546
//! ```
//!
//! No key material or passwords belong in this file.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::coin_selection::{SelectionStrategy, TieBreak};
use crate::logging::{log_params, log_storage, LogConfig, LogLevel};
use crate::types::{DUST_THRESHOLD, MAX_BITCOIN_SUPPLY};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Coin selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Which selector to use (oldest_first, largest_first, avoid_change)
    #[serde(default)]
    pub strategy: SelectionStrategy,

    /// Ordering among equally confirmed outputs
    #[serde(default)]
    pub tie_break: TieBreak,

    /// Confirmations required before a non-change output may be spent
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u32,

    /// Change at or below this value is added to the fee instead
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::default(),
            tie_break: TieBreak::default(),
            min_confirmations: default_min_confirmations(),
            dust_threshold: default_dust_threshold(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| anyhow!("Failed to parse config file: {}", e))?;
        config.validate()?;

        log_storage(
            LogLevel::Debug,
            "Loaded configuration",
            Some(log_params(vec![("path", path.display().to_string())])),
        );

        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, content).map_err(|e| anyhow!("Failed to write config file: {}", e))?;

        log_storage(
            LogLevel::Info,
            "Saved configuration",
            Some(log_params(vec![
                ("path", path.display().to_string()),
                ("strategy", self.selection.strategy.to_string()),
            ])),
        );

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.selection.dust_threshold >= MAX_BITCOIN_SUPPLY {
            return Err(anyhow!(
                "Invalid dust threshold: {} exceeds the maximum supply",
                self.selection.dust_threshold
            ));
        }

        if self.selection.min_confirmations == 0 {
            anyhow::bail!("Invalid min_confirmations: must be greater than 0");
        }

        Ok(())
    }
}

/// Ensure a configuration file exists at the specified path
/// If it doesn't exist, create it with default values
pub fn ensure_config_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        let default_config = Config::default();
        let content = toml::to_string_pretty(&default_config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;
            }
        }

        fs::write(path, content)
            .map_err(|e| anyhow!("Failed to write default config file: {}", e))?;
    }

    Ok(())
}

// Default value functions

fn default_min_confirmations() -> u32 {
    1
}

fn default_dust_threshold() -> u64 {
    DUST_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.selection.strategy, SelectionStrategy::OldestFirst);
        assert_eq!(config.selection.tie_break, TieBreak::LargerValueFirst);
        assert_eq!(config.selection.dust_threshold, DUST_THRESHOLD);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [selection]
            strategy = "avoid_change"
            tie_break = "smaller_value_first"
            "#,
        )
        .unwrap();

        assert_eq!(config.selection.strategy, SelectionStrategy::AvoidChange);
        assert_eq!(config.selection.tie_break, TieBreak::SmallerValueFirst);
        assert_eq!(config.selection.min_confirmations, 1);
    }

    #[test]
    fn test_validate_rejects_zero_confirmations() {
        let mut config = Config::default();
        config.selection.min_confirmations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dust_threshold_above_supply() {
        let mut config = Config::default();
        config.selection.dust_threshold = MAX_BITCOIN_SUPPLY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_signing_section_is_ignored() {
        let config: Config = toml::from_str(
            r#"
            [signing]
            enforce_p2sh = false
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }
}
