//! Ledger configuration.
//!
//! [`LedgerConfig`] carries the four control flags every entity type inherits
//! unless its descriptor overrides them. It is built once and handed to
//! [`EntityService::new`](crate::service::EntityService::new); nothing reads
//! configuration from global state.

use serde::{Deserialize, Serialize};

/// Errors raised while reading configuration text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid boolean '{value}' for key '{key}' on line {line}")]
    InvalidBoolean {
        key: String,
        value: String,
        line: usize,
    },

    #[error("Malformed configuration line {line}: '{content}'")]
    MalformedLine { line: usize, content: String },
}

/// Process-wide defaults for version and currency control.
///
/// `version_control` compares exact tokens and is the robust mode.
/// `currency_control` compares a read timestamp against the master's version
/// using "not after" ordering, which leaves a window between read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerConfig {
    pub version_control: bool,
    pub currency_control: bool,
    /// Resolve master linkage and tokens whenever a record is loaded.
    pub set_master_on_load: bool,
    /// Reload a record after saving so store-derived fields are normalized.
    pub auto_refresh: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            version_control: true,
            currency_control: false,
            set_master_on_load: true,
            auto_refresh: true,
        }
    }
}

impl LedgerConfig {
    /// Parse `key=value` properties text.
    ///
    /// Recognized keys are `entity.versioncontrol`, `entity.currencycontrol`,
    /// `entity.setmasteronload` and `entity.autorefresh`. Unknown keys are
    /// ignored, `#`/`!` lines are comments, and missing keys keep their defaults.
    pub fn from_properties(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
                return Err(ConfigError::MalformedLine {
                    line: index + 1,
                    content: raw.to_string(),
                });
            };
            let key = key.trim();
            let value = value.trim();

            let slot = match key {
                "entity.versioncontrol" => &mut config.version_control,
                "entity.currencycontrol" => &mut config.currency_control,
                "entity.setmasteronload" => &mut config.set_master_on_load,
                "entity.autorefresh" => &mut config.auto_refresh,
                _ => continue,
            };

            *slot = parse_bool(value).ok_or_else(|| ConfigError::InvalidBoolean {
                key: key.to_string(),
                value: value.to_string(),
                line: index + 1,
            })?;
        }

        Ok(config)
    }

    /// Apply per-type overrides on top of these defaults.
    pub fn with_overrides(&self, overrides: &ControlOverrides) -> Self {
        Self {
            version_control: overrides.version_control.unwrap_or(self.version_control),
            currency_control: overrides.currency_control.unwrap_or(self.currency_control),
            set_master_on_load: overrides
                .set_master_on_load
                .unwrap_or(self.set_master_on_load),
            auto_refresh: overrides.auto_refresh.unwrap_or(self.auto_refresh),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Flags an entity type forces regardless of the process defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlOverrides {
    pub version_control: Option<bool>,
    pub currency_control: Option<bool>,
    pub set_master_on_load: Option<bool>,
    pub auto_refresh: Option<bool>,
}
