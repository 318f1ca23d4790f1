//! TOML-based configuration for facet.
//!
//! Supports a config file (`facet.toml`) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [limits]
//! field_count_soft = 1200
//! field_count_hard = 1500
//!
//! [validator]
//! strict = false
//!
//! [service]
//! max_blocking = 4
//!
//! [logging]
//! filter = "${FACET_LOG}"
//! ansi = true
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub limits: LimitSettings,
    pub validator: ValidatorSettings,
    pub service: ServiceSettings,
    pub logging: LoggingSettings,
}

/// Result-schema size limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Above this many fields the result schema carries a warning.
    pub field_count_soft: usize,

    /// Growing past this many fields aborts the batch.
    pub field_count_hard: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            field_count_soft: 1200,
            field_count_hard: 1500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidatorSettings {
    /// Treat missing or duplicate action targets as fatal.
    pub strict: bool,
}

/// Async facade settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Batches validated concurrently on the blocking pool.
    pub max_blocking: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { max_blocking: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,

    /// Colored output.
    pub ansi: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: true,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text, expanding `${VAR}` references first.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let expanded = expand_env_vars(content)?;
        let settings: Settings = toml::from_str(&expanded)?;
        settings.check()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `FACET_CONFIG`
    /// 2. `./facet.toml`
    /// 3. `~/.config/facet/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("FACET_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("facet.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("facet").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn check(&self) -> Result<(), SettingsError> {
        if self.limits.field_count_soft > self.limits.field_count_hard {
            return Err(SettingsError::InvalidConfig(format!(
                "field_count_soft ({}) exceeds field_count_hard ({})",
                self.limits.field_count_soft, self.limits.field_count_hard
            )));
        }
        if self.service.max_blocking == 0 {
            return Err(SettingsError::InvalidConfig(
                "service.max_blocking must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand `${VAR}` references in a string.
///
/// A `$` not followed by `{` is kept as is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(SettingsError::InvalidConfig(format!(
                "unterminated variable reference in '{}'",
                s
            )));
        };
        let var_name = &after[..end];
        let value =
            env::var(var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.to_string()))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);

    Ok(result)
}
