//! Configuration module for facet.
//!
//! Handles the settings file, environment variable expansion and defaults.

mod settings;

pub use settings::{
    expand_env_vars, LimitSettings, LoggingSettings, ServiceSettings, Settings, SettingsError,
    ValidatorSettings,
};
