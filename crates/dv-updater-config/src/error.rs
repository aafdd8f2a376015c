use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(dv_updater_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(dv_updater_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists: {}", .0.display())]
    #[diagnostic(
        code(dv_updater_config::already_exists),
        help("Pass --force to overwrite it or choose a different --output path")
    )]
    ConfigAlreadyExists(PathBuf),

    #[error("Invalid value `{value}` for {key}: {reason}")]
    #[diagnostic(
        code(dv_updater_config::invalid_value),
        help("Fix the value in the config file or the matching UPDATER_* variable")
    )]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid duration `{value}` for {key}")]
    #[diagnostic(
        code(dv_updater_config::invalid_duration),
        help("Use a duration such as \"10s\", \"1m\" or \"1h30m\"")
    )]
    InvalidDuration { key: String, value: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(dv_updater_config::io))]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(dv_updater_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(dv_updater_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),
}

impl ConfigError {
    pub(crate) fn invalid(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
