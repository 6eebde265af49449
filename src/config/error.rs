//! Errors raised while loading, validating or saving configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot encode config as TOML: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A setting is present but unusable, e.g. an enabled session without a port.
    #[error("Invalid setting '{key}': {message}")]
    Invalid { key: String, message: String },

    /// An override variable could not be parsed.
    #[error("Invalid value in ${var}: {message}")]
    Env { var: String, message: String },
}

impl ConfigError {
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env_parse(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            message: message.into(),
        }
    }

    /// Dotted key of the offending setting, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Invalid { key, .. } => Some(key),
            Self::Env { var, .. } => Some(var),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_setting_names_key() {
        let err = ConfigError::validation("console.port", "an enabled session needs a serial port");
        assert_eq!(err.key(), Some("console.port"));
        assert_eq!(
            err.to_string(),
            "Invalid setting 'console.port': an enabled session needs a serial port"
        );
    }

    #[test]
    fn test_env_error_display() {
        let err = ConfigError::env_parse("TRACE_CONSOLE_CONSOLE_BAUD", "Invalid baud rate");
        assert_eq!(
            err.to_string(),
            "Invalid value in $TRACE_CONSOLE_CONSOLE_BAUD: Invalid baud rate"
        );
    }
}
