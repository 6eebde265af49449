//! Session-level error type.
//!
//! Only caller mistakes and transport failures are errors. A pattern that never
//! shows up, or a console that refuses the credentials, is reported through the
//! normal return value instead.

use crate::config::ConfigError;
use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`SerialSession`](crate::session::SerialSession) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session is switched off in its configuration.
    #[error("Serial session is disabled in configuration")]
    Disabled,

    /// An operation needs a connected session.
    #[error("No serial connection, call connect first")]
    NotConnected,

    /// The background reader hit a hard port error and stopped.
    #[error("Serial reader stopped after a port error")]
    ReaderStopped,

    /// The reader thread did not report in after spawning.
    #[error("Serial reader did not start within {0:?}")]
    ReaderStartup(Duration),

    /// The reader thread could not be spawned.
    #[error("Failed to spawn serial reader thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A trace pattern is not a valid regular expression.
    #[error("Invalid trace pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SessionError {
    pub(crate) fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SessionError::NotConnected.to_string(),
            "No serial connection, call connect first"
        );
        assert_eq!(
            SessionError::ReaderStartup(Duration::from_secs(30)).to_string(),
            "Serial reader did not start within 30s"
        );
        let port: SessionError = PortError::not_found("COM15").into();
        assert_eq!(port.to_string(), "Serial port not found: COM15");
    }

    #[test]
    fn test_invalid_pattern_keeps_source() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let err = SessionError::invalid_pattern("(unclosed", source);
        assert!(err.to_string().starts_with("Invalid trace pattern '(unclosed'"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
