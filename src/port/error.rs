//! Errors raised by the serial transport itself.
//!
//! Kept apart from session errors so the reader loop can tell a quiet line
//! from a dead one.

use std::io::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// The driver refused the requested line settings.
    #[error("Unsupported port settings: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error only means "nothing arrived in time".
    ///
    /// `serialport` reports an expired read timeout as `TimedOut`; some
    /// platforms use `WouldBlock` or `Interrupted` instead.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ),
            Self::Serial(e) => matches!(e.kind(), serialport::ErrorKind::Io(ErrorKind::TimedOut)),
            _ => false,
        }
    }
}
