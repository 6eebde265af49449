//! Trace-synchronized serial console sessions for HIL test benches.
//!
//! A test script drives a device under test over its serial console: send a
//! command, then wait for a trace line matching a regular expression, or
//! collect everything the device prints during a window.
//!
//! # Modules
//!
//! - `config`: TOML configuration with environment overrides
//! - `error`: Session error type
//! - `framing`: Splitting raw port bytes into trace lines
//! - `logging`: Global subscriber setup for the bench binary
//! - `port`: Port abstraction layer (real ports and a scriptable mock)
//! - `session`: The session controller, login handshake and trace sinks

pub mod config;
pub mod error;
pub mod framing;
pub mod logging;
pub mod port;
pub mod session;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigLoader, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use framing::Framing;
pub use port::{MockSerialPort, PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
pub use session::{
    ConnectionState, LoginState, MonitorGuard, SerialSession, TraceLine, TraceMatch,
};
