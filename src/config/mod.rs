//! Bench configuration: one `[console]` and one `[dlt]` session plus `[logging]`.
//!
//! Files are looked up at `$TRACE_CONSOLE_CONFIG`, then
//! `./trace-console.toml`, then the platform config directory
//! (`~/.config/trace-console/trace-console.toml` on Linux). Without a file the
//! built-in defaults apply, with both sessions disabled.
//!
//! Selected values can be overridden from the environment:
//! `TRACE_CONSOLE_CONSOLE_PORT=COM15`, `TRACE_CONSOLE_DLT_ENABLED=1`,
//! `TRACE_CONSOLE_LOG_LEVEL=debug`.
//!
//! ```toml
//! [console]
//! enabled = true
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! password = "toor"
//!
//! [console.login]
//! welcome = "Logging in with home"
//!
//! [dlt]
//! enabled = true
//! port = "/dev/ttyUSB1"
//!
//! [logging]
//! format = "compact"
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, LoginConfig, SessionConfig};
