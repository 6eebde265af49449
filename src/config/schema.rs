//! Configuration schema definitions.
//!
//! Every section carries `#[serde(default)]`, so a config file only needs the
//! keys it wants to change.

use super::error::{ConfigError, ConfigResult};
use crate::framing::Framing;
use crate::port::{DataBits, FlowControl, Parity, PortConfiguration, StopBits};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interactive serial console of the device under test
    pub console: SessionConfig,
    /// DLT trace port
    pub dlt: SessionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            console: SessionConfig::default(),
            dlt: SessionConfig {
                framing: Framing::Dlt,
                ..SessionConfig::default()
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validate every enabled session section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.console.validate_as("console")?;
        self.dlt.validate_as("dlt")
    }

    /// Look up a session section by name (`console` or `dlt`).
    pub fn session(&self, name: &str) -> Option<&SessionConfig> {
        match name {
            "console" => Some(&self.console),
            "dlt" => Some(&self.dlt),
            _ => None,
        }
    }
}

/// Settings for one serial session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Disabled sessions skip connecting and refuse all operations
    pub enabled: bool,
    /// System path of the serial port (e.g. "COM15" or "/dev/ttyUSB0")
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Console login user
    pub username: String,
    /// Console login password
    pub password: String,
    /// Port read timeout; also how long a prompt without newline waits before it is emitted
    pub read_timeout_ms: u64,
    /// How long `connect` waits for the reader thread to report in
    pub ready_timeout_ms: u64,
    /// How long `disconnect` waits for the reader thread to stop
    pub join_timeout_ms: u64,
    /// Sleep between wait-queue polls
    pub poll_interval_ms: u64,
    pub framing: Framing,
    pub login: LoginConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: String::new(),
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            username: "root".to_string(),
            password: String::new(),
            read_timeout_ms: 200,
            ready_timeout_ms: 30_000,
            join_timeout_ms: 2_000,
            poll_interval_ms: 5,
            framing: Framing::Newline,
            login: LoginConfig::default(),
        }
    }
}

impl SessionConfig {
    /// An enabled session on `port` with default settings.
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            enabled: true,
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Line settings for opening the port.
    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            flow_control: self.flow_control,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout: self.read_timeout(),
        }
    }

    /// Check the settings a connect would rely on.
    ///
    /// Disabled sessions are always valid.
    pub fn validate(&self) -> ConfigResult<()> {
        self.validate_as("session")
    }

    fn validate_as(&self, section: &str) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.port.trim().is_empty() {
            return Err(ConfigError::validation(
                format!("{section}.port"),
                "an enabled session needs a serial port",
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::validation(
                format!("{section}.baud_rate"),
                "must be greater than zero",
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::validation(
                format!("{section}.read_timeout_ms"),
                "must be greater than zero",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                format!("{section}.poll_interval_ms"),
                "must be greater than zero",
            ));
        }
        self.login.validate_as(&format!("{section}.login"))
    }

    /// Build a session config from the flat key/value settings used by bench
    /// setup files, e.g. `putty_enabled`, `putty_comport`, `putty_baudrate`,
    /// `putty_username`, `putty_password`, `putty_timeout` (seconds).
    ///
    /// The `dlt` prefix selects DLT framing.
    pub fn from_legacy_map(prefix: &str, map: &Map<String, Value>) -> ConfigResult<Self> {
        let key = |name: &str| format!("{prefix}_{name}");
        let mut config = Self {
            framing: if prefix == "dlt" {
                Framing::Dlt
            } else {
                Framing::Newline
            },
            ..Self::default()
        };

        if let Some(value) = map.get(&key("enabled")) {
            config.enabled = legacy_bool(&key("enabled"), value)?;
        }
        if let Some(value) = map.get(&key("comport")) {
            config.port = legacy_string(&key("comport"), value)?;
        }
        if let Some(value) = map.get(&key("baudrate")) {
            let baud = legacy_number(&key("baudrate"), value)?;
            if baud.fract() != 0.0 || baud <= 0.0 || baud > f64::from(u32::MAX) {
                return Err(ConfigError::validation(key("baudrate"), "not a valid baud rate"));
            }
            config.baud_rate = baud as u32;
        }
        if let Some(value) = map.get(&key("username")) {
            config.username = legacy_string(&key("username"), value)?;
        }
        if let Some(value) = map.get(&key("password")) {
            config.password = legacy_string(&key("password"), value)?;
        }
        if let Some(value) = map.get(&key("timeout")) {
            let seconds = legacy_number(&key("timeout"), value)?;
            if seconds <= 0.0 {
                return Err(ConfigError::validation(key("timeout"), "must be positive"));
            }
            config.read_timeout_ms = (seconds * 1000.0).round() as u64;
        }

        config.validate_as(prefix)?;
        Ok(config)
    }
}

fn legacy_bool(key: &str, value: &Value) -> ConfigResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64().map(|n| n != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::validation(key, format!("'{s}' is not a boolean"))),
        },
        _ => Err(ConfigError::validation(key, "expected a boolean")),
    }
}

fn legacy_string(key: &str, value: &Value) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ConfigError::validation(key, "expected a string")),
    }
}

fn legacy_number(key: &str, value: &Value) -> ConfigResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ConfigError::validation(key, "number out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| ConfigError::validation(key, format!("'{s}' is not a number"))),
        _ => Err(ConfigError::validation(key, "expected a number")),
    }
}

/// Console login handshake settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Prompt shown by a locked console
    pub lock_prompt: String,
    pub password_prompt: String,
    /// Banner printed after a successful login
    pub welcome: String,
    /// Printed when the credentials are refused
    pub rejected: String,
    /// Shell prompt that also counts as logged in after the password, e.g. `"#"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_prompt: Option<String>,
    pub lock_check_timeout_ms: u64,
    pub prompt_timeout_ms: u64,
    pub max_attempts: u32,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            lock_prompt: "login:".to_string(),
            password_prompt: "Password:".to_string(),
            welcome: "Logging in with home".to_string(),
            rejected: "Login incorrect".to_string(),
            shell_prompt: None,
            lock_check_timeout_ms: 3_000,
            prompt_timeout_ms: 5_000,
            max_attempts: 5,
        }
    }
}

impl LoginConfig {
    pub fn lock_check_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_check_timeout_ms)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }

    fn validate_as(&self, section: &str) -> ConfigResult<()> {
        let required = [
            ("lock_prompt", Some(&self.lock_prompt)),
            ("password_prompt", Some(&self.password_prompt)),
            ("welcome", Some(&self.welcome)),
            ("rejected", Some(&self.rejected)),
            ("shell_prompt", self.shell_prompt.as_ref()),
        ];
        for (name, pattern) in required
            .into_iter()
            .filter_map(|(name, pattern)| pattern.map(|p| (name, p)))
        {
            if pattern.is_empty() {
                return Err(ConfigError::validation(
                    format!("{section}.{name}"),
                    "pattern must not be empty",
                ));
            }
            Regex::new(pattern).map_err(|e| {
                ConfigError::validation(format!("{section}.{name}"), e.to_string())
            })?;
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::validation(
                format!("{section}.max_attempts"),
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log file path; stderr when unset
    pub file: Option<PathBuf>,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.console.enabled);
        assert_eq!(config.console.baud_rate, 115_200);
        assert_eq!(config.console.username, "root");
        assert_eq!(config.console.poll_interval_ms, 5);
        assert_eq!(config.console.framing, Framing::Newline);
        assert_eq!(config.dlt.framing, Framing::Dlt);
        assert_eq!(config.console.login.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization_keeps_defaults() {
        let toml_str = r#"
            [console]
            enabled = true
            port = "COM15"
            baud_rate = 921600
            password = "secret"

            [console.login]
            prompt_timeout_ms = 2000
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.console.enabled);
        assert_eq!(config.console.port, "COM15");
        assert_eq!(config.console.baud_rate, 921_600);
        assert_eq!(config.console.username, "root");
        assert_eq!(config.console.login.prompt_timeout(), Duration::from_secs(2));
        assert_eq!(config.console.login.lock_prompt, "login:");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[console]"));
        assert!(toml_str.contains("[dlt]"));
        assert!(toml_str.contains("[console.login]"));
        assert!(toml_str.contains("framing = \"dlt\""));
    }

    #[test]
    fn test_enabled_session_requires_port() {
        let config = SessionConfig {
            enabled: true,
            ..SessionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("session.port"));
    }

    #[test]
    fn test_bad_login_pattern_rejected() {
        let mut config = SessionConfig::for_port("COM3");
        config.login.welcome = "(unclosed".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("login.welcome"));
    }

    #[test]
    fn test_port_configuration_uses_read_timeout() {
        let mut config = SessionConfig::for_port("/dev/ttyUSB0");
        config.read_timeout_ms = 3_000;
        config.parity = Parity::Even;
        let port = config.port_configuration();
        assert_eq!(port.timeout, Duration::from_secs(3));
        assert_eq!(port.parity, Parity::Even);
        assert_eq!(port.baud_rate, 115_200);
    }

    #[test]
    fn test_legacy_putty_map() {
        let map = legacy(json!({
            "putty_enabled": true,
            "putty_comport": "COM15",
            "putty_baudrate": "921600",
            "putty_username": "zeekr",
            "putty_password": "Aa123123",
            "putty_timeout": 3.0
        }));

        let config = SessionConfig::from_legacy_map("putty", &map).unwrap();
        assert!(config.enabled);
        assert_eq!(config.port, "COM15");
        assert_eq!(config.baud_rate, 921_600);
        assert_eq!(config.username, "zeekr");
        assert_eq!(config.password, "Aa123123");
        assert_eq!(config.read_timeout_ms, 3_000);
        assert_eq!(config.framing, Framing::Newline);
    }

    #[test]
    fn test_legacy_dlt_map_selects_dlt_framing() {
        let map = legacy(json!({ "dlt_enabled": true, "dlt_comport": "COM7" }));
        let config = SessionConfig::from_legacy_map("dlt", &map).unwrap();
        assert_eq!(config.framing, Framing::Dlt);
        assert_eq!(config.baud_rate, 115_200);
    }

    #[test]
    fn test_legacy_map_missing_enabled_is_disabled() {
        let map = legacy(json!({ "putty_comport": "COM4" }));
        let config = SessionConfig::from_legacy_map("putty", &map).unwrap();
        assert!(!config.enabled);
    }

    #[test]
    fn test_legacy_map_rejects_bad_values() {
        let map = legacy(json!({ "putty_enabled": true, "putty_comport": "COM4", "putty_baudrate": "fast" }));
        assert!(SessionConfig::from_legacy_map("putty", &map).is_err());

        let map = legacy(json!({ "putty_enabled": "maybe" }));
        assert!(SessionConfig::from_legacy_map("putty", &map).is_err());

        let map = legacy(json!({ "putty_enabled": true }));
        assert!(SessionConfig::from_legacy_map("putty", &map).is_err());
    }
}
