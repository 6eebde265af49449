//! Finding, reading and writing `trace-console.toml`.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, SessionConfig};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "TRACE_CONSOLE";
const CONFIG_FILE_NAME: &str = "trace-console.toml";
/// Points at a config file explicitly.
const CONFIG_PATH_ENV: &str = "TRACE_CONSOLE_CONFIG";

/// A validated configuration and the file it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub config_path: Option<PathBuf>,
    pub config: Config,
}

impl ConfigLoader {
    /// Load from the first existing standard location, or defaults.
    ///
    /// Search order: `$TRACE_CONSOLE_CONFIG`, `./trace-console.toml`, the
    /// platform config directory. Environment overrides are applied on top
    /// and the result is validated.
    pub fn load() -> ConfigResult<Self> {
        Self::finish(resolve_config_path())
    }

    /// Load a specific file, then apply overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::finish(Some(path.as_ref().to_path_buf()))
    }

    fn finish(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = match &config_path {
            Some(path) => read_config(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(Self {
            config_path,
            config,
        })
    }

    /// Defaults plus environment overrides. Unparseable overrides are ignored.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        if apply_env_overrides(&mut config).is_err() {
            config = Config::default();
        }
        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        write_config(&self.config, path.as_ref())
    }
}

/// First existing config file among the standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    let explicit = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let local = Some(PathBuf::from(CONFIG_FILE_NAME));

    [explicit, local, get_default_config_path()]
        .into_iter()
        .flatten()
        .find(|path| path.is_file())
}

/// Platform config directory, e.g. `~/.config/trace-console`.
pub fn get_default_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "trace-console")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn read_config(path: &Path) -> ConfigResult<Config> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

fn write_config(config: &Config, path: &Path) -> ConfigResult<()> {
    let write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(write_error)
}

/// `TRACE_CONSOLE_<SECTION>_<KEY>` for session settings, e.g.
/// `TRACE_CONSOLE_CONSOLE_PORT=COM15` or `TRACE_CONSOLE_DLT_ENABLED=1`, and
/// `TRACE_CONSOLE_LOG_LEVEL` for the default log filter.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    override_session("CONSOLE", &mut config.console)?;
    override_session("DLT", &mut config.dlt)?;
    if let Ok(level) = std::env::var(format!("{ENV_PREFIX}_LOG_LEVEL")) {
        config.logging.level = level;
    }
    Ok(())
}

fn override_session(section: &str, session: &mut SessionConfig) -> ConfigResult<()> {
    let lookup = |key: &str| {
        let var = format!("{ENV_PREFIX}_{section}_{key}");
        std::env::var(&var).ok().map(|value| (var, value))
    };

    if let Some((_, value)) = lookup("ENABLED") {
        session.enabled = matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Some((_, value)) = lookup("PORT") {
        session.port = value;
    }
    if let Some((var, value)) = lookup("BAUD") {
        session.baud_rate = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::env_parse(var, "Invalid baud rate"))?;
    }
    if let Some((_, value)) = lookup("USERNAME") {
        session.username = value;
    }
    if let Some((_, value)) = lookup("PASSWORD") {
        session.password = value;
    }
    Ok(())
}
