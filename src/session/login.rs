//! Console login handshake.

use super::{Outgoing, SerialSession, TraceMatch};
use crate::config::LoginConfig;
use crate::error::{SessionError, SessionResult};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Where the login handshake ended up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    #[default]
    Unknown,
    CheckingLock,
    AlreadyLoggedIn,
    NeedsLogin,
    LoggedIn,
    LoginFailed,
}

impl LoginState {
    /// Whether the console is usable afterwards.
    pub fn is_logged_in(self) -> bool {
        matches!(self, Self::AlreadyLoggedIn | Self::LoggedIn)
    }
}

fn compile(pattern: &str) -> SessionResult<Regex> {
    Regex::new(pattern).map_err(|e| SessionError::invalid_pattern(pattern, e))
}

fn either(first: &str, second: &str) -> SessionResult<Regex> {
    compile(&format!("(?:{first})|(?:{second})"))
}

#[derive(Debug)]
pub(crate) struct LoginPatterns {
    lock_check: Regex,
    after_username: Regex,
    after_password: Regex,
    welcome: Regex,
    rejected: Regex,
}

impl LoginPatterns {
    pub(crate) fn compile(config: &LoginConfig) -> SessionResult<Self> {
        Ok(Self {
            lock_check: either(&config.lock_prompt, &config.rejected)?,
            after_username: compile(&format!(
                "(?:{})|(?:{})|(?:{})",
                config.password_prompt, config.welcome, config.rejected
            ))?,
            after_password: match &config.shell_prompt {
                Some(shell) => compile(&format!(
                    "(?:{})|(?:{})|(?:{})",
                    config.welcome, shell, config.rejected
                ))?,
                None => either(&config.welcome, &config.rejected)?,
            },
            welcome: compile(&config.welcome)?,
            rejected: compile(&config.rejected)?,
        })
    }

    fn is_rejection(&self, found: &TraceMatch) -> bool {
        self.rejected.is_match(&found.line)
    }

    fn is_welcome(&self, found: &TraceMatch) -> bool {
        self.welcome.is_match(&found.line)
    }
}

impl SerialSession {
    /// Log in to the console if it is locked.
    ///
    /// The outcome is returned, never raised: a refused login is
    /// `Ok(LoginState::LoginFailed)`.
    pub fn login(&self) -> SessionResult<LoginState> {
        let _scope = self.log_scope();
        self.ensure_ready()?;
        self.run_login()
    }

    pub(super) fn run_login(&self) -> SessionResult<LoginState> {
        let login = &self.config.login;
        let patterns = &self.patterns;

        debug!(state = ?LoginState::CheckingLock, "Checking whether the console is locked");
        match self.wait_inner(&patterns.lock_check, Outgoing::Line("\n"), login.lock_check_timeout())? {
            None => {
                debug!(state = ?LoginState::AlreadyLoggedIn, "Console already logged in");
                return Ok(LoginState::AlreadyLoggedIn);
            }
            Some(found) if patterns.is_rejection(&found) => {
                error!(state = ?LoginState::LoginFailed, line = %found.line, "Console rejected login");
                return Ok(LoginState::LoginFailed);
            }
            Some(_) => info!(state = ?LoginState::NeedsLogin, "Console is locked, logging in"),
        }

        for attempt in 1..=login.max_attempts {
            info!(attempt, max_attempts = login.max_attempts, "Trying to log in");

            let Some(found) = self.wait_inner(
                &patterns.after_username,
                Outgoing::Line(&self.config.username),
                login.prompt_timeout(),
            )?
            else {
                warn!(attempt, "No response to username");
                continue;
            };
            if patterns.is_rejection(&found) {
                error!(state = ?LoginState::LoginFailed, line = %found.line, "Console rejected login");
                return Ok(LoginState::LoginFailed);
            }
            if patterns.is_welcome(&found) {
                info!(outcome = "success", state = ?LoginState::LoggedIn, "Logged in without password");
                return Ok(LoginState::LoggedIn);
            }

            match self.wait_inner(
                &patterns.after_password,
                Outgoing::Secret(&self.config.password),
                login.prompt_timeout(),
            )? {
                Some(found) if patterns.is_rejection(&found) => {
                    error!(state = ?LoginState::LoginFailed, line = %found.line, "Console rejected login");
                    return Ok(LoginState::LoginFailed);
                }
                Some(_) => {
                    info!(outcome = "success", state = ?LoginState::LoggedIn, "Logged in");
                    return Ok(LoginState::LoggedIn);
                }
                None => warn!(attempt, "No response to password"),
            }
        }

        error!(
            state = ?LoginState::LoginFailed,
            attempts = login.max_attempts,
            "Failed to log in"
        );
        Ok(LoginState::LoginFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> LoginPatterns {
        LoginPatterns::compile(&LoginConfig::default()).unwrap()
    }

    #[test]
    fn lock_check_matches_prompt_and_rejection() {
        let p = patterns();
        assert!(p.lock_check.is_match("hu-1234 login: "));
        assert!(p.lock_check.is_match("Login incorrect"));
        assert!(!p.lock_check.is_match("root@hu:~#"));
    }

    #[test]
    fn after_username_accepts_three_outcomes() {
        let p = patterns();
        assert!(p.after_username.is_match("Password:"));
        assert!(p.after_username.is_match("Logging in with home = \"/root\"."));
        assert!(p.after_username.is_match("Login incorrect"));
        assert!(!p.after_username.is_match("login:"));
    }

    #[test]
    fn after_password_ignores_password_prompt() {
        let p = patterns();
        assert!(!p.after_password.is_match("Password:"));
        assert!(p.after_password.is_match("Logging in with home"));
        assert!(!p.after_password.is_match("root@hu:~#"));
    }

    #[test]
    fn shell_prompt_accepted_after_password_when_configured() {
        let config = LoginConfig {
            shell_prompt: Some("#".to_string()),
            ..LoginConfig::default()
        };
        let p = LoginPatterns::compile(&config).unwrap();
        assert!(p.after_password.is_match("root@hu:~# "));
        assert!(p.after_password.is_match("Login incorrect"));
        assert!(!p.after_username.is_match("root@hu:~# "));
    }

    #[test]
    fn terminal_states() {
        assert!(LoginState::LoggedIn.is_logged_in());
        assert!(LoginState::AlreadyLoggedIn.is_logged_in());
        assert!(!LoginState::LoginFailed.is_logged_in());
        assert_eq!(LoginState::default(), LoginState::Unknown);
    }
}
