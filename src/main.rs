//! `trace-console` bench binary.
//!
//! ```bash
//! # Wait up to 5 s for a result line after running a test command
//! trace-console --port /dev/ttyUSB0 wait --cmd run_test --pattern 'Result:\s(.*)' --timeout 5
//!
//! # Capture everything the DLT port prints for 30 s
//! trace-console --section dlt monitor --seconds 30
//! ```
//!
//! Exit status: 0 on success, 1 on fatal errors (including a port that cannot
//! be opened), 2 when a pattern was not found or the login failed.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use trace_console::config::{Config, ConfigLoader};
use trace_console::port::list_ports;
use trace_console::{logging, SerialSession, SessionError};
use tracing::{error, info};

const NOT_FOUND: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "trace-console", version, about = "Drive a device console and wait for its traces")]
struct Cli {
    /// Config file; otherwise the standard locations are searched
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Which configured session to use
    #[arg(long, value_enum, default_value_t = Section::Console, global = true)]
    section: Section,

    /// Serial port; also enables the session
    #[arg(short, long, global = true)]
    port: Option<String>,

    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Section {
    Console,
    Dlt,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Dlt => "dlt",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports
    Ports,
    #[command(flatten)]
    Session(SessionCommand),
}

/// Subcommands that open the selected session.
#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Send a command and wait for a matching trace line
    Wait {
        /// Regular expression searched for in each line
        #[arg(long)]
        pattern: String,
        /// Command to send; empty only observes
        #[arg(long, default_value = "")]
        cmd: String,
        /// Seconds to wait
        #[arg(long, default_value = "10", value_parser = parse_seconds)]
        timeout: Duration,
        /// Skip the login check
        #[arg(long)]
        no_login: bool,
    },
    /// Send a command and print every line received for a while
    Exec {
        #[arg(long)]
        cmd: String,
        /// Seconds to collect output
        #[arg(long, default_value = "2", value_parser = parse_seconds)]
        wait: Duration,
        #[arg(long)]
        no_login: bool,
    },
    /// Print every line received for a while
    Monitor {
        #[arg(long, default_value = "10", value_parser = parse_seconds)]
        seconds: Duration,
    },
    /// Run the login handshake
    Login,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

fn load_config(cli: &Cli) -> Result<Config, trace_console::config::ConfigError> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();

    let session = match cli.section {
        Section::Console => &mut config.console,
        Section::Dlt => &mut config.dlt,
    };
    if let Some(port) = &cli.port {
        session.port = port.clone();
        session.enabled = true;
    }
    if let Some(baud) = cli.baud {
        session.baud_rate = baud;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Warning: {e}");
    }

    match run(&cli, config) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "trace-console failed");
            ExitCode::FAILURE
        }
    }
}

fn print(json_output: bool, value: serde_json::Value, text: impl FnOnce() -> String) {
    if json_output {
        println!("{value}");
    } else {
        println!("{}", text());
    }
}

fn run(cli: &Cli, config: Config) -> Result<ExitCode, SessionError> {
    match &cli.command {
        Command::Ports => print_ports(cli.json),
        Command::Session(command) => run_session(cli, command, config),
    }
}

fn print_ports(json_output: bool) -> Result<ExitCode, SessionError> {
    let ports = list_ports()?;
    print(json_output, json!({ "ports": ports }), || {
        ports
            .iter()
            .map(|p| match &p.description {
                Some(description) => format!("{}\t{}", p.name, description),
                None => p.name.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    });
    Ok(ExitCode::SUCCESS)
}

fn run_session(cli: &Cli, command: &SessionCommand, config: Config) -> Result<ExitCode, SessionError> {
    let session_config = match cli.section {
        Section::Console => config.console,
        Section::Dlt => config.dlt,
    };
    if !session_config.enabled {
        error!(section = cli.section.name(), "Session is disabled, pass --port or enable it in the config");
        return Ok(ExitCode::FAILURE);
    }

    let mut session = SerialSession::new(session_config)?;
    session.connect()?;
    info!(section = cli.section.name(), "Session ready");

    let code = match command {
        SessionCommand::Wait {
            pattern,
            cmd,
            timeout,
            no_login,
        } => match session.wait_for_trace(pattern, cmd, *timeout, !no_login)? {
            Some(found) => {
                print(cli.json, json!({ "found": true, "match": found }), || {
                    found.line.clone()
                });
                ExitCode::SUCCESS
            }
            None => {
                print(cli.json, json!({ "found": false }), || {
                    format!("No line matched '{pattern}' within {timeout:?}")
                });
                ExitCode::from(NOT_FOUND)
            }
        },
        SessionCommand::Exec { cmd, wait, no_login } => {
            let lines = session.execute_command(cmd, *wait, !no_login)?;
            print(cli.json, json!({ "lines": lines }), || lines.join("\n"));
            ExitCode::SUCCESS
        }
        SessionCommand::Monitor { seconds } => {
            let guard = session.monitor();
            std::thread::sleep(*seconds);
            let lines = guard.trace_lines();
            drop(guard);
            print(cli.json, json!({ "lines": lines }), || {
                lines
                    .iter()
                    .map(|l| format!("{} {}", l.received_at.format("%H:%M:%S%.3f"), l.text))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            ExitCode::SUCCESS
        }
        SessionCommand::Login => {
            let state = session.login()?;
            print(cli.json, json!({ "state": state }), || format!("{state:?}"));
            if state.is_logged_in() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(NOT_FOUND)
            }
        }
    };

    session.disconnect();
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ports_needs_no_session() {
        let cli = Cli::try_parse_from(["trace-console", "ports"]).unwrap();
        assert!(matches!(cli.command, Command::Ports));
    }

    #[test]
    fn session_subcommands_are_top_level() {
        let cli = Cli::try_parse_from([
            "trace-console",
            "--section",
            "dlt",
            "wait",
            "--pattern",
            "Result:",
            "--timeout",
            "1.5",
        ])
        .unwrap();
        match cli.command {
            Command::Session(SessionCommand::Wait {
                pattern,
                cmd,
                timeout,
                no_login,
            }) => {
                assert_eq!(pattern, "Result:");
                assert!(cmd.is_empty());
                assert_eq!(timeout, Duration::from_millis(1_500));
                assert!(!no_login);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(matches!(cli.section, Section::Dlt));
    }

    #[test]
    fn negative_seconds_rejected() {
        assert!(Cli::try_parse_from(["trace-console", "monitor", "--seconds", "-1"]).is_err());
    }
}
