//! Shared test utilities for session tests.
//!
//! This module provides:
//! - Session configs with short timeouts
//! - Connected sessions backed by a scriptable mock port
//! - A log capture that can be injected as a session's dispatcher

#![allow(dead_code)]

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use trace_console::config::SessionConfig;
use trace_console::port::MockSerialPort;
use trace_console::session::SerialSession;
use tracing_subscriber::fmt::MakeWriter;

/// Session config tuned for tests: short read timeout and login timeouts.
pub fn fast_config(port_name: &str) -> SessionConfig {
    let mut config = SessionConfig::for_port(port_name);
    config.username = "root".to_string();
    config.password = "toor".to_string();
    config.read_timeout_ms = 20;
    config.join_timeout_ms = 1_000;
    config.ready_timeout_ms = 2_000;
    config.login.lock_check_timeout_ms = 500;
    config.login.prompt_timeout_ms = 500;
    config
}

/// Connect a session with `config` to a fresh mock port.
///
/// The returned mock shares state with the one the session owns.
pub fn connect_mock(config: SessionConfig) -> (SerialSession, MockSerialPort) {
    let port = MockSerialPort::new(config.port.clone());
    let mut session = SerialSession::new(config).expect("valid test config");
    session
        .connect_with(Box::new(port.clone()))
        .expect("mock connect");
    (session, port)
}

/// Like [`connect_mock`], logging into `capture`.
pub fn connect_mock_captured(
    config: SessionConfig,
    capture: &LogCapture,
) -> (SerialSession, MockSerialPort) {
    let port = MockSerialPort::new(config.port.clone());
    let mut session = SerialSession::new(config)
        .expect("valid test config")
        .with_dispatch(capture.dispatch());
    session
        .connect_with(Box::new(port.clone()))
        .expect("mock connect");
    (session, port)
}

/// Poll `condition` every 5 ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// In-memory log sink usable as a `tracing` writer.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher that writes every event, TRACE and up, into this capture.
    pub fn dispatch(&self) -> tracing::Dispatch {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::Dispatch::new(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Captured lines logged at `level` (e.g. "ERROR").
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        let marker = format!(" {level} ");
        self.contents()
            .lines()
            .filter(|line| line.contains(&marker))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
