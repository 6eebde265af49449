//! Trace-synchronized serial sessions.
//!
//! A [`SerialSession`] owns one serial port. A background reader frames the
//! incoming bytes into lines and hands them to two independent sinks:
//!
//! - the **wait queue**, armed only while [`SerialSession::wait_for_trace`]
//!   (or [`SerialSession::execute_command`]) is running;
//! - the **monitor buffer**, armed between [`SerialSession::enable_monitor`]
//!   and [`SerialSession::disable_monitor`].
//!
//! Lines that arrive while neither sink is armed are discarded, so a wait
//! only ever sees output produced after it started.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use trace_console::config::SessionConfig;
//! use trace_console::port::MockSerialPort;
//! use trace_console::session::SerialSession;
//!
//! let port = MockSerialPort::new("MOCK0");
//! port.respond_to("version", "fw 1.2.3\n");
//!
//! let mut session = SerialSession::new(SessionConfig::for_port("MOCK0"))?;
//! session.connect_with(Box::new(port))?;
//! let found = session
//!     .wait_for_trace(r"fw (\S+)", "version", Duration::from_secs(1), false)?
//!     .expect("version line");
//! assert_eq!(found.group(1), Some("1.2.3"));
//! session.disconnect();
//! # Ok::<(), trace_console::SessionError>(())
//! ```

mod login;
mod reader;
mod trace;

pub use login::LoginState;
pub use trace::{TraceLine, TraceMatch};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::port::{SerialPortAdapter, SyncSerialPort};
use login::LoginPatterns;
use parking_lot::Mutex;
use reader::Reader;
use regex::Regex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Dispatch, Span};
use trace::{TraceSinks, WaitArm};

/// Connection status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    /// The reader stopped after a hard port error.
    Error,
}

/// What a wait sends before it starts polling.
#[derive(Clone, Copy)]
enum Outgoing<'a> {
    Nothing,
    Line(&'a str),
    /// Sent like `Line` but masked in the logs.
    Secret(&'a str),
}

impl<'a> Outgoing<'a> {
    fn command(cmd: &'a str) -> Self {
        if cmd.is_empty() {
            Self::Nothing
        } else {
            Self::Line(cmd)
        }
    }
}

struct ReaderHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Interval at which `disconnect` checks whether the reader has exited.
const JOIN_POLL: Duration = Duration::from_millis(5);

impl ReaderHandle {
    /// Wait up to `timeout` for the thread to exit. `false` if it is still running.
    fn join_within(self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.thread.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(JOIN_POLL);
        }
        if self.thread.join().is_err() {
            error!("Serial reader thread panicked");
        }
        true
    }
}

/// Keeps the session's subscriber and span current for one public call.
struct LogScope {
    _span: tracing::span::EnteredSpan,
    _dispatch: tracing::dispatcher::DefaultGuard,
}

fn session_span(config: &SessionConfig) -> Span {
    tracing::info_span!("serial_session", port = %config.port)
}

/// A serial console session with trace synchronization.
pub struct SerialSession {
    config: SessionConfig,
    patterns: LoginPatterns,
    sinks: Arc<TraceSinks>,
    state: Arc<Mutex<ConnectionState>>,
    writer: Mutex<Option<Box<dyn SerialPortAdapter>>>,
    reader: Option<ReaderHandle>,
    dispatch: Dispatch,
    span: Span,
}

impl SerialSession {
    /// Create a disconnected session.
    ///
    /// Logging goes to the subscriber that is current on the calling thread.
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        let patterns = LoginPatterns::compile(&config.login)?;
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        let span = tracing::dispatcher::with_default(&dispatch, || session_span(&config));

        Ok(Self {
            config,
            patterns,
            sinks: Arc::new(TraceSinks::default()),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            writer: Mutex::new(None),
            reader: None,
            dispatch,
            span,
        })
    }

    /// Log through `dispatch` instead. Takes effect for the next `connect`.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.span = tracing::dispatcher::with_default(&dispatch, || session_span(&self.config));
        self.dispatch = dispatch;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn log_scope(&self) -> LogScope {
        let dispatch = tracing::dispatcher::set_default(&self.dispatch);
        LogScope {
            _span: self.span.clone().entered(),
            _dispatch: dispatch,
        }
    }

    /// Open the configured port and start the reader.
    ///
    /// A disabled session logs a warning and stays disconnected.
    pub fn connect(&mut self) -> SessionResult<()> {
        let _scope = self.log_scope();
        if !self.ready_to_connect() {
            return Ok(());
        }

        info!(baud = self.config.baud_rate, "Opening serial port");
        let port = SyncSerialPort::open(&self.config.port, self.config.port_configuration())
            .map_err(|e| {
                error!(error = %e, "Failed to open serial port");
                e
            })?;
        self.attach(Box::new(port))
    }

    /// Start the session on an already opened port, e.g. a mock.
    pub fn connect_with(&mut self, port: Box<dyn SerialPortAdapter>) -> SessionResult<()> {
        let _scope = self.log_scope();
        if !self.ready_to_connect() {
            return Ok(());
        }
        self.attach(port)
    }

    fn ready_to_connect(&mut self) -> bool {
        if !self.config.enabled {
            warn!("Serial session disabled in configuration, not connecting");
            return false;
        }
        if self.reader.is_some() {
            if self.state() != ConnectionState::Error {
                warn!("Serial session already connected");
                return false;
            }
            info!("Reconnecting after reader failure");
            self.disconnect();
        }
        true
    }

    fn attach(&mut self, mut port: Box<dyn SerialPortAdapter>) -> SessionResult<()> {
        port.set_timeout(self.config.read_timeout())?;
        let reader_port = port.try_clone_adapter()?;

        let running = Arc::new(AtomicBool::new(true));
        let reader = Reader {
            port: reader_port,
            framer: self.config.framing.framer(),
            sinks: Arc::clone(&self.sinks),
            state: Arc::clone(&self.state),
            running: Arc::clone(&running),
            dispatch: self.dispatch.clone(),
            span: self.span.clone(),
        };

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let thread = thread::Builder::new()
            .name(format!("serial-reader-{}", port.name()))
            .spawn(move || reader.run(ready_tx))
            .map_err(SessionError::Spawn)?;

        let ready_timeout = self.config.ready_timeout();
        if ready_rx.recv_timeout(ready_timeout).is_err() {
            running.store(false, Ordering::Release);
            error!(timeout = ?ready_timeout, "Serial reader failed to start");
            return Err(SessionError::ReaderStartup(ready_timeout));
        }

        *self.writer.lock() = Some(port);
        *self.state.lock() = ConnectionState::Connected;
        self.reader = Some(ReaderHandle {
            running,
            thread,
        });
        info!("Serial connection established");
        Ok(())
    }

    /// Stop the reader and release the port. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        let _scope = self.log_scope();

        reader.running.store(false, Ordering::Release);
        self.sinks.disarm_wait();
        self.sinks.disable_monitor();

        let join_timeout = self.config.join_timeout();
        if !reader.join_within(join_timeout) {
            warn!(timeout = ?join_timeout, "Serial reader did not stop in time, detaching it");
        }

        self.writer.lock().take();
        *self.state.lock() = ConnectionState::Disconnected;
        info!("Serial connection closed");
    }

    fn ensure_ready(&self) -> SessionResult<()> {
        if !self.config.enabled {
            warn!("Serial session disabled in configuration");
            return Err(SessionError::Disabled);
        }
        if self.reader.is_none() {
            return Err(SessionError::NotConnected);
        }
        if self.state() == ConnectionState::Error {
            return Err(SessionError::ReaderStopped);
        }
        Ok(())
    }

    /// Write `cmd` followed by a single newline.
    ///
    /// Trailing whitespace is removed first, so `"\n"` sends a bare newline.
    pub fn send_command(&self, cmd: &str) -> SessionResult<()> {
        let _scope = self.log_scope();
        self.ensure_ready()?;
        self.send(Outgoing::Line(cmd))
    }

    fn send(&self, outgoing: Outgoing<'_>) -> SessionResult<()> {
        let (cmd, secret) = match outgoing {
            Outgoing::Nothing => return Ok(()),
            Outgoing::Line(cmd) => (cmd, false),
            Outgoing::Secret(cmd) => (cmd, true),
        };

        let mut writer = self.writer.lock();
        let port = writer.as_mut().ok_or(SessionError::NotConnected)?;

        let cmd = cmd.trim_end();
        let mut frame = Vec::with_capacity(cmd.len() + 1);
        frame.extend_from_slice(cmd.as_bytes());
        frame.push(b'\n');

        port.write_bytes(&frame)?;
        port.flush()?;
        port.clear_input()?;

        if secret {
            info!(stream = "Tx", "********");
        } else {
            info!(stream = "Tx", "{}", cmd);
        }
        Ok(())
    }

    /// Send `cmd` and wait for a line containing a match for `pattern`.
    ///
    /// An empty `cmd` sends nothing and only observes. Returns `Ok(None)` when
    /// nothing matched within `timeout`.
    pub fn wait_for_trace(
        &self,
        pattern: &str,
        cmd: &str,
        timeout: Duration,
        require_login: bool,
    ) -> SessionResult<Option<TraceMatch>> {
        let regex = Regex::new(pattern).map_err(|e| SessionError::invalid_pattern(pattern, e))?;
        self.wait_for_regex(&regex, cmd, timeout, require_login)
    }

    /// [`wait_for_trace`](Self::wait_for_trace) with a precompiled pattern.
    pub fn wait_for_regex(
        &self,
        regex: &Regex,
        cmd: &str,
        timeout: Duration,
        require_login: bool,
    ) -> SessionResult<Option<TraceMatch>> {
        let _scope = self.log_scope();
        self.ensure_ready()?;
        if require_login {
            self.run_login()?;
        }
        self.wait_inner(regex, Outgoing::command(cmd), timeout)
    }

    fn wait_inner(
        &self,
        regex: &Regex,
        outgoing: Outgoing<'_>,
        timeout: Duration,
    ) -> SessionResult<Option<TraceMatch>> {
        let _armed = WaitArm::arm(&self.sinks);
        let started = Instant::now();
        self.send(outgoing)?;

        loop {
            for entry in self.sinks.drain_wait() {
                if let Some(captures) = regex.captures(&entry.text) {
                    let found = TraceMatch::from_captures(&entry, &captures, started);
                    info!(
                        outcome = "success",
                        pattern = %regex,
                        elapsed_ms = found.elapsed.as_millis() as u64,
                        "Found trace pattern"
                    );
                    return Ok(Some(found));
                }
            }

            if started.elapsed() >= timeout {
                warn!(pattern = %regex, timeout = ?timeout, "Max timeout reached, trace pattern not found");
                return Ok(None);
            }
            if self.state() == ConnectionState::Error {
                return Err(SessionError::ReaderStopped);
            }
            thread::sleep(self.config.poll_interval());
        }
    }

    /// Send `cmd`, collect every line received during `wait`, and return them.
    pub fn execute_command(
        &self,
        cmd: &str,
        wait: Duration,
        require_login: bool,
    ) -> SessionResult<Vec<String>> {
        let _scope = self.log_scope();
        self.ensure_ready()?;
        if require_login {
            self.run_login()?;
        }

        let _armed = WaitArm::arm(&self.sinks);
        self.send(Outgoing::command(cmd))?;
        thread::sleep(wait);

        let lines: Vec<String> = self.sinks.drain_wait().into_iter().map(|l| l.text).collect();
        debug!(lines = lines.len(), "Collected command output");
        Ok(lines)
    }

    /// Start collecting every received line, discarding earlier contents.
    pub fn enable_monitor(&self) {
        let _scope = self.log_scope();
        if !self.config.enabled {
            warn!("Serial session disabled in configuration, monitor not enabled");
            return;
        }
        self.sinks.enable_monitor();
        debug!("Trace monitor enabled");
    }

    /// Stop collecting. Collected lines stay available.
    pub fn disable_monitor(&self) {
        let _scope = self.log_scope();
        self.sinks.disable_monitor();
        debug!("Trace monitor disabled");
    }

    pub fn is_monitoring(&self) -> bool {
        self.sinks.monitor_enabled()
    }

    /// Copy of the monitored lines in arrival order.
    pub fn get_trace_container(&self) -> Vec<String> {
        self.get_trace_lines()
            .into_iter()
            .map(|line| line.text)
            .collect()
    }

    /// Like [`get_trace_container`](Self::get_trace_container) with timestamps.
    pub fn get_trace_lines(&self) -> Vec<TraceLine> {
        match self.sinks.monitor_snapshot() {
            Some(lines) => lines,
            None => {
                let _scope = self.log_scope();
                warn!("Trace monitor was never enabled, nothing collected");
                Vec::new()
            }
        }
    }

    /// Monitor until the returned guard is dropped.
    pub fn monitor(&self) -> MonitorGuard<'_> {
        self.enable_monitor();
        MonitorGuard { session: self }
    }
}

impl std::fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSession")
            .field("port", &self.config.port)
            .field("enabled", &self.config.enabled)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Scoped monitoring; see [`SerialSession::monitor`].
pub struct MonitorGuard<'a> {
    session: &'a SerialSession,
}

impl MonitorGuard<'_> {
    /// Lines collected so far.
    pub fn lines(&self) -> Vec<String> {
        self.session.get_trace_container()
    }

    pub fn trace_lines(&self) -> Vec<TraceLine> {
        self.session.get_trace_lines()
    }
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        self.session.disable_monitor();
    }
}
