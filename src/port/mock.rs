//! Mock serial port implementation for testing.
//!
//! `MockSerialPort` simulates a device console without hardware: reads block
//! up to the configured timeout like a real port, bytes can be queued
//! immediately or after a delay, and scripted responders emit a reply whenever
//! a matching command is written.

use super::error::PortError;
use super::traits::SerialPortAdapter;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency applied to responder replies unless one is given explicitly.
const DEFAULT_REPLY_LATENCY: Duration = Duration::from_millis(10);

/// A reply emitted whenever a write matches `trigger`.
#[derive(Debug, Clone)]
struct Responder {
    trigger: Vec<u8>,
    reply: Vec<u8>,
    delay: Duration,
}

/// Inner state of the mock port.
#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes that have "arrived" and are waiting to be read.
    read_queue: VecDeque<u8>,
    /// Bytes still in flight from the device, with their arrival time.
    scheduled: Vec<(Instant, Vec<u8>)>,
    responders: Vec<Responder>,
    /// Log of all bytes written to the port, one entry per write call.
    write_log: Vec<Vec<u8>>,
    timeout: Duration,
    /// Error returned by the next read, if set.
    read_failure: Option<std::io::ErrorKind>,
    fail_writes: bool,
    buffers_cleared: bool,
}

impl MockPortState {
    /// Move every scheduled chunk whose arrival time has passed into the read queue.
    fn release_due(&mut self, now: Instant) {
        let mut index = 0;
        while index < self.scheduled.len() {
            if self.scheduled[index].0 <= now {
                let (_, bytes) = self.scheduled.remove(index);
                self.read_queue.extend(bytes);
            } else {
                index += 1;
            }
        }
    }

    fn next_arrival(&self) -> Option<Instant> {
        self.scheduled.iter().map(|(at, _)| *at).min()
    }

    fn schedule(&mut self, at: Instant, bytes: Vec<u8>) {
        // Keep insertion order for equal arrival times so replies stay ordered.
        let position = self
            .scheduled
            .iter()
            .position(|(existing, _)| *existing > at)
            .unwrap_or(self.scheduled.len());
        self.scheduled.insert(position, (at, bytes));
    }
}

/// Mock serial port implementation for testing.
///
/// Clones share the same state, so a test can keep one handle while the
/// session owns another.
///
/// # Example
/// ```
/// use trace_console::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.respond_to("uname", "Linux headunit\n");
///
/// port.write_bytes(b"uname\n").unwrap();
/// let mut buffer = [0u8; 64];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Linux headunit\n");
/// assert_eq!(port.written_lines(), vec!["uname".to_string()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    shared: Arc<(Mutex<MockPortState>, Condvar)>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new((
                Mutex::new(MockPortState {
                    timeout: Duration::from_millis(50),
                    ..Default::default()
                }),
                Condvar::new(),
            )),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockPortState) -> R) -> R {
        let (lock, cvar) = &*self.shared;
        let mut state = lock.lock();
        let result = f(&mut state);
        cvar.notify_all();
        result
    }

    /// Make bytes available to the next read immediately.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.with_state(|state| state.read_queue.extend(data));
    }

    /// Make bytes available to reads once `delay` has elapsed.
    pub fn enqueue_read_after(&self, data: &[u8], delay: Duration) {
        let at = Instant::now() + delay;
        self.with_state(|state| state.schedule(at, data.to_vec()));
    }

    /// Emit `reply` shortly after every write whose trimmed content equals `trigger`.
    ///
    /// An empty trigger matches a bare newline.
    pub fn respond_to(&self, trigger: impl AsRef<[u8]>, reply: impl AsRef<[u8]>) {
        self.respond_after(trigger, reply, DEFAULT_REPLY_LATENCY);
    }

    /// Like [`respond_to`](Self::respond_to) with an explicit reply delay.
    pub fn respond_after(
        &self,
        trigger: impl AsRef<[u8]>,
        reply: impl AsRef<[u8]>,
        delay: Duration,
    ) {
        let responder = Responder {
            trigger: trim_ascii_end(trigger.as_ref()).to_vec(),
            reply: reply.as_ref().to_vec(),
            delay,
        };
        self.with_state(|state| state.responders.push(responder));
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.with_state(|state| state.write_log.clone())
    }

    /// Every write as text with the line terminator removed.
    pub fn written_lines(&self) -> Vec<String> {
        self.with_state(|state| {
            state
                .write_log
                .iter()
                .map(|w| String::from_utf8_lossy(trim_ascii_end(w)).into_owned())
                .collect()
        })
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.with_state(|state| state.write_log.clear());
    }

    /// Make the next read fail with a hard I/O error of the given kind.
    pub fn fail_next_read(&self, kind: std::io::ErrorKind) {
        self.with_state(|state| state.read_failure = Some(kind));
    }

    /// Make every write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.with_state(|state| state.fail_writes = fail);
    }

    /// Whether the input buffer has been cleared at least once.
    pub fn was_cleared(&self) -> bool {
        self.with_state(|state| state.buffers_cleared)
    }

    /// Get the number of bytes that have arrived but not been read.
    pub fn available_bytes(&self) -> usize {
        self.with_state(|state| {
            state.release_due(Instant::now());
            state.read_queue.len()
        })
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let now = Instant::now();
        self.with_state(|state| {
            if state.fail_writes {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock write failure",
                )));
            }

            state.write_log.push(data.to_vec());

            let written = trim_ascii_end(data);
            let replies: Vec<(Duration, Vec<u8>)> = state
                .responders
                .iter()
                .filter(|r| r.trigger == written)
                .map(|r| (r.delay, r.reply.clone()))
                .collect();
            for (delay, reply) in replies {
                state.schedule(now + delay, reply);
            }

            Ok(data.len())
        })
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let (lock, cvar) = &*self.shared;
        let mut state = lock.lock();
        let deadline = Instant::now() + state.timeout;

        loop {
            if let Some(kind) = state.read_failure.take() {
                return Err(PortError::Io(std::io::Error::new(kind, "mock read failure")));
            }

            state.release_due(Instant::now());
            if !state.read_queue.is_empty() {
                let mut bytes_read = 0;
                for byte in buffer.iter_mut() {
                    match state.read_queue.pop_front() {
                        Some(queued) => {
                            *byte = queued;
                            bytes_read += 1;
                        }
                        None => break,
                    }
                }
                return Ok(bytes_read);
            }

            if Instant::now() >= deadline {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "Operation timed out",
                )));
            }

            let wake = state
                .next_arrival()
                .map_or(deadline, |arrival| arrival.min(deadline));
            cvar.wait_until(&mut state, wake);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.with_state(|state| state.timeout = timeout);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), PortError> {
        // Only bytes that already arrived are discarded; scheduled output is
        // still "on the wire".
        self.with_state(|state| {
            state.read_queue.clear();
            state.buffers_cleared = true;
        });
        Ok(())
    }

    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(self.clone()))
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

fn trim_ascii_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}
