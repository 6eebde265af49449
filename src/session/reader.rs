//! Background reader loop.
//!
//! One thread per connected session pulls bytes from its own handle on the
//! port, frames them into lines and fans each line out to the armed sinks.

use super::trace::{TraceLine, TraceSinks};
use super::ConnectionState;
use crate::framing::LineFramer;
use crate::port::SerialPortAdapter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use tracing::{debug, error, trace};

const READ_CHUNK: usize = 1024;

/// Everything the reader thread owns.
pub(crate) struct Reader {
    pub(crate) port: Box<dyn SerialPortAdapter>,
    pub(crate) framer: Box<dyn LineFramer>,
    pub(crate) sinks: Arc<TraceSinks>,
    pub(crate) state: Arc<Mutex<ConnectionState>>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) dispatch: tracing::Dispatch,
    pub(crate) span: tracing::Span,
}

impl Reader {
    /// Thread entry point. Reports on `ready` once reading starts.
    pub(crate) fn run(mut self, ready: SyncSender<()>) {
        let dispatch = self.dispatch.clone();
        let span = self.span.clone();
        tracing::dispatcher::with_default(&dispatch, || {
            span.in_scope(|| self.read_loop(ready));
        });
    }

    fn read_loop(&mut self, ready: SyncSender<()>) {
        debug!(port = %self.port.name(), "Serial reader started");
        let _ = ready.send(());

        let mut buffer = [0u8; READ_CHUNK];
        while self.running.load(Ordering::Acquire) {
            match self.port.read_bytes(&mut buffer) {
                Ok(0) => self.flush_idle(),
                Ok(n) => {
                    for line in self.framer.push(&buffer[..n]) {
                        self.publish(line);
                    }
                }
                Err(e) if e.is_timeout() => self.flush_idle(),
                Err(e) => {
                    error!(error = %e, "Serial read failed, stopping reader");
                    *self.state.lock() = ConnectionState::Error;
                    return;
                }
            }
        }

        debug!("Serial reader stopped");
    }

    /// A quiet line means a pending prompt is complete.
    fn flush_idle(&mut self) {
        if let Some(line) = self.framer.flush_idle() {
            self.publish(line);
        }
    }

    fn publish(&self, line: String) {
        debug!(stream = "Rx", "{}", line);
        if !self.sinks.publish(TraceLine::new(line)) {
            trace!("No sink armed, line discarded");
        }
    }
}
