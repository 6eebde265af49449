//! Trace lines and the two sinks the reader fans them out to.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One non-empty line received from the port.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceLine {
    /// Wall-clock capture time.
    pub received_at: DateTime<Utc>,
    /// Monotonic capture time, for elapsed-time measurements.
    #[serde(skip)]
    pub captured: Instant,
    pub text: String,
}

impl TraceLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            received_at: Utc::now(),
            captured: Instant::now(),
            text: text.into(),
        }
    }
}

/// A successful `wait_for_trace`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceMatch {
    /// The whole line the pattern was found in.
    pub line: String,
    /// Capture groups in order; `None` for a group that did not take part.
    pub groups: Vec<Option<String>>,
    pub received_at: DateTime<Utc>,
    /// Time from sending the command to receiving the matching line.
    pub elapsed: Duration,
}

impl TraceMatch {
    pub(crate) fn from_captures(entry: &TraceLine, captures: &regex::Captures<'_>, started: Instant) -> Self {
        Self {
            line: entry.text.clone(),
            groups: captures
                .iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
            received_at: entry.received_at,
            elapsed: entry.captured.saturating_duration_since(started),
        }
    }

    /// Text of capture group `index` (1-based, as in the pattern).
    pub fn group(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.groups.get(i))
            .and_then(|g| g.as_deref())
    }
}

#[derive(Debug, Default)]
struct WaitQueue {
    armed: bool,
    lines: VecDeque<TraceLine>,
}

#[derive(Debug, Default)]
struct MonitorBuffer {
    armed: bool,
    ever_enabled: bool,
    lines: Vec<TraceLine>,
}

/// The wait queue and monitor buffer shared between reader and callers.
///
/// Each sink keeps its armed flag under the same lock as its lines, so a
/// disarm-and-clear can never be followed by a late push from the reader.
#[derive(Debug, Default)]
pub(crate) struct TraceSinks {
    wait: Mutex<WaitQueue>,
    monitor: Mutex<MonitorBuffer>,
}

impl TraceSinks {
    /// Fan a received line out to every armed sink. Returns false if nobody took it.
    pub(crate) fn publish(&self, entry: TraceLine) -> bool {
        let mut taken = false;
        {
            let mut monitor = self.monitor.lock();
            if monitor.armed {
                monitor.lines.push(entry.clone());
                taken = true;
            }
        }
        let mut wait = self.wait.lock();
        if wait.armed {
            wait.lines.push_back(entry);
            taken = true;
        }
        taken
    }

    pub(crate) fn arm_wait(&self) {
        let mut wait = self.wait.lock();
        wait.lines.clear();
        wait.armed = true;
    }

    pub(crate) fn disarm_wait(&self) {
        let mut wait = self.wait.lock();
        wait.armed = false;
        wait.lines.clear();
    }

    pub(crate) fn drain_wait(&self) -> Vec<TraceLine> {
        self.wait.lock().lines.drain(..).collect()
    }

    pub(crate) fn wait_len(&self) -> usize {
        self.wait.lock().lines.len()
    }

    pub(crate) fn enable_monitor(&self) {
        let mut monitor = self.monitor.lock();
        monitor.lines.clear();
        monitor.armed = true;
        monitor.ever_enabled = true;
    }

    pub(crate) fn disable_monitor(&self) {
        self.monitor.lock().armed = false;
    }

    pub(crate) fn monitor_enabled(&self) -> bool {
        self.monitor.lock().armed
    }

    /// Copy of the monitor buffer, or `None` if monitoring was never enabled.
    pub(crate) fn monitor_snapshot(&self) -> Option<Vec<TraceLine>> {
        let monitor = self.monitor.lock();
        monitor.ever_enabled.then(|| monitor.lines.clone())
    }
}

/// Disarms and clears the wait queue when dropped.
pub(crate) struct WaitArm<'a> {
    sinks: &'a TraceSinks,
}

impl<'a> WaitArm<'a> {
    pub(crate) fn arm(sinks: &'a TraceSinks) -> Self {
        sinks.arm_wait();
        Self { sinks }
    }
}

impl Drop for WaitArm<'_> {
    fn drop(&mut self) {
        self.sinks.disarm_wait();
    }
}
