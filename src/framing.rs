//! Splitting the raw serial byte stream into trace lines.
//!
//! A console speaks newline-terminated text. The DLT trace port instead
//! emits binary records separated by the `DLS` storage marker, from which only
//! a few fixed fields are kept as text.

use serde::{Deserialize, Serialize};

/// Pending bytes beyond this size are emitted as a line even without a terminator.
const MAX_PENDING: usize = 64 * 1024;

/// Storage header marker that separates DLT records on the serial line.
const DLT_MARKER: &[u8] = b"DLS";

/// DLT records whose extracted text is shorter than this carry no payload.
const DLT_MIN_TEXT_LEN: usize = 15;

/// Turns chunks of received bytes into trimmed, non-empty text lines.
pub trait LineFramer: Send + std::fmt::Debug {
    /// Feed freshly read bytes and collect every record they complete.
    fn push(&mut self, bytes: &[u8]) -> Vec<String>;

    /// The port went quiet: hand out whatever partial record is buffered.
    fn flush_idle(&mut self) -> Option<String>;
}

/// Which framer a session uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Newline-terminated console text.
    #[default]
    Newline,
    /// `DLS`-delimited DLT records.
    Dlt,
}

impl Framing {
    /// Build a fresh framer of this kind.
    pub fn framer(self) -> Box<dyn LineFramer> {
        match self {
            Framing::Newline => Box::new(NewlineFramer::default()),
            Framing::Dlt => Box::new(DltFramer::default()),
        }
    }
}

/// Decode bytes as UTF-8, silently dropping invalid sequences.
pub fn decode_ignoring_invalid(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

fn finish_line(bytes: &[u8]) -> Option<String> {
    let text = decode_ignoring_invalid(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Newline-terminated text framing.
#[derive(Debug, Default)]
pub struct NewlineFramer {
    pending: Vec<u8>,
}

impl LineFramer for NewlineFramer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = memchr::memchr(b'\n', &self.pending[start..]) {
            let end = start + offset;
            if let Some(line) = finish_line(&self.pending[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() > MAX_PENDING {
            if let Some(line) = self.flush_idle() {
                lines.push(line);
            }
        }
        lines
    }

    fn flush_idle(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = finish_line(&self.pending);
        self.pending.clear();
        line
    }
}

/// `DLS`-delimited DLT framing.
///
/// Each record is reduced to its ECU id, application id, context id and
/// payload, joined by single spaces.
#[derive(Debug, Default)]
pub struct DltFramer {
    pending: Vec<u8>,
}

impl DltFramer {
    fn field(record: &[u8], start: usize, end: usize) -> &[u8] {
        let end = end.min(record.len());
        if start >= end {
            &[]
        } else {
            &record[start..end]
        }
    }

    /// Extract the printable fields of one record (marker included at its end).
    fn extract(record: &[u8]) -> Option<String> {
        let payload_end = record.len().saturating_sub(DLT_MARKER.len());
        let mut joined = Vec::with_capacity(record.len());
        joined.extend_from_slice(Self::field(record, 5, 8));
        joined.push(b' ');
        joined.extend_from_slice(Self::field(record, 19, 23));
        joined.push(b' ');
        joined.extend_from_slice(Self::field(record, 23, 27));
        joined.push(b' ');
        joined.extend_from_slice(Self::field(record, 33, payload_end));

        let text = decode_ignoring_invalid(&joined);
        if text.chars().count() < DLT_MIN_TEXT_LEN {
            return None;
        }
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

impl LineFramer for DltFramer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = memchr::memmem::find(&self.pending[start..], DLT_MARKER) {
            let end = start + offset + DLT_MARKER.len();
            if let Some(line) = Self::extract(&self.pending[start..end]) {
                lines.push(line);
            }
            start = end;
        }
        self.pending.drain(..start);

        if self.pending.len() > MAX_PENDING {
            if let Some(line) = self.flush_idle() {
                lines.push(line);
            }
        }
        lines
    }

    fn flush_idle(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = Self::extract(&self.pending);
        self.pending.clear();
        line
    }
}
