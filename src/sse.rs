//! Line framing shared by the provider readers and the stream consumer.
//!
//! Network reads do not respect line boundaries, so bytes are held back until
//! a full `\n`-terminated line is available. Lines are only decoded as UTF-8
//! once complete, which also keeps multi-byte characters split across reads
//! intact.

use crate::models::stream::StreamEvent;
use log::debug;

/// Longest line kept before it is dropped unread.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no `\n`.
    scanned: usize,
    /// Set after an oversized line was dropped, until its `\n` arrives.
    discarding: bool,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            discarding: false,
            max_line,
        }
    }

    /// Appends a chunk and returns every line it completed, without the
    /// trailing `\n` / `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            if self.discarding {
                self.discarding = false;
            } else {
                lines.push(decode_line(&self.pending[start..end]));
            }
            start = end + 1;
            from = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();

        if self.pending.len() > self.max_line {
            debug!("Dropping a line longer than {} bytes", self.max_line);
            self.pending.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        lines
    }

    /// Flushes whatever is left once the input is exhausted.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) || self.pending.is_empty() {
            self.pending.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Value of an SSE `data:` line, with the single optional space after the
/// colon removed. Any other line yields `None`.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Incremental decoder for relay responses.
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: LineBuffer,
    skipped: usize,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let lines = self.lines.push(chunk);
        lines
            .iter()
            .filter_map(|line| self.decode(line))
            .collect()
    }

    pub fn finish(&mut self) -> Vec<StreamEvent> {
        match self.lines.finish() {
            Some(line) => self.decode(&line).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Number of `data:` lines that could not be decoded so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode(&mut self, line: &str) -> Option<StreamEvent> {
        let data = data_payload(line)?;
        match StreamEvent::from_data(data) {
            Some(event) => Some(event),
            None => {
                debug!("Skipping undecodable stream line: {}", line);
                self.skipped += 1;
                None
            }
        }
    }
}
