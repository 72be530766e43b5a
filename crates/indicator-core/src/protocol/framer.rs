//! Line framing
//!
//! Reassembles the raw byte stream from the link into newline-terminated lines.
//!
//! Bytes are buffered until a `\n` arrives and only then decoded, so a
//! multi-byte character split across two reads is still decoded correctly.
//! Invalid UTF-8 is replaced with U+FFFD rather than rejected. A single `\r`
//! before the newline is dropped so CRLF and LF devices frame identically.
//!
//! A line longer than the framer's limit is discarded up to its newline, so a
//! device streaming without line breaks cannot grow the buffer without bound.

use tracing::warn;

use super::DEFAULT_MAX_LINE_LEN;

/// Incremental newline splitter
#[derive(Debug)]
pub struct LineFramer {
    /// Bytes received but not yet returned as lines
    buf: Vec<u8>,
    /// Start of the unconsumed region of `buf`
    start: usize,
    /// Bytes before this offset are known to hold no newline
    scanned: usize,
    /// Longest line kept, excluding the terminator
    max_line_len: usize,
    /// Dropping the rest of an oversized line
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    /// Create an empty framer with the default line limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty framer that discards lines longer than `max_line_len`
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            start: 0,
            scanned: 0,
            max_line_len,
            discarding: false,
        }
    }

    /// Append a chunk and iterate over the lines it completes.
    ///
    /// The iterator is lazy. Lines it does not yield before being dropped stay
    /// buffered and are returned by the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.buf.extend_from_slice(chunk);
        Lines { framer: self }
    }

    /// Take the unterminated trailing fragment, if any
    pub fn finish(&mut self) -> Option<String> {
        self.compact();
        let discarding = std::mem::take(&mut self.discarding);
        self.scanned = 0;
        if self.buf.is_empty() || discarding {
            self.buf.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }

    /// Drop all buffered bytes, e.g. when a new link is opened
    pub fn reset(&mut self) {
        self.buf.clear();
        self.start = 0;
        self.scanned = 0;
        self.discarding = false;
    }

    /// Number of buffered bytes not yet returned as lines
    pub fn pending_len(&self) -> usize {
        self.buf.len() - self.start
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            let from = self.scanned.max(self.start);
            let Some(offset) = self.buf[from..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buf.len();
                self.limit_pending();
                return None;
            };

            let end = from + offset;
            let raw = &self.buf[self.start..end];
            let len = raw.strip_suffix(b"\r").map_or(raw.len(), <[u8]>::len);
            let keep = !std::mem::take(&mut self.discarding) && len <= self.max_line_len;
            let line = keep.then(|| decode_line(&self.buf[self.start..end]));
            if !keep && len > self.max_line_len {
                warn!(len, max = self.max_line_len, "discarding oversized line");
            }
            self.start = end + 1;
            self.scanned = self.start;

            if line.is_some() {
                return line;
            }
        }
    }

    /// Drop an unterminated tail once it is over the limit
    fn limit_pending(&mut self) {
        let pending = self.buf.len() - self.start;
        // One byte of slack for the `\r` that may precede the newline
        let limit = self.max_line_len.saturating_add(1);
        if pending == 0 || (!self.discarding && pending <= limit) {
            return;
        }
        if !self.discarding {
            warn!(
                pending,
                max = self.max_line_len,
                "line exceeds limit, discarding until next newline"
            );
            self.discarding = true;
        }
        self.buf.truncate(self.start);
        self.scanned = self.start;
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.scanned = self.scanned.saturating_sub(self.start);
            self.start = 0;
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Lines completed by one [`LineFramer::feed`] call
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.framer.next_line()
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        self.framer.compact();
    }
}
