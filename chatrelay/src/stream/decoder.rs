// Frame decoder
//
// Incremental parser for the relay's event-stream body. Bytes are buffered
// until a `\n` completes a line; only then is the line decoded as UTF-8, so
// a character split across chunks is never decoded in halves. `\n` cannot
// occur inside a multi-byte UTF-8 sequence, which makes splitting on the raw
// byte safe.

use std::borrow::Cow;

use super::types::{DecodeStats, StreamError, StreamEvent};

/// Prefix of a content-bearing line. One space after the colon is part of
/// the prefix; any further whitespace belongs to the payload.
pub const FRAME_PREFIX: &str = "data:";

/// Payload marking the normal end of a response. Compared by equality only.
pub const SENTINEL: &str = "[DONE]";

/// Default bound on the carry-over buffer.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1_048_576; // 1 MiB

/// Turns arbitrarily chunked bytes into [`StreamEvent`]s.
///
/// Once the sentinel has been decoded the decoder is finished: the rest of
/// that chunk and every later chunk are discarded (and counted in
/// [`DecodeStats::trailing_bytes`]).
#[derive(Debug)]
pub struct FrameDecoder {
    /// Bytes after the last line break. Never contains `\n`.
    buffer: Vec<u8>,
    max_line_bytes: usize,
    finished: bool,
    stats: DecodeStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_bytes,
            finished: false,
            stats: DecodeStats::default(),
        }
    }

    /// True once the sentinel was decoded or the decoder failed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Bytes held back waiting for a line break.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Feed the next chunk and return the events completed by it, in order.
    ///
    /// Fails if the unterminated remainder exceeds the line limit; the
    /// decoder is finished afterwards.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, StreamError> {
        if self.finished {
            self.stats.trailing_bytes += chunk.len() as u64;
            return Ok(Vec::new());
        }

        let mut buffer = std::mem::take(&mut self.buffer);
        // The carry-over holds no line break, so only new bytes need scanning.
        let mut cursor = buffer.len();
        buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut line_start = 0;
        while let Some(pos) = buffer[cursor..].iter().position(|b| *b == b'\n') {
            let line_end = cursor + pos;
            if let Some(event) = self.decode_line(&buffer[line_start..line_end]) {
                let done = event.is_done();
                events.push(event);
                if done {
                    self.finished = true;
                    self.stats.trailing_bytes += (buffer.len() - line_end - 1) as u64;
                    return Ok(events);
                }
            }
            line_start = line_end + 1;
            cursor = line_start;
        }

        buffer.drain(..line_start);
        if buffer.len() > self.max_line_bytes {
            self.finished = true;
            return Err(StreamError::LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        self.buffer = buffer;
        Ok(events)
    }

    /// End of input without a sentinel: decode an unterminated final line.
    pub fn flush(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        if self.finished || rest.is_empty() {
            return Vec::new();
        }
        match self.decode_line(&rest) {
            Some(event) => {
                self.finished = event.is_done();
                vec![event]
            }
            None => Vec::new(),
        }
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            self.stats.separators += 1;
            return None;
        }

        let line = match std::str::from_utf8(raw) {
            Ok(text) => Cow::Borrowed(text),
            Err(e) => {
                self.stats.anomalies += 1;
                tracing::debug!(
                    line_len = raw.len(),
                    valid_up_to = e.valid_up_to(),
                    "event-stream line is not valid UTF-8, decoding lossily"
                );
                String::from_utf8_lossy(raw)
            }
        };

        let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
            self.stats.anomalies += 1;
            tracing::debug!(line_len = raw.len(), "discarded non-frame line");
            return None;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        self.stats.frames += 1;
        if payload == SENTINEL {
            Some(StreamEvent::Done)
        } else {
            Some(StreamEvent::Content(payload.to_string()))
        }
    }
}
