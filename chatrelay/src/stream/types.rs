// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// ---------------------------------------------------------------------------
// Decoded events
// ---------------------------------------------------------------------------

/// One decoded unit of the response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Raw text to append verbatim to the in-flight assistant turn.
    Content(String),
    /// The sentinel frame: normal end of the response.
    Done,
}

impl StreamEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }

    pub fn as_content(&self) -> Option<&str> {
        match self {
            StreamEvent::Content(text) => Some(text),
            StreamEvent::Done => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// What a decoder has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// `data:` frames decoded (sentinel included).
    pub frames: u64,
    /// Blank separator lines.
    pub separators: u64,
    /// Lines that were not frames or separators and were discarded, plus
    /// complete lines that were not valid UTF-8.
    pub anomalies: u64,
    /// Bytes discarded because they arrived after the sentinel.
    pub trailing_bytes: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A line grew past the carry-over limit without a line terminator.
    #[error("event-stream line exceeded {limit} bytes without a line break")]
    LineTooLong { limit: usize },
}
