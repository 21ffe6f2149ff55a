// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Event-stream frame decoding
//
// Responsibilities:
// - Reassemble lines from chunks with arbitrary boundaries
// - Decode text only over complete lines (multi-byte characters may be split)
// - Emit content deltas for `data:` frames and a distinct terminal event for
//   the `[DONE]` sentinel
// - Count discarded lines instead of dropping them silently
// - Memory-bounded: 1 MiB max carry-over by default

mod decoder;
mod types;

pub use decoder::{FrameDecoder, DEFAULT_MAX_LINE_BYTES, FRAME_PREFIX, SENTINEL};
pub use types::{DecodeStats, StreamError, StreamEvent};

#[cfg(test)]
mod tests;
