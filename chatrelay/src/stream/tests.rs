// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Frame decoder tests
//
// Tests cover:
//  1. Frames decode to content events followed by the terminal event
//  2. Chunk-boundary invariance (every split point, byte-at-a-time, arbitrary)
//  3. Multi-byte characters split at every byte offset
//  4. Sentinel stops accumulation in the same and later chunks
//  5. Non-frame lines discarded and counted
//  6. Prefix and line-ending variants
//  7. flush() at end of input without sentinel
//  8. Carry-over bound

use super::*;
use bytes::Bytes;
use proptest::prelude::*;
use proptest::sample::Index;
use tokio_stream::StreamExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a body the way the backend writes it: each payload as a `data:`
/// line followed by a blank line, then the sentinel frame.
fn body(payloads: &[&str]) -> Vec<u8> {
    let mut out = String::new();
    for p in payloads {
        out.push_str(&format!("data: {p}\n\n"));
    }
    out.push_str("data: [DONE]\n\n");
    out.into_bytes()
}

/// Feed `chunks` in order, then flush. Returns accumulated content and
/// whether the terminal event was seen.
fn decode_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> (String, bool) {
    let mut decoder = FrameDecoder::new();
    let mut content = String::new();
    let mut done = false;
    let mut apply = |events: Vec<StreamEvent>| {
        for event in events {
            match event {
                StreamEvent::Content(text) => {
                    assert!(!done, "content after terminal event");
                    content.push_str(&text);
                }
                StreamEvent::Done => done = true,
            }
        }
    };
    for chunk in chunks {
        apply(decoder.feed(chunk).expect("feed should succeed"));
    }
    apply(decoder.flush());
    (content, done)
}

/// Split `data` at the given sorted offsets.
fn split_at_offsets<'a>(data: &'a [u8], offsets: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &offset in offsets {
        chunks.push(&data[start..offset]);
        start = offset;
    }
    chunks.push(&data[start..]);
    chunks
}

/// Payload text for a single frame: anything but line breaks and the sentinel.
fn payload_strategy() -> impl Strategy<Value = String> {
    "[^\r\n]{0,12}".prop_filter("sentinel ends the stream", |p| p != SENTINEL)
}

/// Payloads plus a set of sorted byte offsets to split the encoded body at.
fn split_body_strategy() -> impl Strategy<Value = (Vec<String>, Vec<usize>)> {
    prop::collection::vec(payload_strategy(), 0..8).prop_flat_map(|payloads| {
        let refs: Vec<&str> = payloads.iter().map(String::as_str).collect();
        let len = body(&refs).len();
        prop::collection::vec(any::<Index>(), 0..12).prop_map(move |picks| {
            let mut offsets: Vec<usize> = picks.iter().map(|i| i.index(len + 1)).collect();
            offsets.sort_unstable();
            (payloads.clone(), offsets)
        })
    })
}

// ---------------------------------------------------------------------------
// Test 1: basic decoding
// ---------------------------------------------------------------------------

#[test]
fn frames_decode_in_order_then_done() {
    let mut decoder = FrameDecoder::new();
    let events = decoder.feed(&body(&["Hi", "there"])).unwrap();

    assert_eq!(
        events,
        vec![
            StreamEvent::Content("Hi".into()),
            StreamEvent::Content("there".into()),
            StreamEvent::Done,
        ]
    );
    assert!(decoder.is_finished());

    let stats = decoder.stats();
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.separators, 2);
    assert_eq!(stats.anomalies, 0);
}

#[test]
fn partial_line_produces_nothing_until_completed() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.feed(b"data: Hel").unwrap().is_empty());
    assert_eq!(decoder.pending_bytes(), 9);
    assert!(decoder.feed(b"lo").unwrap().is_empty());

    let events = decoder.feed(b"\n").unwrap();
    assert_eq!(events, vec![StreamEvent::Content("Hello".into())]);
    assert_eq!(decoder.pending_bytes(), 0);
}

// ---------------------------------------------------------------------------
// Test 2: chunk-boundary invariance
// ---------------------------------------------------------------------------

#[test]
fn every_two_way_split_yields_same_content() {
    let data = body(&["The quick ", "brown fox", " jumps"]);
    let (whole, done) = decode_chunks([data.as_slice()]);
    assert_eq!(whole, "The quick brown fox jumps");
    assert!(done);

    for offset in 0..=data.len() {
        let (content, done) = decode_chunks(split_at_offsets(&data, &[offset]));
        assert_eq!(content, whole, "split at {offset}");
        assert!(done, "split at {offset}");
    }
}

#[test]
fn byte_at_a_time_yields_same_content() {
    let data = body(&["one", "two", "three"]);
    let (content, done) = decode_chunks(data.chunks(1));
    assert_eq!(content, "onetwothree");
    assert!(done);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn arbitrary_splits_yield_same_content((payloads, offsets) in split_body_strategy()) {
        let refs: Vec<&str> = payloads.iter().map(String::as_str).collect();
        let data = body(&refs);

        let (content, done) = decode_chunks(split_at_offsets(&data, &offsets));
        prop_assert_eq!(content, payloads.concat());
        prop_assert!(done);
    }
}

// ---------------------------------------------------------------------------
// Test 3: multi-byte split safety
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn multibyte_text_split_at_every_offset(text in "[a é日ß🎉\u{10348}]{1,8}") {
        let data = format!("data: {text}\n\n");
        let bytes = data.as_bytes();
        for offset in 0..=bytes.len() {
            let (content, _) = decode_chunks(split_at_offsets(bytes, &[offset]));
            prop_assert_eq!(&content, &text, "split at {}", offset);
        }
    }
}

#[test]
fn four_byte_character_split_across_three_chunks() {
    let data = "data: 🎉\n".as_bytes();
    // "data: " is 6 bytes; the emoji occupies bytes 6..10.
    let (content, _) = decode_chunks(split_at_offsets(data, &[7, 9]));
    assert_eq!(content, "🎉");
}

#[tokio::test]
async fn decodes_from_async_byte_stream() {
    let data = body(&["日本", "語"]);
    let chunks: Vec<Bytes> = data
        .chunks(4)
        .map(Bytes::copy_from_slice)
        .collect();
    let mut input = tokio_stream::iter(chunks);

    let mut decoder = FrameDecoder::new();
    let mut content = String::new();
    while let Some(chunk) = input.next().await {
        for event in decoder.feed(&chunk).unwrap() {
            if let Some(text) = event.as_content() {
                content.push_str(text);
            }
        }
    }
    assert_eq!(content, "日本語");
    assert!(decoder.is_finished());
}

// ---------------------------------------------------------------------------
// Test 4: sentinel stops accumulation
// ---------------------------------------------------------------------------

#[test]
fn bytes_after_sentinel_in_same_chunk_ignored() {
    let mut decoder = FrameDecoder::new();
    let events = decoder
        .feed(b"data: a\n\ndata: [DONE]\n\ndata: late\n\n")
        .unwrap();
    assert_eq!(
        events,
        vec![StreamEvent::Content("a".into()), StreamEvent::Done]
    );
    assert_eq!(decoder.stats().trailing_bytes, "\ndata: late\n\n".len() as u64);
}

#[test]
fn chunks_after_sentinel_ignored() {
    let mut decoder = FrameDecoder::new();
    decoder.feed(b"data: [DONE]\n").unwrap();
    assert!(decoder.feed(b"data: late\n\n").unwrap().is_empty());
    assert!(decoder.flush().is_empty());
    assert_eq!(decoder.stats().trailing_bytes, 12);
}

#[test]
fn sentinel_substring_is_content() {
    let mut decoder = FrameDecoder::new();
    let events = decoder
        .feed(b"data: not [DONE] yet\ndata: [DONE] \ndata: [done]\n")
        .unwrap();
    assert_eq!(
        events,
        vec![
            StreamEvent::Content("not [DONE] yet".into()),
            StreamEvent::Content("[DONE] ".into()),
            StreamEvent::Content("[done]".into()),
        ]
    );
    assert!(!decoder.is_finished());
}

// ---------------------------------------------------------------------------
// Test 5: non-frame lines
// ---------------------------------------------------------------------------

#[test]
fn non_frame_lines_discarded_and_counted() {
    let mut decoder = FrameDecoder::new();
    let events = decoder
        .feed(b": keepalive\nevent: message\ndata: kept\nstray continuation\n\n")
        .unwrap();

    assert_eq!(events, vec![StreamEvent::Content("kept".into())]);
    let stats = decoder.stats();
    assert_eq!(stats.anomalies, 3);
    assert_eq!(stats.separators, 1);
    assert_eq!(stats.frames, 1);
}

#[test]
fn invalid_utf8_line_decoded_lossily_and_counted() {
    let mut decoder = FrameDecoder::new();
    let events = decoder.feed(b"data: a\xffb\n").unwrap();
    assert_eq!(events, vec![StreamEvent::Content("a\u{fffd}b".into())]);
    assert_eq!(decoder.stats().anomalies, 1);
}

// ---------------------------------------------------------------------------
// Test 6: prefix and line endings
// ---------------------------------------------------------------------------

#[test]
fn prefix_without_space_accepted() {
    let mut decoder = FrameDecoder::new();
    let events = decoder.feed(b"data:Hi\n").unwrap();
    assert_eq!(events, vec![StreamEvent::Content("Hi".into())]);
}

#[test]
fn only_one_space_belongs_to_prefix() {
    let mut decoder = FrameDecoder::new();
    let events = decoder.feed(b"data:  there\ndata: \n").unwrap();
    assert_eq!(
        events,
        vec![
            StreamEvent::Content(" there".into()),
            StreamEvent::Content(String::new()),
        ]
    );
}

#[test]
fn crlf_line_endings_handled() {
    let data = b"data: Hi\r\n\r\ndata: [DONE]\r\n\r\n";
    for offset in 0..=data.len() {
        let (content, done) = decode_chunks(split_at_offsets(data, &[offset]));
        assert_eq!(content, "Hi", "split at {offset}");
        assert!(done, "split at {offset}");
    }
}

// ---------------------------------------------------------------------------
// Test 7: flush
// ---------------------------------------------------------------------------

#[test]
fn flush_emits_unterminated_final_frame() {
    let mut decoder = FrameDecoder::new();
    assert_eq!(
        decoder.feed(b"data: a\n\ndata: tail").unwrap(),
        vec![StreamEvent::Content("a".into())]
    );
    assert_eq!(decoder.flush(), vec![StreamEvent::Content("tail".into())]);
    assert!(decoder.flush().is_empty());
}

#[test]
fn flush_recognizes_unterminated_sentinel() {
    let mut decoder = FrameDecoder::new();
    decoder.feed(b"data: [DONE]").unwrap();
    assert_eq!(decoder.flush(), vec![StreamEvent::Done]);
    assert!(decoder.is_finished());
}

#[test]
fn flush_discards_unterminated_non_frame() {
    let mut decoder = FrameDecoder::new();
    decoder.feed(b"garbage").unwrap();
    assert!(decoder.flush().is_empty());
    assert_eq!(decoder.stats().anomalies, 1);
}

// ---------------------------------------------------------------------------
// Test 8: carry-over bound
// ---------------------------------------------------------------------------

#[test]
fn line_longer_than_limit_is_an_error() {
    let mut decoder = FrameDecoder::with_max_line_bytes(16);
    assert!(decoder.feed(b"data: 0123456789").unwrap().is_empty());
    let err = decoder.feed(b"abcdef").unwrap_err();
    assert_eq!(err, StreamError::LineTooLong { limit: 16 });
    assert!(decoder.is_finished());
    assert_eq!(decoder.pending_bytes(), 0);
}

#[test]
fn long_input_of_short_lines_stays_within_limit() {
    let mut decoder = FrameDecoder::with_max_line_bytes(16);
    let mut content = String::new();
    for _ in 0..1000 {
        for event in decoder.feed(b"data: x\n\n").unwrap() {
            content.push_str(event.as_content().unwrap());
        }
    }
    assert_eq!(content.len(), 1000);
    assert_eq!(decoder.pending_bytes(), 0);
}
