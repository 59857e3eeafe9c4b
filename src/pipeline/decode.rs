//! Streaming decoders (Bytes -> lines -> SSE events)
//!
//! [`SseLineParser`] is the single-pass state machine; the free functions
//! lift it onto async streams.

use crate::transport::TransportError;
use crate::types::SseEvent;
use crate::{BoxStream, Error};
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use std::io;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

const DONE_SIGNAL: &str = "[DONE]";

/// Default cap on a single decoded line (1 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Line-at-a-time Server-Sent Events assembler.
///
/// Memory is bounded by the event currently being assembled. `id:` and
/// `retry:` fields (and anything else unrecognised) are ignored.
#[derive(Debug, Default)]
pub struct SseLineParser {
    event: String,
    data: String,
    has_data: bool,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator). Returns an event when the
    /// line completes one.
    pub fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(label) = line.strip_prefix("event:") {
            self.event = label.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            if self.has_data {
                self.data.push('\n');
            }
            self.data.push_str(value.trim());
            self.has_data = true;
        }
        None
    }

    /// Flush whatever is pending at end of stream.
    pub fn finish(&mut self) -> Option<SseEvent> {
        self.dispatch()
    }

    // An event label without any data is kept for the next event.
    fn dispatch(&mut self) -> Option<SseEvent> {
        if !self.has_data {
            return None;
        }
        let event = std::mem::take(&mut self.event);
        let data = std::mem::take(&mut self.data);
        self.has_data = false;
        if data == DONE_SIGNAL {
            return None;
        }
        Some(SseEvent::new(event, data))
    }
}

/// Split a byte stream into lines. Both `\n` and `\r\n` terminate a line.
///
/// Lines are capped at [`DEFAULT_MAX_LINE_BYTES`].
pub fn decode_lines(input: BoxStream<'static, Bytes>) -> BoxStream<'static, String> {
    decode_lines_with_limit(input, DEFAULT_MAX_LINE_BYTES)
}

/// [`decode_lines`] with an explicit per-line cap.
///
/// A line longer than `max_line_bytes` yields one `TransportError::Body` and
/// ends the stream. Errors from `input` come through unchanged and also end
/// the stream.
pub fn decode_lines_with_limit(
    input: BoxStream<'static, Bytes>,
    max_line_bytes: usize,
) -> BoxStream<'static, String> {
    let max_line_bytes = max_line_bytes.max(1);
    let reader = StreamReader::new(input.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    let framed = FramedRead::new(reader, LinesCodec::new_with_max_length(max_line_bytes));
    let lines = stream::unfold(Some(framed), move |state| async move {
        let mut framed = state?;
        match framed.next().await? {
            Ok(line) => Some((Ok(line), Some(framed))),
            Err(e) => Some((Err(line_error(e, max_line_bytes)), None)),
        }
    });
    Box::pin(lines)
}

fn line_error(err: LinesCodecError, max_line_bytes: usize) -> Error {
    match err {
        LinesCodecError::MaxLineLengthExceeded => Error::Transport(TransportError::Body(
            format!("line exceeds {} bytes", max_line_bytes),
        )),
        // Unwrap the crate error that was tunnelled through the reader.
        LinesCodecError::Io(e) => match e.get_ref().and_then(|inner| inner.downcast_ref::<Error>()) {
            Some(inner) => inner.clone(),
            None => Error::Transport(TransportError::Body(e.to_string())),
        },
    }
}

/// Parse a line stream into SSE events.
///
/// An error from the underlying stream is yielded once and ends the stream;
/// the partially assembled event is discarded in that case.
pub fn decode_events(lines: BoxStream<'static, String>) -> BoxStream<'static, SseEvent> {
    let events = stream::unfold(
        Some((lines, SseLineParser::new())),
        |state| async move {
            let (mut lines, mut parser) = state?;
            loop {
                match lines.next().await {
                    Some(Ok(line)) => {
                        if let Some(ev) = parser.feed_line(&line) {
                            return Some((Ok(ev), Some((lines, parser))));
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), None)),
                    None => {
                        return parser.finish().map(|ev| (Ok(ev), None));
                    }
                }
            }
        },
    );
    Box::pin(events)
}

/// Bytes straight to events.
pub fn decode_sse(input: BoxStream<'static, Bytes>) -> BoxStream<'static, SseEvent> {
    decode_events(decode_lines(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(lines: &[&str]) -> Vec<SseEvent> {
        let mut parser = SseLineParser::new();
        let mut out: Vec<SseEvent> = lines.iter().filter_map(|l| parser.feed_line(l)).collect();
        out.extend(parser.finish());
        out
    }

    #[test]
    fn test_multiline_data_and_done() {
        let events = feed_all(&["event: message", "data: a", "data: b", "", "data: [DONE]", ""]);
        assert_eq!(events, vec![SseEvent::new("message", "a\nb")]);
    }

    #[test]
    fn test_comments_and_unknown_fields_ignored() {
        let events = feed_all(&[": keep-alive", "id: 7", "retry: 1000", "data: x", ""]);
        assert_eq!(events, vec![SseEvent::new("", "x")]);
    }

    #[test]
    fn test_label_resets_after_dispatch() {
        let events = feed_all(&["event: delta", "data: 1", "", "data: 2", ""]);
        assert_eq!(
            events,
            vec![SseEvent::new("delta", "1"), SseEvent::new("", "2")]
        );
    }

    #[test]
    fn test_label_without_data_carries_over() {
        let events = feed_all(&["event: ping", "", "data: late", ""]);
        assert_eq!(events, vec![SseEvent::new("ping", "late")]);
    }

    #[test]
    fn test_finish_flushes_pending_event() {
        let events = feed_all(&["data: tail"]);
        assert_eq!(events, vec![SseEvent::new("", "tail")]);
    }

    #[test]
    fn test_crlf_lines() {
        let events = feed_all(&["event: m\r", "data: v\r", "\r"]);
        assert_eq!(events, vec![SseEvent::new("m", "v")]);
    }

    #[test]
    fn test_empty_data_line_still_counts_as_data() {
        let events = feed_all(&["data:", ""]);
        assert_eq!(events, vec![SseEvent::new("", "")]);
    }

    #[tokio::test]
    async fn test_decode_sse_across_chunk_boundaries() {
        let chunks: Vec<crate::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"a\"")),
            Ok(Bytes::from_static(b":1}\r\n\r\ndata: second\n")),
            Ok(Bytes::from_static(b"\ndata: [DONE]\n\n")),
        ];
        let events: Vec<SseEvent> = decode_sse(Box::pin(stream::iter(chunks)))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            events,
            vec![SseEvent::new("", "{\"a\":1}"), SseEvent::new("", "second")]
        );
    }

    #[tokio::test]
    async fn test_decode_events_stops_after_error() {
        let lines: Vec<crate::Result<String>> = vec![
            Ok("data: one".into()),
            Ok("".into()),
            Ok("data: partial".into()),
            Err(Error::Transport(TransportError::Body("reset".into()))),
            Ok("".into()),
        ];
        let out: Vec<crate::Result<SseEvent>> =
            decode_events(Box::pin(stream::iter(lines))).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().data, "one");
        assert!(out[1].is_err());
    }

    #[tokio::test]
    async fn test_oversize_line_ends_stream_with_body_error() {
        let mut chunks: Vec<crate::Result<Bytes>> = vec![Ok(Bytes::from_static(b"data: ok\n"))];
        chunks.extend((0..64).map(|_| Ok(Bytes::from(vec![b'a'; 1024]))));
        let mut lines = decode_lines_with_limit(Box::pin(stream::iter(chunks)), 4096);

        assert_eq!(lines.next().await.unwrap().unwrap(), "data: ok");
        match lines.next().await {
            Some(Err(Error::Transport(TransportError::Body(msg)))) => {
                assert!(msg.contains("4096"), "{}", msg)
            }
            other => panic!("expected body error, got {:?}", other),
        }
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn test_line_at_the_limit_passes() {
        let chunks: Vec<crate::Result<Bytes>> = vec![Ok(Bytes::from(
            [vec![b'x'; 16], b"\n".to_vec()].concat(),
        ))];
        let lines: Vec<String> = decode_lines_with_limit(Box::pin(stream::iter(chunks)), 16)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(lines, vec!["x".repeat(16)]);
    }

    #[tokio::test]
    async fn test_source_error_kind_is_preserved() {
        let chunks: Vec<crate::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: a\n")),
            Err(Error::Transport(TransportError::Timeout("idle".into()))),
            Ok(Bytes::from_static(b"data: b\n")),
        ];
        let out: Vec<crate::Result<String>> =
            decode_lines(Box::pin(stream::iter(chunks))).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "data: a");
        assert!(matches!(
            out[1],
            Err(Error::Transport(TransportError::Timeout(_)))
        ));
    }
}
