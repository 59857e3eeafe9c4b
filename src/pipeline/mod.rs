//! 流水线处理模块：将流式响应字节解码为 SSE 事件。
//!
//! # Streaming Decode Layer
//!
//! Streaming calls skip the cache and the in-flight registry entirely: the
//! response body flows through this module and out to the caller.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Raw Bytes → Lines → SseLineParser → SseEvent
//!     │          │           │
//!   HTTP     \n / \r\n   event:/data:
//!            framing     assembly, [DONE]
//! ```
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`SseLineParser`] | Single-pass line to event state machine |
//! | [`decode_lines`] | Byte stream to line stream |
//! | [`decode_lines_with_limit`] | Same, with an explicit per-line cap |
//! | [`decode_events`] | Line stream to event stream |
//! | [`decode_sse`] | Both of the above |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_exec::pipeline::SseLineParser;
//!
//! let mut parser = SseLineParser::new();
//! let mut events = Vec::new();
//! for line in ["event: message", "data: a", "data: b", "", "data: [DONE]", ""] {
//!     events.extend(parser.feed_line(line));
//! }
//! events.extend(parser.finish());
//!
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].event, "message");
//! assert_eq!(events[0].data, "a\nb");
//! ```

pub mod decode;

pub use decode::{
    decode_events, decode_lines, decode_lines_with_limit, decode_sse, SseLineParser,
    DEFAULT_MAX_LINE_BYTES,
};
