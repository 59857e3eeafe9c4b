//! 请求执行逻辑：单次尝试的流式与非流式请求执行。
//!
//! Request execution logic (single-attempt). Retry and deduplication are
//! layered on top by the caller.

use crate::pipeline::decode_events;
use crate::transport::{HttpResponse, Transport, WireRequest};
use crate::types::{OutboundRequest, SseEvent};
use crate::{BoxStream, Error, Result};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info};

use super::error_classification::translate;
use super::policy::AttemptState;

pub(crate) fn wire_request(request: &OutboundRequest, body: String, request_id: String) -> WireRequest {
    WireRequest {
        url: request.url().to_string(),
        headers: request.headers().to_vec(),
        body,
        request_id,
    }
}

/// One network attempt. Any non-200 status becomes a typed [`Error::Api`].
pub(crate) async fn send_once(
    transport: &dyn Transport,
    wire: &WireRequest,
    timeout: Duration,
    state: AttemptState,
) -> Result<HttpResponse> {
    info!(
        request_id = %wire.request_id,
        attempt = state.attempt + 1,
        url = %wire.url,
        "dispatching request"
    );
    let resp = transport.send(wire, timeout).await?;
    if resp.is_ok() {
        debug!(
            request_id = %wire.request_id,
            http_status = resp.status,
            bytes = resp.body.len(),
            "attempt succeeded"
        );
        return Ok(resp);
    }
    Err(Error::Api(
        translate(resp.status, &resp.body).with_retry_after(resp.retry_after),
    ))
}

/// Most of a non-200 stream body read for error translation.
pub(crate) const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Open a streaming exchange and hand back its parsed events.
///
/// For a non-200 head, up to [`MAX_ERROR_BODY_BYTES`] of the body are read
/// and translated instead.
pub(crate) async fn open_event_stream(
    transport: &dyn Transport,
    wire: &WireRequest,
    timeout: Duration,
) -> Result<BoxStream<'static, SseEvent>> {
    info!(request_id = %wire.request_id, url = %wire.url, "opening stream");
    let resp = transport.send_stream(wire, timeout).await?;
    if resp.status == 200 {
        return Ok(decode_events(resp.lines));
    }

    let mut lines = resp.lines;
    let mut body = String::new();
    while let Some(Ok(line)) = lines.next().await {
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str(&line);
        if body.len() >= MAX_ERROR_BODY_BYTES {
            let mut end = MAX_ERROR_BODY_BYTES;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
            debug!(request_id = %wire.request_id, "error body truncated");
            break;
        }
    }
    Err(Error::Api(translate(resp.status, body.trim())))
}
