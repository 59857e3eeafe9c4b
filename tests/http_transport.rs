//! `HttpTransport` against a local mock server.

use ai_lib_exec::transport::{HttpTransport, Transport, TransportError, WireRequest};
use ai_lib_exec::{Error, ErrorKind, ExecutionClient, OutboundRequest, RetryPolicy};
use futures::StreamExt;
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn wire(url: String, body: &str) -> WireRequest {
    WireRequest {
        url,
        headers: vec![("authorization".into(), "Bearer sk-test".into())],
        body: body.to_string(),
        request_id: "req-123".into(),
    }
}

// Local mock traffic must not go through an ambient HTTP proxy.
fn direct_transport() -> HttpTransport {
    HttpTransport::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
}

fn client() -> ExecutionClient {
    ExecutionClient::builder()
        .with_transport(Arc::new(direct_transport()))
        .with_handle(tokio::runtime::Handle::current())
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_attaches_headers_and_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat")
        .match_header("authorization", "Bearer sk-test")
        .match_header("content-type", "application/json")
        .match_header("x-request-id", "req-123")
        .match_body(r#"{"a":1}"#)
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .create_async()
        .await;

    let transport = direct_transport();
    let resp = transport
        .send(&wire(format!("{}/v1/chat", server.url()), r#"{"a":1}"#), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, r#"{"ok":true}"#);
    assert!(resp.retry_after.is_none());
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retry_after_seconds_are_parsed() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat")
        .with_status(429)
        .with_header("retry-after", "7")
        .with_body(r#"{"error":{"message":"slow down"}}"#)
        .create_async()
        .await;

    let transport = direct_transport();
    let resp = transport
        .send(&wire(format!("{}/v1/chat", server.url()), "{}"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(resp.status, 429);
    assert_eq!(resp.retry_after, Some(Duration::from_secs(7)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_caches_successful_http_responses() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat")
        .match_body(Matcher::Json(json!({"model": "m", "prompt": "hi"})))
        .with_status(200)
        .with_body(r#"{"answer":42}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client();
    let req = OutboundRequest::post(
        &format!("{}/v1/chat", server.url()),
        json!({"prompt": "hi", "model": "m"}),
    )
    .unwrap();

    let first = client.execute_async(&req).await.unwrap();
    let second = client.execute_async(&req).await.unwrap();
    assert_eq!(first.json().unwrap()["answer"], 42);
    assert!(second.cached);
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_translates_error_bodies() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat")
        .with_status(404)
        .with_body(r#"{"error":{"message":"model not found","type":"invalid_request_error"}}"#)
        .create_async()
        .await;

    let req = OutboundRequest::post(&format!("{}/v1/chat", server.url()), json!({})).unwrap();
    let err = client().execute_async(&req).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    let api = err.as_api().unwrap();
    assert_eq!(api.status, 404);
    assert_eq!(api.error_type.as_deref(), Some("invalid_request_error"));
    assert_eq!(
        api.message,
        "Not found (HTTP 404): model not found [invalid_request_error]"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sse_stream_with_crlf_line_endings() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/stream")
        .match_header("accept", "text/event-stream")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("event: delta\r\ndata: one\r\n\r\ndata: two\r\n\r\ndata: [DONE]\r\n\r\n")
        .create_async()
        .await;

    let req = OutboundRequest::post(&format!("{}/v1/stream", server.url()), json!({"stream": true}))
        .unwrap();
    let events: Vec<_> = client()
        .open_stream(&req)
        .await
        .unwrap()
        .collect::<Vec<_>>()
        .await;

    let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event, "delta");
    assert_eq!(events[0].data, "one");
    assert_eq!(events[1].event, "");
    assert_eq!(events[1].data, "two");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversize_stream_line_is_a_body_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/stream")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(format!("data: ok\n\ndata: {}\n\n", "x".repeat(256)))
        .create_async()
        .await;

    let transport = direct_transport().with_max_line_bytes(64);
    let resp = transport
        .send_stream(&wire(format!("{}/v1/stream", server.url()), "{}"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);

    let lines: Vec<_> = resp.lines.collect::<Vec<_>>().await;
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].as_ref().unwrap(), "data: ok");
    assert_eq!(lines[1].as_ref().unwrap(), "");
    assert!(matches!(
        lines[2],
        Err(Error::Transport(TransportError::Body(_)))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connection_is_a_transport_error() {
    let client = ExecutionClient::builder()
        .with_transport(Arc::new(direct_transport()))
        .with_retry_policy(RetryPolicy::builder().max_retries(0).build().unwrap())
        .with_handle(tokio::runtime::Handle::current())
        .build()
        .unwrap();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let req = OutboundRequest::post(&format!("http://127.0.0.1:{}/v1/chat", port), json!({}))
        .unwrap();

    let err = client.execute_async(&req).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(err.status(), None);
}
