//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use ai_lib_exec::transport::{HttpResponse, StreamResponse, Transport, TransportError, WireRequest};
use ai_lib_exec::{Error, OutboundRequest, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(u16, String),
    RespondAfter(u16, String, Duration),
    Fail(TransportError),
}

impl Step {
    pub fn ok(body: &str) -> Self {
        Step::Respond(200, body.to_string())
    }

    pub fn status(status: u16, body: &str) -> Self {
        Step::Respond(status, body.to_string())
    }
}

/// One scripted stream: status, lines, optional trailing failure.
#[derive(Debug, Clone)]
pub struct StreamScript {
    pub status: u16,
    pub lines: Vec<String>,
    pub fail_after: Option<TransportError>,
}

impl StreamScript {
    pub fn ok(lines: &[&str]) -> Self {
        Self {
            status: 200,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            fail_after: None,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            lines: body.lines().map(str::to_string).collect(),
            fail_after: None,
        }
    }

    pub fn failing_after(mut self, err: TransportError) -> Self {
        self.fail_after = Some(err);
        self
    }
}

/// Replays `script` in order, then repeats `fallback` forever.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    latency: Duration,
    stream: Mutex<Option<StreamScript>>,
    calls: AtomicUsize,
    stream_calls: AtomicUsize,
    seen: Mutex<Vec<WireRequest>>,
}

impl ScriptedTransport {
    pub fn new(fallback: Step) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            stream: Mutex::new(None),
            calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    /// Simulated network latency for every `send`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_stream(self, stream: StreamScript) -> Self {
        *self.stream.lock().unwrap() = Some(stream);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<WireRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &WireRequest, _timeout: Duration) -> Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match step {
            Step::Respond(status, body) => Ok(HttpResponse::new(status, body)),
            Step::RespondAfter(status, body, after) => {
                Ok(HttpResponse::new(status, body).with_retry_after(after))
            }
            Step::Fail(e) => Err(Error::Transport(e)),
        }
    }

    async fn send_stream(&self, request: &WireRequest, _timeout: Duration) -> Result<StreamResponse> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        let script = self
            .stream
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| StreamScript::ok(&[]));
        let mut items: Vec<Result<String>> = script.lines.into_iter().map(Ok).collect();
        if let Some(e) = script.fail_after {
            items.push(Err(Error::Transport(e)));
        }
        Ok(StreamResponse {
            status: script.status,
            lines: Box::pin(futures::stream::iter(items)),
        })
    }
}

pub fn chat_request(prompt: &str) -> OutboundRequest {
    OutboundRequest::post(
        "https://api.example.com/v1/chat/completions",
        json!({
            "model": "test-model",
            "messages": [{"role": "user", "content": prompt}],
        }),
    )
    .unwrap()
    .with_bearer("sk-test")
}
