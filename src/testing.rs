//! Shared test doubles for the unit suites.

use crate::transport::{Transport, TransportError};
use crate::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Transport double: records every physical request and answers from a
/// caller-supplied responder.
pub(crate) struct MockTransport {
    calls: Mutex<Vec<HttpRequest>>,
    responder:
        Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>,
    performed: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new(
        responder: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
            performed: AtomicUsize::new(0),
        })
    }

    pub(crate) fn call_count(&self) -> usize {
        self.performed.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.performed.fetch_add(1, Ordering::SeqCst);
        let response = (self.responder)(&request);
        self.calls.lock().unwrap().push(request);
        response
    }
}

/// A combined multipart response with one 200 JSON part per request,
/// bodies `{"part":<i>}`, framed with the codec's stock boundary.
pub(crate) fn multipart_ok_response(count: usize) -> HttpResponse {
    let mut lines = Vec::new();
    for index in 0..count {
        lines.push("--1494052623884".to_string());
        lines.push("Content-Type: application/http; msgtype=response".to_string());
        lines.push(String::new());
        lines.push("HTTP/1.1 200 OK".to_string());
        lines.push(String::new());
        lines.push(format!("{{\"part\":{}}}", index));
    }
    lines.push("--1494052623884--".to_string());
    HttpResponse::new(200, "OK")
        .with_header("Content-Type", "multipart/mixed; boundary=1494052623884")
        .with_body(lines.join("\r\n"))
}

/// Number of request parts inside an encoded envelope body.
pub(crate) fn count_parts(body: &str) -> usize {
    body.matches("msgtype=request").count()
}
