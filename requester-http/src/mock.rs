//! In-memory transport for tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

use crate::{BuiltRequest, RequestError, Response, Result, Transport};

/// A request captured by [`MockTransport`], with its body fully read.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The body as UTF-8 text, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

enum Reply {
    Respond {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Fail(String),
}

#[derive(Default)]
struct State {
    replies: VecDeque<Reply>,
    requests: Vec<RecordedRequest>,
}

/// Scripted [`Transport`] that records requests and counts released
/// responses.
///
/// Replies are consumed in order; once the script is exhausted every request
/// gets `200 OK` with an empty body.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
    released: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Create a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn respond(self, status: u16, body: impl Into<Bytes>) -> Self {
        self.respond_with_headers(status, &[], body)
    }

    /// Queue a response with headers.
    pub fn respond_with_headers(
        self,
        status: u16,
        headers: &[(&str, &str)],
        body: impl Into<Bytes>,
    ) -> Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.append(name, value);
            }
        }
        self.state.lock().replies.push_back(Reply::Respond {
            status,
            headers: map,
            body: body.into(),
        });
        self
    }

    /// Queue a transport failure.
    pub fn fail_with(self, message: impl Into<String>) -> Self {
        self.state.lock().replies.push_back(Reply::Fail(message.into()));
        self
    }

    /// Number of requests that reached the transport.
    pub fn call_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// All recorded requests, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.lock().requests.last().cloned()
    }

    /// Number of responses whose body was dropped or fully read.
    pub fn released_responses(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: BuiltRequest) -> Result<Response> {
        let (method, url, headers, body) = request.into_parts();
        let body = body.into_bytes()?;

        let reply = {
            let mut state = self.state.lock();
            state.requests.push(RecordedRequest {
                method,
                url: url.clone(),
                headers,
                body,
            });
            state.replies.pop_front()
        };

        match reply.unwrap_or(Reply::Respond {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }) {
            Reply::Respond {
                status,
                headers,
                body,
            } => {
                let guard = ReleaseGuard(self.released.clone());
                let stream = stream::once(async move {
                    let _guard = guard;
                    Ok(body)
                })
                .boxed();
                Ok(Response::new(status, headers, url, stream))
            }
            Reply::Fail(message) => Err(RequestError::transport(std::io::Error::other(message))),
        }
    }
}
