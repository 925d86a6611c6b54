//! Transport contract and the immutable request handed to it.

use async_trait::async_trait;
use http::{HeaderMap, Method};
use url::Url;

use crate::{Body, Response, Result};

/// A fully materialized request.
///
/// Produced once by [`Requester`](crate::Requester); only its headers stay
/// mutable afterwards.
#[derive(Debug)]
pub struct BuiltRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Body,
}

impl BuiltRequest {
    pub(crate) fn new(method: Method, url: Url, headers: HeaderMap, body: Body) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute request URL, including the query.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Split into method, URL, headers and body.
    pub fn into_parts(self) -> (Method, Url, HeaderMap, Body) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// The HTTP client capability a [`Requester`](crate::Requester) dispatches on.
///
/// Implementations must be safe to share between many independent requests;
/// timeouts, pooling and TLS are their concern.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the response without interpreting it.
    async fn send(&self, request: BuiltRequest) -> Result<Response>;
}
