//! HTTP response wrapper.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;

use crate::{RequestError, Result};

/// Stream of response body chunks.
pub type ResponseBody = BoxStream<'static, Result<Bytes>>;

/// HTTP response returned by a transport.
///
/// The body is not read until one of the consuming readers is called.
/// Dropping the response releases the underlying connection.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: url::Url,
    body: ResponseBody,
}

impl Response {
    /// Create a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, url: url::Url, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            url,
            body,
        }
    }

    /// Create a response with an in-memory body.
    pub fn from_bytes(status: StatusCode, url: url::Url, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self::new(
            status,
            HeaderMap::new(),
            url,
            stream::once(async move { Ok(body) }).boxed(),
        )
    }

    /// Create a response from a reqwest response.
    pub(crate) fn from_reqwest(response: reqwest::Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(RequestError::from))
            .boxed();

        Self::new(status, headers, url, body)
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status line text, e.g. `404 Not Found`.
    pub fn status_text(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {}", self.status.as_str(), reason),
            None => self.status.as_str().to_string(),
        }
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the response URL.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Get the content length if available.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE)
    }

    /// Consume the response and drain the body into memory.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Consume the response and decode the body as UTF-8 text.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| RequestError::Decoding(e.to_string()))
    }

    /// Consume the response and parse the body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Turn any status other than `200 OK` into an error.
    pub fn error_for_status(self) -> Result<Self> {
        if self.status == StatusCode::OK {
            Ok(self)
        } else {
            Err(RequestError::UnexpectedStatus {
                status: self.status.as_u16(),
                status_text: self.status_text(),
            })
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
