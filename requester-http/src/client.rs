//! reqwest-backed HTTP client.

use async_trait::async_trait;
use http::Method;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::Arc;

use crate::body::content_read_error;
use crate::config::Redirects;
use crate::encode::{Encodable, Json, RawData};
use crate::{
    BuiltRequest, HttpClientConfig, RequestError, Requester, Response, Result, Transport,
};

/// Content type of JSON bodies.
pub const APPLICATION_JSON: &str = "application/json";

static SHARED: Lazy<std::result::Result<HttpClient, String>> =
    Lazy::new(|| HttpClient::new(HttpClientConfig::default()).map_err(|e| e.to_string()));

/// HTTP client: the default [`Transport`] and a factory of [`Requester`]s.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    config: Arc<HttpClientConfig>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let redirect = match config.redirects() {
            Redirects::None => reqwest::redirect::Policy::none(),
            Redirects::Limited(max) => reqwest::redirect::Policy::limited(max),
        };
        let inner = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent())
            .default_headers(config.default_headers().clone())
            .redirect(redirect)
            .build()?;
        Ok(Self::from_reqwest(inner, config))
    }

    /// Wrap an existing reqwest client.
    pub fn from_reqwest(inner: reqwest::Client, config: HttpClientConfig) -> Self {
        Self {
            inner,
            config: Arc::new(config),
        }
    }

    /// Process-wide client with the default configuration.
    ///
    /// Built on first use; if building fails, every call returns that
    /// failure as a configuration error.
    pub fn shared() -> Result<Self> {
        SHARED.as_ref().cloned().map_err(|e| {
            RequestError::configuration(format!("default client unavailable: {e}"))
        })
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Get the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Create a request builder with a custom method.
    pub fn request<M>(&self, method: M, url: impl AsRef<str>) -> Requester
    where
        Method: TryFrom<M>,
        <Method as TryFrom<M>>::Error: Into<http::Error>,
    {
        let url = self.config.resolve(url.as_ref());
        Requester::from_parts(Arc::new(self.clone()), method, url)
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl AsRef<str>) -> Requester {
        self.request(Method::GET, url)
    }

    /// Create a GET request builder with query values appended in order.
    pub fn get_with_queries(&self, url: impl AsRef<str>, values: &[&dyn Encodable]) -> Requester {
        self.get(url).add_queries(values)
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl AsRef<str>) -> Requester {
        self.request(Method::POST, url)
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl AsRef<str>) -> Requester {
        self.request(Method::PUT, url)
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl AsRef<str>) -> Requester {
        self.request(Method::PATCH, url)
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl AsRef<str>) -> Requester {
        self.request(Method::DELETE, url)
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl AsRef<str>) -> Requester {
        self.request(Method::HEAD, url)
    }

    /// POST an opaque body with an explicit content type.
    pub fn post_data<V: RawData + ?Sized>(
        &self,
        url: impl AsRef<str>,
        content_type: impl Into<String>,
        value: &V,
    ) -> Requester {
        self.post(url).set_raw_body(value).content_type(content_type)
    }

    /// POST a value serialized as JSON.
    pub fn post_json<T: Serialize + ?Sized>(&self, url: impl AsRef<str>, value: &T) -> Requester {
        self.post_data(url, APPLICATION_JSON, &Json(value))
    }

    /// POST form fields, URL-encoded unless files are attached later.
    pub fn post_form<V: Encodable + ?Sized>(&self, url: impl AsRef<str>, value: &V) -> Requester {
        self.post(url).set_form_fields(value)
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: BuiltRequest) -> Result<Response> {
        let (method, url, headers, body) = request.into_parts();

        let mut builder = self.inner.request(method, url).headers(headers);
        if !body.is_empty() {
            let body = match body.try_into_bytes() {
                Ok(bytes) => reqwest::Body::from(bytes),
                Err(streamed) => reqwest::Body::wrap_stream(streamed.into_stream()),
            };
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| match content_read_error(&e) {
            Some(failure) => RequestError::encoding(failure.to_string()),
            None => RequestError::from(e),
        })?;
        Ok(Response::from_reqwest(response))
    }
}
