//! Client configuration.
//!
//! Settings are validated while the configuration is built: a malformed base
//! URL or default header is reported by [`HttpClientConfigBuilder::build`]
//! instead of by the first request sent through the client.

use http::header::HeaderMap;
use std::time::Duration;
use url::Url;

use crate::request::header_pair;
use crate::{RequestError, Result};

/// Timeout applied to a whole exchange unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How redirect responses are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    /// Return redirect responses to the caller.
    None,
    /// Follow at most this many redirects.
    Limited(usize),
}

impl Default for Redirects {
    fn default() -> Self {
        Self::Limited(10)
    }
}

/// Validated settings of an [`HttpClient`](crate::HttpClient).
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    base_url: Option<Url>,
    timeout: Duration,
    default_headers: HeaderMap,
    user_agent: String,
    redirects: Redirects,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            default_headers: HeaderMap::new(),
            user_agent: format!("requester/{}", env!("CARGO_PKG_VERSION")),
            redirects: Redirects::default(),
        }
    }
}

impl HttpClientConfig {
    /// Start from the defaults.
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder {
            config: Ok(Self::default()),
        }
    }

    /// URL that relative request URLs are joined onto.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Timeout of a whole exchange, body included.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Headers sent with every request.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// `User-Agent` sent with every request.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Redirect handling.
    pub fn redirects(&self) -> Redirects {
        self.redirects
    }

    /// Resolve a request URL.
    ///
    /// With a base URL, `url` is joined onto it the way a browser resolves a
    /// link: a base without a trailing slash loses its last path segment, and
    /// absolute URLs replace the base entirely.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        match &self.base_url {
            Some(base) => Ok(base.join(url)?),
            None => Ok(Url::parse(url)?),
        }
    }
}

/// Builder for [`HttpClientConfig`].
///
/// The first invalid setting is kept and returned by [`build`](Self::build);
/// later settings are ignored.
#[derive(Debug)]
pub struct HttpClientConfigBuilder {
    config: Result<HttpClientConfig>,
}

impl HttpClientConfigBuilder {
    /// Set the URL relative request URLs are joined onto.
    pub fn base_url(self, url: impl AsRef<str>) -> Self {
        self.update(|config| {
            let base = Url::parse(url.as_ref())?;
            if base.cannot_be_a_base() {
                return Err(RequestError::configuration(format!(
                    "{base} cannot be used as a base URL"
                )));
            }
            config.base_url = Some(base);
            Ok(())
        })
    }

    /// Set the timeout of a whole exchange.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.update(|config| {
            config.timeout = timeout;
            Ok(())
        })
    }

    /// Add a header sent with every request.
    pub fn default_header(self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.update(|config| {
            let (name, value) = header_pair(name.as_ref(), value.as_ref())?;
            config.default_headers.append(name, value);
            Ok(())
        })
    }

    /// Set the `User-Agent`.
    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.update(|config| {
            config.user_agent = user_agent.into();
            Ok(())
        })
    }

    /// Set redirect handling.
    pub fn redirects(self, redirects: Redirects) -> Self {
        self.update(|config| {
            config.redirects = redirects;
            Ok(())
        })
    }

    /// Finish, returning the first invalid setting as an error.
    pub fn build(self) -> Result<HttpClientConfig> {
        self.config
    }

    fn update(mut self, apply: impl FnOnce(&mut HttpClientConfig) -> Result<()>) -> Self {
        let failure = match &mut self.config {
            Ok(config) => apply(config).err(),
            Err(_) => None,
        };
        if let Some(e) = failure {
            self.config = Err(e);
        }
        self
    }
}
