//! Request error types.

use thiserror::Error;

/// Result type for request operations.
pub type Result<T> = std::result::Result<T, RequestError>;

/// Boxed error handed back by a transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while building, sending or reading a request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The endpoint could not be parsed.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A value could not be converted into a query string or body.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Conflicting or misapplied body/method/header configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Opaque failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// The response carried a status other than `200 OK`.
    #[error("Unexpected status: {status_text}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Status line text, e.g. `404 Not Found`.
        status_text: String,
    },

    /// The response body does not match the requested shape.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RequestError {
    pub(crate) fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wrap any transport failure.
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transport(error.into())
    }

    /// Check if this error was raised while configuring the request.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is an encoding error.
    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Encoding(_))
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        self.reqwest_error().is_some_and(reqwest::Error::is_timeout)
    }

    /// Check if this is a connection error.
    pub fn is_connection(&self) -> bool {
        self.reqwest_error().is_some_and(reqwest::Error::is_connect)
    }

    /// Get the HTTP status code if this is a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => self
                .reqwest_error()
                .and_then(reqwest::Error::status)
                .map(|s| s.as_u16()),
        }
    }

    fn reqwest_error(&self) -> Option<&reqwest::Error> {
        match self {
            Self::Transport(e) => e.downcast_ref::<reqwest::Error>(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(Box::new(error))
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decoding(error.to_string())
    }
}
