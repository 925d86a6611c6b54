//! # Requester HTTP
//!
//! A chained HTTP request builder with deferred errors, reflection-free
//! query and form encoding, multipart uploads and consuming body readers.
//!
//! ## Features
//!
//! - **Deferred errors**: configuration never fails mid-chain; the first
//!   error surfaces when the request is executed
//! - **Value encoding**: strings, maps, pairs and `Serialize` records become
//!   query strings or form fields
//! - **Forms**: URL-encoded forms, or multipart as soon as a file is attached
//! - **Readers**: `read_bytes`, `read_text` and `read_json` treat any status
//!   other than `200 OK` as an error
//! - **Pluggable transport**: `reqwest` by default, [`MockTransport`] in tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use requester_http::{HttpClient, HttpClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(HttpClientConfig::default())?;
//!
//!     let user: serde_json::Value = client
//!         .get("https://api.example.com/users/42")
//!         .add_query(&[("fields", "name,email")])
//!         .set_header("Accept", "application/json")
//!         .read_json()
//!         .await?;
//!
//!     println!("User: {user}");
//!     Ok(())
//! }
//! ```
//!
//! ## Uploading Files
//!
//! ```rust,no_run
//! use requester_http::{FormFile, HttpClient};
//!
//! # async fn example() -> requester_http::Result<()> {
//! let receipt = HttpClient::shared()?
//!     .post("https://api.example.com/uploads")
//!     .add_form_field("album", "holidays")
//!     .add_form_file(FormFile::from_path("photo", "beach.jpg"))
//!     .read_text()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod body;
mod client;
mod config;
mod encode;
mod error;
mod form;
mod mock;
mod request;
mod response;
mod transport;

pub use body::{Body, BodyStream};
pub use client::{APPLICATION_JSON, HttpClient};
pub use config::{DEFAULT_TIMEOUT, HttpClientConfig, HttpClientConfigBuilder, Redirects};
pub use encode::{
    Encodable, Encoded, FieldValue, Fields, FormValues, Json, RawData, to_form_values,
    to_query_fragment,
};
pub use error::{BoxError, RequestError, Result};
pub use form::{FORM_URLENCODED, FileSource, FormFile, encode_form, multipart_boundary};
pub use mock::{MockTransport, RecordedRequest};
pub use request::Requester;
pub use response::{Response, ResponseBody};
pub use transport::{BuiltRequest, Transport};

// Re-export commonly used types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use requester_http::prelude::*;
/// ```
pub mod prelude {
    pub use crate::body::Body;
    pub use crate::client::HttpClient;
    pub use crate::config::{HttpClientConfig, HttpClientConfigBuilder, Redirects};
    pub use crate::encode::{Encodable, Fields, FormValues, Json, RawData};
    pub use crate::error::{RequestError, Result};
    pub use crate::form::FormFile;
    pub use crate::request::Requester;
    pub use crate::response::Response;
    pub use crate::transport::{BuiltRequest, Transport};
}
