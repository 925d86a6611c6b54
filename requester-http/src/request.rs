//! Request builder.
//!
//! [`Requester`] collects configuration through chained calls and defers
//! every configuration error. The first failing call moves the builder into
//! an absorbing error state: later calls are no-ops, and the error is
//! returned by the first execution or read call without contacting the
//! transport.
//!
//! The request is materialized at most once, on the first header mutation or
//! on execution. After that only headers can change.

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::Method;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

use crate::encode::{Encodable, FormValues, RawData, to_query_fragment};
use crate::form::{FormFile, encode_form};
use crate::{Body, BuiltRequest, RequestError, Response, Result, Transport};

/// Chained, deferred-error HTTP request builder.
///
/// ```rust,no_run
/// use requester_http::{HttpClient, HttpClientConfig};
///
/// # async fn example() -> requester_http::Result<()> {
/// let client = HttpClient::new(HttpClientConfig::default())?;
///
/// let page = client
///     .get("https://api.example.com/users")
///     .add_query("page=2")
///     .set_header("Accept", "text/html")
///     .read_text()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[must_use = "a Requester does nothing until it is executed"]
pub struct Requester {
    transport: Option<Arc<dyn Transport>>,
    state: std::result::Result<Stage, RequestError>,
}

enum Stage {
    Configuring(Draft),
    Materialized(BuiltRequest),
}

struct Draft {
    method: Method,
    url: Url,
    content_type: Option<String>,
    raw: Option<Bytes>,
    fields: FormValues,
    files: Vec<FormFile>,
}

/// Validated body configuration.
enum BodySource {
    Empty,
    Raw(Bytes),
    Form(FormValues, Vec<FormFile>),
}

impl Requester {
    /// Create a builder for `method` and `url` dispatching on `transport`.
    ///
    /// A malformed URL or method token puts the builder in the error state.
    pub fn new<M>(transport: Arc<dyn Transport>, method: M, url: impl AsRef<str>) -> Self
    where
        Method: TryFrom<M>,
        <Method as TryFrom<M>>::Error: Into<http::Error>,
    {
        let url = Url::parse(url.as_ref()).map_err(RequestError::from);
        Self::from_parts(transport, method, url)
    }

    pub(crate) fn from_parts<M>(transport: Arc<dyn Transport>, method: M, url: Result<Url>) -> Self
    where
        Method: TryFrom<M>,
        <Method as TryFrom<M>>::Error: Into<http::Error>,
    {
        let state = url.and_then(|url| {
            let method = Method::try_from(method).map_err(|e| {
                let e: http::Error = e.into();
                RequestError::configuration(format!("invalid method: {e}"))
            })?;
            Ok(Stage::Configuring(Draft::new(method, url)))
        });
        Self {
            transport: Some(transport),
            state,
        }
    }

    /// A builder that starts in the error state.
    ///
    /// Every configuration call is ignored and every execution call returns
    /// `error`. No transport is attached.
    pub fn from_error(error: RequestError) -> Self {
        Self {
            transport: None,
            state: Err(error),
        }
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    /// Append a value to the query string.
    ///
    /// Strings are appended verbatim; structured values are percent-encoded.
    /// The resulting query is normalized by [`Url`], so characters that may
    /// not appear in a query (such as spaces) are percent-encoded: `"q=a b"`
    /// is sent as `q=a%20b`.
    pub fn add_query<V: Encodable + ?Sized>(self, value: &V) -> Self {
        self.add_queries(&[&value])
    }

    /// Append several values to the query string.
    pub fn add_queries(self, values: &[&dyn Encodable]) -> Self {
        self.configure(|draft| {
            let fragment = to_query_fragment(values)?;
            if fragment.is_empty() {
                return Ok(());
            }
            let query = match draft.url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{fragment}"),
                _ => fragment,
            };
            draft.url.set_query(Some(&query));
            Ok(())
        })
    }

    /// Replace the query string with a value.
    pub fn set_query<V: Encodable + ?Sized>(self, value: &V) -> Self {
        self.set_queries(&[&value])
    }

    /// Replace the query string with several values.
    pub fn set_queries(self, values: &[&dyn Encodable]) -> Self {
        self.configure(|draft| {
            let fragment = to_query_fragment(values)?;
            draft
                .url
                .set_query((!fragment.is_empty()).then_some(fragment.as_str()));
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Body
    // ------------------------------------------------------------------

    /// Set an opaque body. Strings and byte buffers are used as-is.
    pub fn set_raw_body<V: RawData + ?Sized>(self, value: &V) -> Self {
        self.configure(|draft| {
            draft.raw = Some(value.to_raw_bytes()?);
            Ok(())
        })
    }

    /// Replace all form fields.
    pub fn set_form_fields<V: Encodable + ?Sized>(self, value: &V) -> Self {
        self.configure(|draft| {
            draft.fields = value.encode()?.into_values()?;
            Ok(())
        })
    }

    /// Append a value to a form field.
    pub fn add_form_field(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.configure(|draft| {
            draft.fields.append(key, value.to_string());
            Ok(())
        })
    }

    /// Overwrite a form field with a single value.
    pub fn set_form_field(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.configure(|draft| {
            draft.fields.set(key, value.to_string());
            Ok(())
        })
    }

    /// Attach a file. Any attachment switches the form to multipart.
    pub fn add_form_file(self, file: FormFile) -> Self {
        self.add_form_files([file])
    }

    /// Attach several files.
    pub fn add_form_files(self, files: impl IntoIterator<Item = FormFile>) -> Self {
        self.configure(|draft| {
            draft.files.extend(files);
            Ok(())
        })
    }

    /// Set the `Content-Type` sent with the body, overriding the type derived
    /// from form encoding.
    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        self.configure(|draft| {
            draft.content_type = Some(content_type.into());
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Headers
    // ------------------------------------------------------------------

    /// Set a header, replacing existing values. Materializes the request.
    pub fn set_header(self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.with_request(|request| {
            let (name, value) = header_pair(key.as_ref(), value.as_ref())?;
            request.headers_mut().insert(name, value);
            Ok(())
        })
    }

    /// Append a header value. Materializes the request.
    pub fn add_header(self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.with_request(|request| {
            let (name, value) = header_pair(key.as_ref(), value.as_ref())?;
            request.headers_mut().append(name, value);
            Ok(())
        })
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl fmt::Display) -> Self {
        self.set_header(header::AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Set basic authentication.
    pub fn basic_auth(self, username: impl fmt::Display, password: Option<impl fmt::Display>) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{username}:{p}"),
            None => format!("{username}:"),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.set_header(header::AUTHORIZATION, format!("Basic {encoded}"))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The deferred error, if configuration failed.
    pub fn error(&self) -> Option<&RequestError> {
        self.state.as_ref().err()
    }

    /// Check if the request has been materialized.
    pub fn is_materialized(&self) -> bool {
        matches!(self.state, Ok(Stage::Materialized(_)))
    }

    /// The transport the request will be sent on, if one is attached.
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    /// Request method.
    pub fn method(&self) -> Option<&Method> {
        match self.state.as_ref().ok()? {
            Stage::Configuring(draft) => Some(&draft.method),
            Stage::Materialized(request) => Some(request.method()),
        }
    }

    /// Target URL, including the query built so far.
    pub fn url(&self) -> Option<&Url> {
        match self.state.as_ref().ok()? {
            Stage::Configuring(draft) => Some(&draft.url),
            Stage::Materialized(request) => Some(request.url()),
        }
    }

    /// Raw body configured so far. `None` once materialized.
    pub fn raw_body(&self) -> Option<&[u8]> {
        self.draft()?.raw.as_deref()
    }

    /// Form fields configured so far. `None` once materialized.
    pub fn form_fields(&self) -> Option<&FormValues> {
        self.draft().map(|draft| &draft.fields)
    }

    /// Files attached so far. Empty once materialized.
    pub fn form_files(&self) -> &[FormFile] {
        self.draft().map(|draft| draft.files.as_slice()).unwrap_or_default()
    }

    /// The materialized request, if any.
    pub fn request(&self) -> Option<&BuiltRequest> {
        match &self.state {
            Ok(Stage::Materialized(request)) => Some(request),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Materialize and return the request without sending it.
    pub fn into_request(self) -> Result<BuiltRequest> {
        self.finish().map(|(_, request)| request)
    }

    /// Send the request and return the response unchanged.
    ///
    /// A deferred error is returned without contacting the transport.
    pub async fn execute(self) -> Result<Response> {
        let (transport, request) = self.finish()?;
        debug!(
            method = %request.method(),
            url = %request.url(),
            "Sending HTTP request"
        );
        let response = transport.send(request).await?;
        debug!(status = %response.status(), "Received HTTP response");
        Ok(response)
    }

    /// Send the request and read the whole body.
    ///
    /// Any status other than `200 OK` is returned as
    /// [`RequestError::UnexpectedStatus`]. The response is released on every
    /// path.
    pub async fn read_bytes(self) -> Result<Bytes> {
        let response = self.execute().await?;
        response.error_for_status()?.bytes().await
    }

    /// Send the request and decode the body as UTF-8 text.
    pub async fn read_text(self) -> Result<String> {
        let bytes = self.read_bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| RequestError::Decoding(e.to_string()))
    }

    /// Send the request and decode the body as JSON.
    pub async fn read_json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.read_bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ------------------------------------------------------------------
    // State handling
    // ------------------------------------------------------------------

    fn draft(&self) -> Option<&Draft> {
        match &self.state {
            Ok(Stage::Configuring(draft)) => Some(draft),
            _ => None,
        }
    }

    fn configure(mut self, apply: impl FnOnce(&mut Draft) -> Result<()>) -> Self {
        let failure = match &mut self.state {
            Ok(Stage::Configuring(draft)) => apply(draft).err(),
            Ok(Stage::Materialized(_)) => {
                trace!("Request already materialized, ignoring configuration change");
                None
            }
            Err(_) => None,
        };
        if let Some(e) = failure {
            self.state = Err(e);
        }
        self
    }

    fn with_request(mut self, apply: impl FnOnce(&mut BuiltRequest) -> Result<()>) -> Self {
        self.materialize();
        let failure = match &mut self.state {
            Ok(Stage::Materialized(request)) => apply(request).err(),
            _ => None,
        };
        if let Some(e) = failure {
            self.state = Err(e);
        }
        self
    }

    fn materialize(&mut self) {
        if !matches!(self.state, Ok(Stage::Configuring(_))) {
            return;
        }
        let placeholder = Err(RequestError::configuration("request is being materialized"));
        self.state = match std::mem::replace(&mut self.state, placeholder) {
            Ok(Stage::Configuring(draft)) => draft.build().map(Stage::Materialized),
            other => other,
        };
    }

    fn finish(self) -> Result<(Arc<dyn Transport>, BuiltRequest)> {
        let request = match self.state {
            Ok(Stage::Configuring(draft)) => draft.build()?,
            Ok(Stage::Materialized(request)) => request,
            Err(e) => return Err(e),
        };
        let transport = self
            .transport
            .ok_or_else(|| RequestError::configuration("no transport attached"))?;
        Ok((transport, request))
    }
}

impl Draft {
    fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            content_type: None,
            raw: None,
            fields: FormValues::new(),
            files: Vec::new(),
        }
    }

    fn build(self) -> Result<BuiltRequest> {
        let Draft {
            method,
            url,
            content_type,
            raw,
            fields,
            files,
        } = self;

        let (derived_type, body, kind) = match body_source(&method, raw, fields, files)? {
            BodySource::Empty => (None, Body::empty(), "empty"),
            BodySource::Raw(bytes) => (None, Body::from(bytes), "raw"),
            BodySource::Form(fields, files) => {
                let kind = if files.is_empty() { "urlencoded" } else { "multipart" };
                let (content_type, body) = encode_form(fields, files)?;
                (Some(content_type), body, kind)
            }
        };

        let mut headers = http::HeaderMap::new();
        if let Some(content_type) = content_type.or(derived_type) {
            let value = HeaderValue::try_from(content_type).map_err(|e| {
                RequestError::configuration(format!("invalid content type: {e}"))
            })?;
            headers.insert(header::CONTENT_TYPE, value);
        }

        debug!(method = %method, url = %url, body = kind, "Materialized request");
        Ok(BuiltRequest::new(method, url, headers, body))
    }
}

fn body_source(
    method: &Method,
    raw: Option<Bytes>,
    fields: FormValues,
    files: Vec<FormFile>,
) -> Result<BodySource> {
    let raw = raw.filter(|bytes| !bytes.is_empty());
    let has_form = !fields.is_empty() || !files.is_empty();

    if (raw.is_some() || has_form) && !is_body_bearing(method) {
        return Err(RequestError::configuration(format!(
            "body requires the POST method, got {method}"
        )));
    }

    match raw {
        Some(_) if has_form => Err(RequestError::configuration(
            "raw and form are mutually exclusive",
        )),
        Some(bytes) => Ok(BodySource::Raw(bytes)),
        None if has_form => Ok(BodySource::Form(fields, files)),
        None => Ok(BodySource::Empty),
    }
}

fn is_body_bearing(method: &Method) -> bool {
    *method == Method::POST
}

pub(crate) fn header_pair(key: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|e| RequestError::configuration(format!("invalid header name {key:?}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| RequestError::configuration(format!("invalid value for header {key}: {e}")))?;
    Ok((name, value))
}

impl fmt::Debug for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Requester");
        match &self.state {
            Ok(Stage::Configuring(draft)) => debug
                .field("stage", &"configuring")
                .field("method", &draft.method)
                .field("url", &draft.url.as_str())
                .field("fields", &draft.fields)
                .field("files", &draft.files.len()),
            Ok(Stage::Materialized(request)) => {
                debug.field("stage", &"materialized").field("request", request)
            }
            Err(e) => debug.field("error", e),
        };
        debug.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockTransport;
    use crate::encode::Fields;
    use serde::Serialize;
    use serde_json::json;

    fn requester(mock: &MockTransport, method: Method, url: &str) -> Requester {
        Requester::new(Arc::new(mock.clone()), method, url)
    }

    #[derive(Serialize)]
    struct Signup {
        name: String,
        roles: Vec<String>,
    }

    #[test]
    fn test_invalid_url_is_deferred() {
        let mock = MockTransport::new();
        let req = requester(&mock, Method::GET, "::not a url::")
            .add_query("a=1")
            .set_header("X-Test", "1");

        assert!(matches!(req.error(), Some(RequestError::UrlParse(_))));
        assert!(req.url().is_none());
        assert!(!req.is_materialized());
    }

    #[test]
    fn test_invalid_method_is_deferred() {
        let mock = MockTransport::new();
        let req = Requester::new(Arc::new(mock), "BAD METHOD", "http://x/test");
        assert!(req.error().is_some_and(RequestError::is_configuration));
    }

    #[test]
    fn test_queries_append_and_replace() {
        let mock = MockTransport::new();
        let req = requester(&mock, Method::GET, "http://x/test?z=0")
            .add_query("a=1")
            .add_query(&[("b", "2 3")]);
        assert_eq!(req.url().unwrap().query(), Some("z=0&a=1&b=2+3"));

        let req = req.set_query(&Fields(&json!({"q": "rust"})));
        assert_eq!(req.url().unwrap().query(), Some("q=rust"));

        let req = req.set_query("");
        assert_eq!(req.url().unwrap().query(), None);
    }

    #[test]
    fn test_literal_query_is_normalized() {
        let mock = MockTransport::new();
        let req = requester(&mock, Method::GET, "http://x/test").add_query("q=a b&r=%41");
        assert_eq!(req.url().unwrap().query(), Some("q=a%20b&r=%41"));
    }

    #[tokio::test]
    async fn test_builder_from_error() {
        let req = Requester::from_error(RequestError::configuration("no client"))
            .add_query("a=1")
            .set_header("X-Test", "1");
        assert!(req.transport().is_none());
        assert!(req.url().is_none());

        let err = req.read_bytes().await.unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: no client");
    }

    #[test]
    fn test_encoding_error_absorbs_later_calls() {
        let mock = MockTransport::new();
        let nested = json!({"outer": {"inner": 1}});
        let req = requester(&mock, Method::POST, "http://x/test")
            .set_form_fields(&nested)
            .add_query("a=1")
            .set_raw_body("ignored")
            .set_header("X-Test", "1");

        assert!(req.error().is_some_and(RequestError::is_encoding));
        assert!(req.raw_body().is_none());
        assert!(!req.is_materialized());
    }

    #[test]
    fn test_form_field_accumulation() {
        let mock = MockTransport::new();
        let signup = Signup {
            name: "ann".to_string(),
            roles: vec!["admin".to_string(), "dev".to_string()],
        };
        let req = requester(&mock, Method::POST, "http://x/signup")
            .set_form_fields(&Fields(&signup))
            .add_form_field("roles", "ops")
            .add_form_field("age", 42)
            .set_form_field("name", "bob");

        let fields = req.form_fields().unwrap();
        assert_eq!(fields.get_all("roles"), ["admin", "dev", "ops"]);
        assert_eq!(fields.get("age"), Some("42"));
        assert_eq!(fields.get_all("name"), ["bob"]);
    }

    #[test]
    fn test_raw_and_form_conflict_in_any_order() {
        let mock = MockTransport::new();
        let raw_first = requester(&mock, Method::POST, "http://x/a")
            .set_raw_body("data")
            .add_form_field("k", "v")
            .into_request()
            .unwrap_err();
        let form_first = requester(&mock, Method::POST, "http://x/a")
            .add_form_file(FormFile::from_bytes("f", "f.txt", "x"))
            .set_raw_body(&b"data"[..])
            .into_request()
            .unwrap_err();

        for err in [raw_first, form_first] {
            assert!(err.is_configuration());
            assert!(err.to_string().contains("mutually exclusive"));
        }
    }

    #[test]
    fn test_body_requires_body_bearing_method() {
        let mock = MockTransport::new();
        for method in [Method::GET, Method::DELETE, Method::HEAD, Method::PUT, Method::PATCH] {
            let err = requester(&mock, method.clone(), "http://x/a")
                .add_form_field("k", "v")
                .into_request()
                .unwrap_err();
            assert!(err.to_string().contains("requires the POST method"));

            let err = requester(&mock, method, "http://x/a")
                .set_raw_body("data")
                .into_request()
                .unwrap_err();
            assert!(err.is_configuration());
        }

        let err = requester(&mock, Method::GET, "http://x/a")
            .set_raw_body("data")
            .set_header("X-Test", "1");
        assert!(err.error().is_some_and(RequestError::is_configuration));

        let post = requester(&mock, Method::POST, "http://x/a")
            .set_raw_body("data")
            .into_request();
        assert!(post.is_ok());
    }

    #[test]
    fn test_empty_raw_body_is_no_body() {
        let mock = MockTransport::new();
        let request = requester(&mock, Method::GET, "http://x/a")
            .set_raw_body("")
            .into_request()
            .unwrap();
        assert!(request.body().is_empty());
        assert!(request.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_materialization_is_idempotent() {
        let mock = MockTransport::new();
        let req = requester(&mock, Method::POST, "http://x/a")
            .add_form_field("k", "v")
            .set_header("X-One", "1");
        assert!(req.is_materialized());

        let req = req
            .add_form_field("late", "ignored")
            .add_query("late=1")
            .add_header("X-One", "2")
            .set_header("X-Two", "2");

        let request = req.request().unwrap();
        let ones: Vec<_> = request.headers().get_all("x-one").iter().collect();
        assert_eq!(ones, ["1", "2"]);
        assert_eq!(request.headers()["x-two"], "2");
        assert_eq!(request.url().query(), None);
        assert_eq!(request.body().as_bytes(), Some(&b"k=v"[..]));
        assert!(req.form_fields().is_none());
    }

    #[test]
    fn test_content_type_override_wins_over_form() {
        let mock = MockTransport::new();
        let request = requester(&mock, Method::POST, "http://x/a")
            .content_type("application/vnd.custom")
            .add_form_field("k", "v")
            .into_request()
            .unwrap();
        assert_eq!(request.headers()[header::CONTENT_TYPE], "application/vnd.custom");
    }

    #[test]
    fn test_raw_body_has_no_derived_content_type() {
        let mock = MockTransport::new();
        let request = requester(&mock, Method::POST, "http://x/a")
            .set_raw_body("payload")
            .into_request()
            .unwrap();
        assert!(request.headers().get(header::CONTENT_TYPE).is_none());
        assert_eq!(request.body().as_bytes(), Some(&b"payload"[..]));
    }

    #[test]
    fn test_invalid_header_is_deferred() {
        let mock = MockTransport::new();
        let req = requester(&mock, Method::GET, "http://x/a").set_header("bad header", "v");
        assert!(req.error().is_some_and(RequestError::is_configuration));
    }

    #[test]
    fn test_auth_headers() {
        let mock = MockTransport::new();
        let req = requester(&mock, Method::GET, "http://x/a").basic_auth("user", Some("pass"));
        assert_eq!(
            req.request().unwrap().headers()[header::AUTHORIZATION],
            "Basic dXNlcjpwYXNz"
        );

        let req = req.bearer_auth("token");
        assert_eq!(
            req.request().unwrap().headers()[header::AUTHORIZATION],
            "Bearer token"
        );
    }

    #[tokio::test]
    async fn test_deferred_error_skips_transport() {
        let mock = MockTransport::new();
        let result = requester(&mock, Method::GET, "http://x/a")
            .set_raw_body("data")
            .read_bytes()
            .await;

        assert!(result.unwrap_err().is_configuration());
        assert_eq!(mock.call_count(), 0);
    }
}
