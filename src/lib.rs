// Requester - chained HTTP requests with deferred errors
//
// This library re-exports the request builder and provides package-level
// constructors bound to a shared default client. If the default client cannot
// be built, the failure is deferred into every builder these constructors
// return.

pub use requester_http::*;

use serde::Serialize;

fn with_shared(build: impl FnOnce(&HttpClient) -> Requester) -> Requester {
    match HttpClient::shared() {
        Ok(client) => build(&client),
        Err(e) => Requester::from_error(e),
    }
}

/// Create a request builder on the shared default client.
///
/// The method may be a [`Method`] or a method token such as `"OPTIONS"`.
pub fn new_request<M>(method: M, url: impl AsRef<str>) -> Requester
where
    Method: TryFrom<M>,
    <Method as TryFrom<M>>::Error: Into<http::Error>,
{
    with_shared(|client| client.request(method, url))
}

/// Create a GET request builder on the shared default client.
pub fn get(url: impl AsRef<str>) -> Requester {
    with_shared(|client| client.get(url))
}

/// Create a GET request builder with query values appended in order.
///
/// ```
/// let req = requester::get_with_queries("http://x/test", &[&"a=1"]).add_query("b=2");
/// assert_eq!(req.url().unwrap().query(), Some("a=1&b=2"));
/// ```
pub fn get_with_queries(url: impl AsRef<str>, values: &[&dyn Encodable]) -> Requester {
    with_shared(|client| client.get_with_queries(url, values))
}

/// Create a POST request builder on the shared default client.
pub fn post(url: impl AsRef<str>) -> Requester {
    with_shared(|client| client.post(url))
}

/// POST an opaque body with an explicit content type.
pub fn post_data<V: RawData + ?Sized>(
    url: impl AsRef<str>,
    content_type: impl Into<String>,
    value: &V,
) -> Requester {
    with_shared(|client| client.post_data(url, content_type, value))
}

/// POST a value serialized as JSON.
pub fn post_json<T: Serialize + ?Sized>(url: impl AsRef<str>, value: &T) -> Requester {
    with_shared(|client| client.post_json(url, value))
}

/// POST form fields.
pub fn post_form<V: Encodable + ?Sized>(url: impl AsRef<str>, value: &V) -> Requester {
    with_shared(|client| client.post_form(url, value))
}

// Prelude for common imports
pub mod prelude {
    pub use crate::{get, get_with_queries, new_request, post, post_data, post_form, post_json};
    pub use requester_http::prelude::*;
}
