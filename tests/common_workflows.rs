//! Integration tests for common Requester workflows.
//!
//! These tests exercise the package-level constructors and the builder
//! against a scripted transport.

use requester::prelude::*;
use requester::{Method, MockTransport, multipart_boundary};
use serde_json::json;
use std::io::{self, Read};
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn on_mock(mock: &MockTransport, method: Method, url: &str) -> Requester {
    Requester::new(Arc::new(mock.clone()), method, url)
}

// =============================================================================
// Building
// =============================================================================

struct UnreadableFile;

impl Read for UnreadableFile {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("disk gone"))
    }
}

#[test]
fn test_queries_are_appended_in_order() {
    let req = requester::get_with_queries("http://x/test", &[&"a=1"]).add_query("b=2");
    assert_eq!(req.url().unwrap().query(), Some("a=1&b=2"));

    let req = requester::get("http://localhost/search")
        .add_query("a=1")
        .add_query("b=2");
    assert_eq!(req.url().unwrap().query(), Some("a=1&b=2"));
}

#[test]
fn test_only_post_carries_a_body() {
    for method in ["PUT", "PATCH", "DELETE"] {
        let err = requester::new_request(method, "http://localhost/items/1")
            .set_raw_body("data")
            .into_request()
            .unwrap_err();
        assert!(err.is_configuration());
    }
}

#[test]
fn test_new_request_accepts_method_tokens() {
    let req = requester::new_request("OPTIONS", "http://localhost/");
    assert_eq!(req.method(), Some(&Method::OPTIONS));

    let req = requester::new_request(Method::DELETE, "http://localhost/items/1");
    assert_eq!(req.method(), Some(&Method::DELETE));
}

#[test]
fn test_accessors_never_invoke_transport() {
    let mock = MockTransport::new();
    let req = on_mock(&mock, Method::POST, "http://localhost/items")
        .add_query(&[("page", "2")])
        .add_form_field("name", "widget")
        .add_form_file(FormFile::from_bytes("image", "w.png", &b"\x89PNG"[..]));

    assert_eq!(req.method(), Some(&Method::POST));
    assert_eq!(req.url().unwrap().query(), Some("page=2"));
    assert_eq!(req.form_fields().unwrap().get("name"), Some("widget"));
    assert_eq!(req.form_files().len(), 1);
    assert!(req.raw_body().is_none());
    assert!(req.error().is_none());

    let req = req.set_header("X-Trace", "1");
    assert!(req.request().is_some());
    assert_eq!(mock.call_count(), 0);
}

#[test]
fn test_raw_and_form_are_exclusive() {
    let err = requester::post_data("http://localhost/a", "text/plain", "raw")
        .add_form_field("k", "v")
        .into_request()
        .unwrap_err();
    assert!(err.is_configuration());

    let err = requester::post_form("http://localhost/a", &[("k", "v")])
        .set_raw_body("raw")
        .into_request()
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_form_round_trip() {
    let value = json!({"a": "1", "b": ["2", "3"]});
    let request = requester::post_form("http://localhost/form", &value)
        .into_request()
        .unwrap();

    assert_eq!(
        request.headers()["content-type"],
        "application/x-www-form-urlencoded"
    );
    let body = std::str::from_utf8(request.body().as_bytes().unwrap()).unwrap();
    let decoded = FormValues::parse(body).unwrap();
    assert_eq!(decoded.get_all("a"), ["1"]);
    assert_eq!(decoded.get_all("b"), ["2", "3"]);
}

#[test]
fn test_post_json() {
    let request = requester::post_json("http://localhost/items", &json!({"x": 1}))
        .into_request()
        .unwrap();
    assert_eq!(request.headers()["content-type"], "application/json");
    assert_eq!(request.body().as_bytes(), Some(&br#"{"x":1}"#[..]));
}

#[test]
fn test_materialization_happens_once() {
    let req = requester::post("http://localhost/items")
        .add_form_field("k", "v")
        .set_header("X-One", "1")
        .set_header("X-Two", "2")
        .add_form_field("late", "ignored");

    let request = req.into_request().unwrap();
    assert_eq!(request.headers()["x-one"], "1");
    assert_eq!(request.headers()["x-two"], "2");
    assert_eq!(request.body().as_bytes(), Some(&b"k=v"[..]));
}

#[test]
fn test_multipart_form_with_file() {
    let request = requester::post_form("http://localhost/upload", &json!({"name": "a"}))
        .add_form_file(FormFile::from_bytes("file", "a.txt", "hello"))
        .into_request()
        .unwrap();

    let content_type = request.headers()["content-type"].to_str().unwrap().to_string();
    let boundary = multipart_boundary(&content_type).unwrap().to_string();
    assert_eq!(boundary.len(), 60);

    let (_, _, _, body) = request.into_parts();
    let body = String::from_utf8(body.into_bytes().unwrap().to_vec()).unwrap();

    let parts: Vec<&str> = body.split(&format!("--{boundary}")).collect();
    // leading empty segment, two parts, closing "--\r\n"
    assert_eq!(parts.len(), 4);
    assert!(parts[1].contains("name=\"name\"\r\n\r\na\r\n"));
    assert!(parts[2].contains("name=\"file\"; filename=\"a.txt\""));
    assert!(parts[2].contains("Content-Type: application/octet-stream\r\n\r\nhello\r\n"));
    assert_eq!(parts[3], "--\r\n");
}

// =============================================================================
// Execution
// =============================================================================

#[tokio::test]
async fn test_not_found_is_released_once() {
    let mock = MockTransport::new().respond(404, "missing");
    let err = on_mock(&mock, Method::GET, "http://localhost/missing")
        .read_bytes()
        .await
        .unwrap_err();

    match err {
        RequestError::UnexpectedStatus {
            status,
            status_text,
        } => {
            assert_eq!(status, 404);
            assert_eq!(status_text, "404 Not Found");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.call_count(), 1);
    assert_eq!(mock.released_responses(), 1);
}

#[tokio::test]
async fn test_successful_read_is_released_once() {
    let mock = MockTransport::new().respond(200, r#"{"ok":true}"#);
    let value: serde_json::Value = on_mock(&mock, Method::GET, "http://localhost/status")
        .read_json()
        .await
        .unwrap();

    assert_eq!(value["ok"], true);
    assert_eq!(mock.released_responses(), 1);
}

#[tokio::test]
async fn test_transport_error_is_returned_unchanged() {
    let mock = MockTransport::new().fail_with("connection reset by peer");
    let err = on_mock(&mock, Method::GET, "http://localhost/")
        .read_text()
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::Transport(_)));
    assert!(err.to_string().contains("connection reset by peer"));
    assert_eq!(mock.released_responses(), 0);
}

#[tokio::test]
async fn test_transport_sees_materialized_request() {
    let mock = MockTransport::new();
    on_mock(&mock, Method::POST, "http://localhost/notes/1")
        .set_raw_body("new text")
        .content_type("text/plain")
        .bearer_auth("t0ken")
        .read_bytes()
        .await
        .unwrap();

    let recorded = mock.last_request().unwrap();
    assert_eq!(recorded.method, Method::POST);
    assert_eq!(recorded.header("content-type"), Some("text/plain"));
    assert_eq!(recorded.header("authorization"), Some("Bearer t0ken"));
    assert_eq!(recorded.body_text(), "new text");
}

#[tokio::test]
async fn test_unreadable_file_is_encoding_error() {
    let mock = MockTransport::new();
    let err = on_mock(&mock, Method::POST, "http://localhost/upload")
        .add_form_file(FormFile::from_reader("f", "f.bin", UnreadableFile))
        .read_bytes()
        .await
        .unwrap_err();

    assert!(err.is_encoding());
    assert!(err.to_string().contains("disk gone"));
}

#[tokio::test]
async fn test_shared_client_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .and(query_param("name", "world"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello, world"))
        .expect(1)
        .mount(&server)
        .await;

    let text = requester::get(format!("{}/hello", server.uri()))
        .add_query(&Fields(json!({"name": "world"})))
        .read_text()
        .await
        .unwrap();
    assert_eq!(text, "hello, world");
}
