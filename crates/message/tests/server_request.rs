use indoc::indoc;
use micro_message::{
    Environment, HttpMessage, ParsedBody, Request, RequestMessage, ServerRequest, Uri,
};
use serde::Deserialize;
use serde_json::json;

fn from_fixture(fixture: &str) -> ServerRequest {
    let environment: Environment = serde_json::from_str(fixture).unwrap();
    ServerRequest::from_environment(environment).unwrap()
}

#[test]
fn host_follows_the_uri() {
    let request = Request::new(http::Method::GET, Uri::parse("http://example.com/x").unwrap());
    assert_eq!(request.header_line("Host"), "example.com");

    let moved = request.with_uri(Uri::parse("http://example.com:8080/x").unwrap(), false);
    assert_eq!(moved.header_line("Host"), "example.com:8080");
    assert_eq!(moved.headers().iter().next().map(|(name, _)| name), Some("Host"));

    let preserved = moved.with_uri(Uri::parse("http://other.example.com/y").unwrap(), true);
    assert_eq!(preserved.header_line("Host"), "example.com:8080");
    assert_eq!(preserved.uri().host(), "other.example.com");

    let hostless = moved.with_uri(Uri::parse("/relative").unwrap(), false);
    assert_eq!(hostless.header_line("Host"), "example.com:8080");
}

#[test]
fn standard_ports_are_hidden() {
    assert_eq!(Uri::parse("http://example.com:80/").unwrap().port(), None);
    assert_eq!(Uri::parse("http://example.com:8080/").unwrap().port(), Some(8080));
    assert_eq!(Uri::parse("https://example.com:443/").unwrap().to_string(), "https://example.com/");
}

#[test]
fn request_target_defaults() {
    let request = Request::new(http::Method::GET, Uri::parse("http://h/a/b?c=1").unwrap());
    assert_eq!(request.request_target(), "/a/b?c=1");

    let request = Request::new(http::Method::GET, Uri::parse("http://h").unwrap());
    assert_eq!(request.request_target(), "/");
}

#[test]
fn full_environment() {
    let request = from_fixture(indoc! {r#"
        {
          "server": {
            "REQUEST_METHOD": "POST",
            "SERVER_PROTOCOL": "HTTP/2.0",
            "HTTPS": "on",
            "HTTP_HOST": "shop.example.com",
            "HTTP_COOKIE": "cart=42",
            "REQUEST_URI": "/checkout?step=2&coupon=SPRING"
          },
          "post": {"address": "Main street 1"},
          "files": {
            "docs": {
              "tmp_name": ["/tmp/php-a", "/tmp/php-b"],
              "size": [10, 20],
              "error": [0, 4],
              "name": ["a.pdf", null],
              "type": ["application/pdf", null]
            }
          }
        }
    "#});

    assert_eq!(request.method(), "POST");
    assert_eq!(request.protocol_version().as_str(), "2.0");
    assert_eq!(request.uri().to_string(), "https://shop.example.com/checkout?step=2&coupon=SPRING");
    assert_eq!(request.cookie_params().get("cart"), Some(&json!("42")));
    assert_eq!(request.parsed_body(), Some(&ParsedBody::Structured(json!({"address": "Main street 1"}))));

    #[derive(Deserialize)]
    struct Checkout {
        step: u8,
        coupon: String,
    }
    let checkout = request.query_as::<Checkout>().unwrap();
    assert_eq!(checkout.step, 2);
    assert_eq!(checkout.coupon, "SPRING");

    let docs = request.uploaded_files().get("docs").unwrap();
    let first = docs.get("0").and_then(|doc| doc.as_file()).unwrap();
    let second = docs.get("1").and_then(|doc| doc.as_file()).unwrap();
    assert_eq!(first.client_filename(), Some("a.pdf"));
    assert_eq!(first.size(), 10);
    assert_eq!(second.error(), micro_message::UploadErrorCode::NoFile);
    assert_eq!(second.client_filename(), None);
}

#[test]
fn derived_requests_leave_the_original_alone() {
    let request = from_fixture(r#"{"server": {"HTTP_HOST": "example.com", "REQUEST_URI": "/"}}"#);

    let tagged = request.with_attribute("route", "home").with_header("X-Request-Id", "abc").unwrap();
    assert_eq!(tagged.attribute("route"), Some(&json!("home")));
    assert_eq!(tagged.header_line("x-request-id"), "abc");

    assert!(request.attribute("route").is_none());
    assert!(!request.has_header("x-request-id"));
}
