//! Builds a server request from a JSON environment snapshot, answers it and
//! prints the response in wire format.
//!
//! Run with `cargo run --example round_trip`.

use std::error::Error;

use micro_message::{Environment, HttpMessage, RequestMessage, Response, ServerRequest, parse_bytes, serialize};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

const ENVIRONMENT: &str = r#"{
  "server": {
    "REQUEST_METHOD": "POST",
    "SERVER_PROTOCOL": "HTTP/1.1",
    "HTTP_HOST": "example.com:8080",
    "HTTP_ACCEPT": "application/json",
    "CONTENT_TYPE": "application/x-www-form-urlencoded",
    "REQUEST_URI": "/greet?lang=en"
  },
  "files": {
    "avatar": {"tmp_name": "/tmp/php-upload-1", "size": 512, "error": 0, "name": "me.png", "type": "image/png"}
  }
}"#;

fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::TRACE).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut environment: Environment = serde_json::from_str(ENVIRONMENT)?;
    environment.body = Some("name=world".into());

    let request = ServerRequest::from_environment(environment)?;
    info!(
        method = %request.method(),
        uri = %request.uri(),
        host = request.header_line("Host"),
        "received request"
    );

    let name = request
        .parsed_body()
        .and_then(|body| body.as_structured())
        .and_then(|body| body.get("name"))
        .and_then(|name| name.as_str())
        .unwrap_or("stranger");
    let avatar = request.uploaded_files().get("avatar").and_then(|files| files.as_file());
    info!(avatar = ?avatar.and_then(|file| file.client_filename()), "uploaded files");

    let response = Response::builder()
        .status(200)
        .header("Content-Type", "text/plain")
        .body(format!("hello {name}"))
        .build()?;

    let wire = serialize(&response);
    println!("{}", String::from_utf8_lossy(&wire));

    let parsed = parse_bytes(&wire)?;
    info!(status = parsed.status_code(), body = %parsed.body(), "parsed the response back");
    Ok(())
}
