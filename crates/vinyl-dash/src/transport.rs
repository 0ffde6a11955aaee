//! HTTP plumbing between the engine and the server.
//!
//! Components never talk to `reqwest` directly: they build an `ApiRequest`
//! and hand it to a `Transport`.  Production uses `HttpTransport`; tests
//! swap in a scripted transport and a paused clock.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use vinyl_proto::protocol::Ack;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Single-file multipart upload.
    File {
        field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn with_json<T: Serialize>(mut self, payload: &T) -> Self {
        self.body = RequestBody::Json(serde_json::to_value(payload).unwrap_or(Value::Null));
        self
    }

    pub fn with_file(mut self, field: &str, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.body = RequestBody::File {
            field: field.to_string(),
            file_name: file_name.into(),
            bytes,
        };
        self
    }

    /// Value of a JSON body field, mostly for logging and tests.
    pub fn json_field(&self, key: &str) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(v) => v.get(key),
            _ => None,
        }
    }
}

/// Status code plus decoded JSON body (`Null` when the body was empty or,
/// on an error status, not JSON).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `error` string a failing endpoint put in its body, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }

    /// Body of a 2xx response; anything else becomes a `Protocol` error.
    pub fn into_body(self) -> Result<Value, SyncError> {
        if self.is_success() {
            return Ok(self.body);
        }
        Err(match self.error_message() {
            Some(msg) => SyncError::Protocol(format!("HTTP {}: {}", self.status, msg)),
            None => SyncError::Protocol(format!("HTTP {}", self.status)),
        })
    }

    pub fn parse<T: DeserializeOwned>(self) -> Result<T, SyncError> {
        let body = self.into_body()?;
        serde_json::from_value(body).map_err(|e| SyncError::Protocol(format!("unexpected body: {}", e)))
    }

    /// Like `parse`, but also accepts error statuses whose body is still a
    /// JSON object.  The `/api/pixoo/*` endpoints report failures that way.
    pub fn parse_object<T: DeserializeOwned>(self) -> Result<T, SyncError> {
        if !self.body.is_object() {
            return self.parse();
        }
        serde_json::from_value(self.body)
            .map_err(|e| SyncError::Protocol(format!("unexpected body: {}", e)))
    }
}

/// Interpret an `{ok, error?}` acknowledgement from a `/api/pixoo/*` endpoint.
/// A refusal means the server could not drive the physical device.
pub fn device_ack(response: ApiResponse) -> Result<Ack, SyncError> {
    read_ack(response, SyncError::DeviceUnreachable)
}

/// Interpret an `{ok, error?}` acknowledgement from a server-side endpoint.
pub fn server_ack(response: ApiResponse) -> Result<Ack, SyncError> {
    read_ack(response, SyncError::Protocol)
}

fn read_ack(response: ApiResponse, rejected: fn(String) -> SyncError) -> Result<Ack, SyncError> {
    let status = response.status;
    let success = response.is_success();
    let ack: Ack = match serde_json::from_value(response.body) {
        Ok(ack) => ack,
        Err(_) if !success => return Err(SyncError::Protocol(format!("HTTP {}", status))),
        Err(e) => return Err(SyncError::Protocol(format!("malformed acknowledgement: {}", e))),
    };
    if ack.ok && success {
        return Ok(ack);
    }
    match ack.error {
        Some(msg) => Err(rejected(msg)),
        None if !success => Err(SyncError::Protocol(format!("HTTP {}", status))),
        None => Err(rejected("Unknown error".to_string())),
    }
}

pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<ApiResponse, SyncError>>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// `reqwest`-backed transport rooted at the server base URL.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| SyncError::Validation(format!("bad server URL {:?}: {}", base_url, e)))?;
        // Joined paths keep any prefix only under a trailing slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vinyl-dash/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `path` resolved under the base URL, prefix included.
    pub fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SyncError::Validation(format!("bad path {:?}: {}", path, e)))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<ApiResponse, SyncError>> {
        let client = self.client.clone();
        let url = self.endpoint(&request.path);
        async move {
            let url = url?;
            let mut builder = match request.method {
                Method::Get => client.get(url),
                Method::Post => client.post(url),
                Method::Delete => client.delete(url),
            };
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Json(v) => builder.json(&v),
                RequestBody::File {
                    field,
                    file_name,
                    bytes,
                } => builder.multipart(Form::new().part(field, Part::bytes(bytes).file_name(file_name))),
            };

            let response = builder.send().await.map_err(network_error)?;
            let status = response.status().as_u16();
            let text = response.text().await.map_err(network_error)?;
            debug!("http: {:?} {} -> {} ({} bytes)", request.method, request.path, status, text.len());

            let body = if text.trim().is_empty() {
                Value::Null
            } else {
                match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) if (200..300).contains(&status) => {
                        return Err(SyncError::Protocol(format!(
                            "malformed JSON from {}: {}",
                            request.path, e
                        )))
                    }
                    // Error pages are often HTML; the status code says enough.
                    Err(_) => Value::Null,
                }
            };
            Ok(ApiResponse { status, body })
        }
        .boxed()
    }
}

fn network_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Network(format!("timed out: {}", e))
    } else {
        SyncError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vinyl_proto::protocol::paths;

    #[test]
    fn test_into_body_surfaces_server_error_text() {
        let r = ApiResponse::with_status(500, json!({"ok": false, "error": "boom"}));
        assert_eq!(
            r.into_body(),
            Err(SyncError::Protocol("HTTP 500: boom".to_string()))
        );
        let r = ApiResponse::with_status(502, Value::Null);
        assert_eq!(r.into_body(), Err(SyncError::Protocol("HTTP 502".to_string())));
    }

    #[test]
    fn test_device_ack_refusal_is_device_unreachable() {
        let r = ApiResponse::with_status(500, json!({"ok": false, "error": "Pixoo not reachable"}));
        assert_eq!(
            device_ack(r),
            Err(SyncError::DeviceUnreachable("Pixoo not reachable".to_string()))
        );
        let r = ApiResponse::ok(json!({"ok": false}));
        assert_eq!(
            device_ack(r),
            Err(SyncError::DeviceUnreachable("Unknown error".to_string()))
        );
    }

    #[test]
    fn test_server_ack() {
        assert!(server_ack(ApiResponse::ok(json!({"ok": true}))).is_ok());
        assert_eq!(
            server_ack(ApiResponse::with_status(404, Value::Null)),
            Err(SyncError::Protocol("HTTP 404".to_string()))
        );
        assert!(matches!(
            server_ack(ApiResponse::ok(json!("yes"))),
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::get("/api/lyrics")
            .with_query("artist", "Can")
            .with_query("title", "Vitamin C");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.query.len(), 2);

        let req = ApiRequest::post("/api/pixoo/brightness")
            .with_json(&vinyl_proto::protocol::BrightnessRequest { brightness: 40 });
        assert_eq!(req.json_field("brightness"), Some(&json!(40)));
    }

    #[test]
    fn test_endpoint_keeps_base_path_prefix() {
        let timeout = Duration::from_secs(1);
        let t = HttpTransport::new("http://host:8080/vinyl", timeout).unwrap();
        assert_eq!(t.endpoint("/api/status").unwrap().as_str(), "http://host:8080/vinyl/api/status");

        let t = HttpTransport::new("http://host:8080/vinyl/", timeout).unwrap();
        assert_eq!(
            t.endpoint(paths::PIXOO_BRIGHTNESS).unwrap().as_str(),
            "http://host:8080/vinyl/api/pixoo/brightness"
        );

        let t = HttpTransport::new("http://host:8080", timeout).unwrap();
        assert_eq!(t.endpoint("/api/status").unwrap().as_str(), "http://host:8080/api/status");
    }

    #[test]
    fn test_http_transport_rejects_bad_base_url() {
        assert!(matches!(
            HttpTransport::new("not a url", Duration::from_secs(1)),
            Err(SyncError::Validation(_))
        ));
    }
}
