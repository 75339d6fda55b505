//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so the engine does not
//! pick an HTTP library. [`LoopbackClient`] routes requests straight into an
//! in-process server.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use driftsync_protocol::{
    HttpMethod, HttpResponse, PullRequest, PullResponse, PushRequest, PushResponse, SyncRecord,
};
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure to obtain any response from the server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,
    /// The request could not be delivered.
    #[error("connection failed: {0}")]
    Connection(String),
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body.
    fn post(&self, url: &str, body: Vec<u8>, timeout: Duration)
        -> Result<HttpResponse, ClientError>;

    /// Sends a GET request.
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, ClientError>;
}

/// HTTP-based sync transport.
///
/// Requests go to `{base_url}/api/{table}/pull` and `{base_url}/api/{table}/push`
/// as JSON. Non-2xx answers become [`SyncError::Server`].
pub struct HttpTransport<R, C: HttpClient> {
    base_url: String,
    table: String,
    client: C,
    timeout: Duration,
    last_error: RwLock<Option<String>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: SyncRecord, C: HttpClient> HttpTransport<R, C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, table: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.into(),
            client,
            timeout: Duration::from_secs(30),
            last_error: RwLock::new(None),
            _record: PhantomData,
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Fetches the full server table, tombstones included.
    pub fn fetch_all(&self) -> SyncResult<Vec<R>> {
        let url = self.url("");
        let response = self.client.get(&url, self.timeout);
        let body = self.handle(&url, response)?;
        serde_json::from_slice(&body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode listing: {e}")))
    }

    fn url(&self, action: &str) -> String {
        if action.is_empty() {
            format!("{}/api/{}", self.base_url, self.table)
        } else {
            format!("{}/api/{}/{}", self.base_url, self.table, action)
        }
    }

    fn post_json(&self, action: &str, body: Vec<u8>) -> SyncResult<Vec<u8>> {
        let url = self.url(action);
        debug!(%url, bytes = body.len(), "sending request");
        let response = self.client.post(&url, body, self.timeout);
        self.handle(&url, response)
    }

    fn handle(
        &self,
        url: &str,
        response: Result<HttpResponse, ClientError>,
    ) -> SyncResult<Vec<u8>> {
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.set_error(&err.to_string());
                warn!(%url, error = %err, "request failed");
                return Err(match err {
                    ClientError::Timeout => SyncError::Timeout,
                    ClientError::Connection(message) => SyncError::transport_retryable(message),
                });
            }
        };

        if !response.is_success() {
            let message = response.error_message();
            self.set_error(&message);
            warn!(%url, status = response.status, error = %message, "server rejected request");
            return Err(SyncError::Server {
                status: response.status,
                message,
            });
        }

        self.clear_error();
        Ok(response.body)
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }
}

impl<R: SyncRecord, C: HttpClient> SyncTransport<R> for HttpTransport<R, C> {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse<R>> {
        let body = self.post_json("pull", request.encode()?)?;
        PullResponse::decode(&body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode pull response: {e}")))
    }

    fn push(&self, request: &PushRequest<R>) -> SyncResult<PushResponse> {
        let body = self.post_json("push", request.encode()?)?;
        PushResponse::decode(&body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode push response: {e}")))
    }
}

/// Trait for servers that can handle loopback requests.
///
/// Implemented for any `Fn(HttpMethod, &str, &[u8]) -> HttpResponse`, so a
/// server can be plugged in with a closure.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request for `path` (e.g. `/api/tasks/pull`).
    fn handle(&self, method: HttpMethod, path: &str, body: &[u8]) -> HttpResponse;
}

impl<F> LoopbackServer for F
where
    F: Fn(HttpMethod, &str, &[u8]) -> HttpResponse + Send + Sync,
{
    fn handle(&self, method: HttpMethod, path: &str, body: &[u8]) -> HttpResponse {
        self(method, path, body)
    }
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    fn path(url: &str) -> &str {
        url.find("/api/").map_or(url, |i| &url[i..])
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        _timeout: Duration,
    ) -> Result<HttpResponse, ClientError> {
        Ok(self.server.handle(HttpMethod::Post, Self::path(url), &body))
    }

    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, ClientError> {
        Ok(self.server.handle(HttpMethod::Get, Self::path(url), &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::{DeviceId, Task};
    use parking_lot::Mutex;

    struct TestClient {
        response: Mutex<Result<HttpResponse, ClientError>>,
        urls: Mutex<Vec<String>>,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: Mutex::new(Err(ClientError::Connection("no response set".into()))),
                urls: Mutex::new(Vec::new()),
            }
        }

        fn respond(&self, response: Result<HttpResponse, ClientError>) {
            *self.response.lock() = response;
        }
    }

    impl HttpClient for TestClient {
        fn post(
            &self,
            url: &str,
            _body: Vec<u8>,
            _timeout: Duration,
        ) -> Result<HttpResponse, ClientError> {
            self.urls.lock().push(url.to_string());
            self.response.lock().clone()
        }

        fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, ClientError> {
            self.urls.lock().push(url.to_string());
            self.response.lock().clone()
        }
    }

    fn transport(client: TestClient) -> HttpTransport<Task, TestClient> {
        HttpTransport::new("https://sync.example.com/", "tasks", client)
    }

    #[test]
    fn transport_builds_table_routes() {
        let client = TestClient::new();
        client.respond(Ok(HttpResponse::ok(
            PullResponse::new(vec![Task::new("a", "A").at(5)]).encode().unwrap(),
        )));
        let transport = transport(client);
        assert_eq!(transport.base_url(), "https://sync.example.com");

        let response = transport
            .pull(&PullRequest::new(0, DeviceId::new("d1")))
            .unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(
            transport.client.urls.lock().as_slice(),
            ["https://sync.example.com/api/tasks/pull"]
        );
    }

    #[test]
    fn non_success_status_is_a_server_error() {
        let client = TestClient::new();
        client.respond(Ok(HttpResponse::error(400, "\"data\" array expected")));
        let transport = transport(client);

        let err = transport
            .push(&PushRequest::new(Vec::new(), None))
            .unwrap_err();
        match err {
            SyncError::Server { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "\"data\" array expected");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            transport.last_error().as_deref(),
            Some("\"data\" array expected")
        );
    }

    #[test]
    fn client_failures_map_to_sync_errors() {
        let client = TestClient::new();
        client.respond(Err(ClientError::Timeout));
        let transport = transport(client);
        let err = transport
            .pull(&PullRequest::new(1, DeviceId::new("d1")))
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout));

        transport
            .client
            .respond(Err(ClientError::Connection("refused".into())));
        let err = transport
            .pull(&PullRequest::new(1, DeviceId::new("d1")))
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport { retryable: true, .. }));
    }

    #[test]
    fn undecodable_body_is_a_protocol_error() {
        let client = TestClient::new();
        client.respond(Ok(HttpResponse::ok(b"<html>".to_vec())));
        let transport = transport(client);
        let err = transport
            .pull(&PullRequest::new(1, DeviceId::new("d1")))
            .unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(transport.last_error().is_none());
    }

    #[test]
    fn loopback_client_strips_host() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let recorder = std::sync::Arc::clone(&seen);
        let client = LoopbackClient::new(move |method: HttpMethod, path: &str, _body: &[u8]| {
            recorder.lock().push(format!("{method} {path}"));
            HttpResponse::ok(b"[]".to_vec())
        });

        let transport: HttpTransport<Task, _> =
            HttpTransport::new("http://localhost:3000", "tasks", client);
        assert!(transport.fetch_all().unwrap().is_empty());
        assert_eq!(seen.lock().as_slice(), ["GET /api/tasks"]);
    }
}
