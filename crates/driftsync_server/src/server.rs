//! HTTP routing for the reconciler.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::reconciler::Reconciler;
use driftsync_protocol::{
    HttpMethod, HttpResponse, PullRequest, PushRequest, PushResponse, SyncRecord,
};
use driftsync_store::RecordStore;
use tracing::{debug, error, warn};

/// The sync server.
///
/// Maps requests onto the [`Reconciler`]:
///
/// | Method | Path                 | Body                 |
/// |--------|----------------------|----------------------|
/// | POST   | `/api/<table>/pull`  | `PullRequest`        |
/// | POST   | `/api/<table>/push`  | `PushRequest`        |
/// | GET    | `/api/<table>`       | (none), full listing |
///
/// Errors are answered with `{"error": "..."}`: 400 for malformed requests,
/// 404 for unknown routes, 500 for store failures.
///
/// # Example
///
/// ```
/// use driftsync_protocol::{HttpMethod, Task};
/// use driftsync_server::{Reconciler, ServerConfig, SyncServer};
/// use driftsync_store::{InMemoryBackend, Table};
///
/// let table: Table<Task, _> = Table::open("tasks", InMemoryBackend::new()).unwrap();
/// let reconciler: Reconciler<Task, _> = Reconciler::open(table).unwrap();
/// let server = SyncServer::new(ServerConfig::default(), reconciler);
///
/// let response = server.handle(HttpMethod::Get, "/api/tasks", b"");
/// assert_eq!(response.status, 200);
/// assert_eq!(response.body, b"[]");
/// ```
pub struct SyncServer<R, S> {
    config: ServerConfig,
    reconciler: Reconciler<R, S>,
}

impl<R, S> SyncServer<R, S>
where
    R: SyncRecord,
    S: RecordStore<R>,
{
    /// Creates a new sync server.
    pub fn new(config: ServerConfig, reconciler: Reconciler<R, S>) -> Self {
        Self { config, reconciler }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the reconciler.
    pub fn reconciler(&self) -> &Reconciler<R, S> {
        &self.reconciler
    }

    /// Handles one request.
    pub fn handle(&self, method: HttpMethod, path: &str, body: &[u8]) -> HttpResponse {
        match self.route(method, path, body) {
            Ok(body) => HttpResponse::ok(body),
            Err(e) => {
                if e.is_server_error() {
                    error!(%method, path, error = %e, "request failed");
                } else {
                    warn!(%method, path, error = %e, "request rejected");
                }
                HttpResponse::error(e.status_code(), e.to_string())
            }
        }
    }

    /// Handles a pull request body.
    pub fn handle_pull(&self, body: &[u8]) -> ServerResult<Vec<u8>> {
        let request = PullRequest::decode(body)?;
        let response = self.reconciler.pull(&request)?;
        response.encode().map_err(internal)
    }

    /// Handles a push request body.
    pub fn handle_push(&self, body: &[u8]) -> ServerResult<PushResponse> {
        let (device_id, items) = PushRequest::<R>::decode_items(body)?;
        if items.len() > self.config.max_push_batch {
            return Err(ServerError::BatchTooLarge {
                size: items.len(),
                max: self.config.max_push_batch,
            });
        }
        self.reconciler.push_items(device_id.as_ref(), items)
    }

    /// Handles a full listing.
    pub fn handle_list(&self) -> ServerResult<Vec<u8>> {
        let records = self.reconciler.list()?;
        serde_json::to_vec(&records).map_err(internal)
    }

    fn route(&self, method: HttpMethod, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
        let not_found = || ServerError::NotFound(format!("{method} {path}"));

        let rest = path
            .strip_prefix("/api/")
            .and_then(|rest| rest.strip_prefix(self.config.table.as_str()))
            .ok_or_else(not_found)?;

        debug!(%method, path, bytes = body.len(), "routing request");
        match (method, rest) {
            (HttpMethod::Get, "") => self.handle_list(),
            (HttpMethod::Post, "/pull") => self.handle_pull(body),
            (HttpMethod::Post, "/push") => self.handle_push(body)?.encode().map_err(internal),
            _ => Err(not_found()),
        }
    }
}

fn internal(err: impl std::fmt::Display) -> ServerError {
    ServerError::Internal(err.to_string())
}
