//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use driftsync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse, SyncRecord};
use parking_lot::Mutex;
use std::sync::Arc;

/// A sync transport carries pull and push requests to the remote reconciler.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process, mock for testing, etc.).
pub trait SyncTransport<R: SyncRecord>: Send + Sync {
    /// Pulls the remote delta.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse<R>>;

    /// Pushes a batch of locally modified records.
    fn push(&self, request: &PushRequest<R>) -> SyncResult<PushResponse>;
}

impl<R: SyncRecord, T: SyncTransport<R> + ?Sized> SyncTransport<R> for Arc<T> {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse<R>> {
        (**self).pull(request)
    }

    fn push(&self, request: &PushRequest<R>) -> SyncResult<PushResponse> {
        (**self).push(request)
    }
}

/// A mock transport for testing.
///
/// Pulls return the configured response (empty by default). Pushes return
/// the configured response, or a protocol error if none is set. Every request
/// is recorded.
#[derive(Debug)]
pub struct MockTransport<R> {
    pull_response: Mutex<PullResponse<R>>,
    push_response: Mutex<Option<PushResponse>>,
    failure: Mutex<Option<String>>,
    pulls: Mutex<Vec<PullRequest>>,
    pushes: Mutex<Vec<PushRequest<R>>>,
}

impl<R: SyncRecord> MockTransport<R> {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            pull_response: Mutex::new(PullResponse::new(Vec::new())),
            push_response: Mutex::new(None),
            failure: Mutex::new(None),
            pulls: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
        }
    }

    /// Sets the records returned by pull.
    pub fn set_pull_data(&self, data: Vec<R>) {
        *self.pull_response.lock() = PullResponse::new(data);
    }

    /// Sets the push response.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Makes every following request fail with a retryable transport error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Clears an injected failure.
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Pull requests received so far.
    pub fn pulls(&self) -> Vec<PullRequest> {
        self.pulls.lock().clone()
    }

    /// Push requests received so far.
    pub fn pushes(&self) -> Vec<PushRequest<R>> {
        self.pushes.lock().clone()
    }

    fn check_failure(&self) -> SyncResult<()> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(SyncError::transport_retryable(message.clone())),
            None => Ok(()),
        }
    }
}

impl<R: SyncRecord> Default for MockTransport<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: SyncRecord> SyncTransport<R> for MockTransport<R> {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse<R>> {
        self.pulls.lock().push(request.clone());
        self.check_failure()?;
        Ok(self.pull_response.lock().clone())
    }

    fn push(&self, request: &PushRequest<R>) -> SyncResult<PushResponse> {
        self.pushes.lock().push(request.clone());
        self.check_failure()?;
        self.push_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock push response set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::{DeviceId, Task};

    #[test]
    fn mock_transport_records_requests() {
        let transport = MockTransport::<Task>::new();
        transport.set_pull_data(vec![Task::new("a", "A").at(10)]);

        let response = transport
            .pull(&PullRequest::new(0, DeviceId::new("d1")))
            .unwrap();
        assert_eq!(response.data.len(), 1);
        assert!(response.server_changed);
        assert_eq!(transport.pulls().len(), 1);
        assert!(transport.pulls()[0].is_initial());
    }

    #[test]
    fn mock_transport_requires_push_response() {
        let transport = MockTransport::<Task>::new();
        let request = PushRequest::new(vec![Task::new("a", "A")], None);
        assert!(matches!(
            transport.push(&request),
            Err(SyncError::Protocol(_))
        ));
        assert_eq!(transport.pushes().len(), 1);
    }

    #[test]
    fn injected_failure_is_retryable() {
        let transport = MockTransport::<Task>::new();
        transport.fail_with("connection refused");
        let err = transport
            .pull(&PullRequest::new(5, DeviceId::new("d1")))
            .unwrap_err();
        assert!(err.is_retryable());

        transport.recover();
        assert!(transport.pull(&PullRequest::new(5, DeviceId::new("d1"))).is_ok());
    }
}
