//! Protocol messages for sync.
//!
//! ```text
//! pull:  { last_pull_timestamp?, device_id }  ->  { data: [Record], server_changed }
//! push:  { data: [Record], device_id? }       ->  { success: [{id, new_updated_at}], failed?: [{id, reason}] }
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{DeviceId, SyncRecord, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Pull request from client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Cursor of the previous successful cycle; absent on initial sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pull_timestamp: Option<Timestamp>,
    /// Requesting device, used for echo suppression.
    pub device_id: DeviceId,
}

impl PullRequest {
    /// Creates a pull request. A zero cursor is sent as absent.
    pub fn new(cursor: Timestamp, device_id: DeviceId) -> Self {
        Self {
            last_pull_timestamp: (cursor > 0).then_some(cursor),
            device_id,
        }
    }

    /// Returns the cursor, treating absent as zero.
    pub fn since(&self) -> Timestamp {
        self.last_pull_timestamp.unwrap_or(0)
    }

    /// Returns true if this is an initial (full) pull.
    pub fn is_initial(&self) -> bool {
        self.since() == 0
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }
}

/// Pull response from server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "R: SyncRecord")]
pub struct PullResponse<R> {
    /// Full delta since the requested cursor.
    pub data: Vec<R>,
    /// Whether the delta is non-empty.
    #[serde(default)]
    pub server_changed: bool,
}

impl<R: SyncRecord> PullResponse<R> {
    /// Creates a pull response.
    pub fn new(data: Vec<R>) -> Self {
        let server_changed = !data.is_empty();
        Self {
            data,
            server_changed,
        }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }
}

/// Push request from client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "R: SyncRecord")]
pub struct PushRequest<R> {
    /// Locally modified records.
    pub data: Vec<R>,
    /// Pushing device, used for attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

impl<R: SyncRecord> PushRequest<R> {
    /// Creates a push request.
    pub fn new(data: Vec<R>, device_id: Option<DeviceId>) -> Self {
        Self { data, device_id }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from JSON, failing on the first malformed item.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }

    /// Decodes from JSON item by item.
    ///
    /// The envelope must be an object whose `data` is an array; anything else
    /// is an error. Items that do not decode into `R` are returned as
    /// validation failures so the rest of the batch can proceed.
    pub fn decode_items(
        bytes: &[u8],
    ) -> ProtocolResult<(Option<DeviceId>, Vec<Result<R, PushFailure>>)> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_structure("expected object"))?;

        let items = object
            .get("data")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProtocolError::invalid_structure("\"data\" array expected"))?;

        let device_id = match object.get("device_id") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(serde_json::from_value::<DeviceId>(v.clone())?),
        };

        let decoded = items
            .iter()
            .map(|item| {
                serde_json::from_value::<R>(item.clone()).map_err(|_| {
                    let id = item
                        .get("id")
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                        .unwrap_or(PushFailure::UNKNOWN_ID);
                    PushFailure::new(id, FailureReason::Validation)
                })
            })
            .collect();

        Ok((device_id, decoded))
    }
}

/// A record the server stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAck {
    /// Record id.
    pub id: String,
    /// Server-assigned `updated_at`.
    pub new_updated_at: Timestamp,
}

/// A record the server did not store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushFailure {
    /// Record id, or `"unknown"` if the item had none.
    pub id: String,
    /// Why the item was rejected.
    pub reason: FailureReason,
}

impl PushFailure {
    /// Id reported for items that carry no usable id.
    pub const UNKNOWN_ID: &'static str = "unknown";

    /// Creates a failure entry.
    pub fn new(id: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            id: id.into(),
            reason,
        }
    }
}

/// Reason a pushed record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FailureReason {
    /// Required identifying fields are missing.
    Validation,
    /// The server holds a newer version.
    Conflict,
    /// Any other reason reported by a server.
    Other(String),
}

impl FailureReason {
    const VALIDATION: &'static str = "validation";
    const CONFLICT: &'static str = "conflict: server version newer";

    /// Returns true for last-write-wins rejections.
    pub fn is_conflict(&self) -> bool {
        matches!(self, FailureReason::Conflict)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Validation => f.write_str(Self::VALIDATION),
            FailureReason::Conflict => f.write_str(Self::CONFLICT),
            FailureReason::Other(reason) => f.write_str(reason),
        }
    }
}

impl From<String> for FailureReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::VALIDATION => FailureReason::Validation,
            Self::CONFLICT => FailureReason::Conflict,
            _ => FailureReason::Other(value),
        }
    }
}

impl From<FailureReason> for String {
    fn from(value: FailureReason) -> Self {
        value.to_string()
    }
}

/// Push response from server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Stored records with their new timestamps.
    #[serde(default)]
    pub success: Vec<PushAck>,
    /// Rejected records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<PushFailure>,
}

impl PushResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a stored item.
    pub fn accept(&mut self, id: impl Into<String>, new_updated_at: Timestamp) {
        self.success.push(PushAck {
            id: id.into(),
            new_updated_at,
        });
    }

    /// Records a rejected item.
    pub fn reject(&mut self, id: impl Into<String>, reason: FailureReason) {
        self.failed.push(PushFailure::new(id, reason));
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    #[test]
    fn initial_pull_omits_cursor() {
        let request = PullRequest::new(0, DeviceId::new("d1"));
        let json = String::from_utf8(request.encode().unwrap()).unwrap();
        assert_eq!(json, r#"{"device_id":"d1"}"#);
        assert!(request.is_initial());

        let request = PullRequest::new(1234, DeviceId::new("d1"));
        assert_eq!(request.since(), 1234);
        assert!(!request.is_initial());
    }

    #[test]
    fn pull_response_flags_changes() {
        let empty: PullResponse<Task> = PullResponse::new(vec![]);
        assert!(!empty.server_changed);

        let changed = PullResponse::new(vec![Task::new("a", "A")]);
        assert!(changed.server_changed);
    }

    #[test]
    fn failure_reasons_use_wire_strings() {
        let mut response = PushResponse::new();
        response.reject("x", FailureReason::Validation);
        response.reject("y", FailureReason::Conflict);

        let json: serde_json::Value =
            serde_json::from_slice(&response.encode().unwrap()).unwrap();
        assert_eq!(json["failed"][0]["reason"], "validation");
        assert_eq!(json["failed"][1]["reason"], "conflict: server version newer");

        let decoded = PushResponse::decode(&response.encode().unwrap()).unwrap();
        assert!(decoded.failed[1].reason.is_conflict());
    }

    #[test]
    fn push_response_without_failed_field_decodes() {
        let body = br#"{"success":[{"id":"a","new_updated_at":500}]}"#;
        let response = PushResponse::decode(body).unwrap();
        assert_eq!(response.success[0].new_updated_at, 500);
        assert!(response.failed.is_empty());
    }

    #[test]
    fn unknown_reason_is_preserved() {
        let reason = FailureReason::from("quota exceeded".to_string());
        assert_eq!(reason, FailureReason::Other("quota exceeded".into()));
        assert_eq!(reason.to_string(), "quota exceeded");
    }

    #[test]
    fn decode_items_rejects_non_array_payload() {
        let err = PushRequest::<Task>::decode_items(br#"{"data":{"id":"x"}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStructure(_)));

        let err = PushRequest::<Task>::decode_items(b"[1,2]").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStructure(_)));
    }

    #[test]
    fn decode_items_isolates_bad_items() {
        let body = br#"{"device_id":"d1","data":[{"id":"a","title":"A","updated_at":1},{"id":"b","updated_at":"soon"},{"id":"c","title":"C"},{"title":7}]}"#;
        let (device, items) = PushRequest::<Task>::decode_items(body).unwrap();

        assert_eq!(device, Some(DeviceId::new("d1")));
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].as_ref().unwrap().id, "a");
        assert_eq!(
            items[1].as_ref().unwrap_err(),
            &PushFailure::new("b", FailureReason::Validation)
        );
        assert_eq!(
            items[2].as_ref().unwrap_err(),
            &PushFailure::new("c", FailureReason::Validation)
        );
        assert_eq!(items[3].as_ref().unwrap_err().id, PushFailure::UNKNOWN_ID);
    }
}
