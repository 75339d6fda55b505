//! The `tasks` table.

use crate::record::{SyncRecord, Timestamp};
use serde::{Deserialize, Serialize};

/// A task, the reference synchronized table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier.
    #[serde(default)]
    pub id: String,
    /// Task title. Required for a push to be accepted.
    #[serde(default)]
    pub title: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Last write time. Required on the wire.
    pub updated_at: Timestamp,
    /// Tombstone time.
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
    /// Creating device.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Last writing device.
    #[serde(default)]
    pub updated_by: Option<String>,
    /// Deleting device.
    #[serde(default)]
    pub deleted_by: Option<String>,
}

impl Task {
    /// Wire and storage name of the table.
    pub const TABLE: &'static str = "tasks";

    /// Creates a task with the given id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Generates a fresh task id.
    pub fn generate_id() -> String {
        format!("task-{}", uuid::Uuid::new_v4())
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets `updated_at`.
    pub fn at(mut self, updated_at: Timestamp) -> Self {
        self.updated_at = updated_at;
        self
    }
}

impl SyncRecord for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: Timestamp) {
        self.updated_at = at;
    }

    fn deleted_at(&self) -> Option<Timestamp> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<Timestamp>) {
        self.deleted_at = at;
    }

    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    fn set_created_by(&mut self, device: Option<String>) {
        self.created_by = device;
    }

    fn updated_by(&self) -> Option<&str> {
        self.updated_by.as_deref()
    }

    fn set_updated_by(&mut self, device: Option<String>) {
        self.updated_by = device;
    }

    fn deleted_by(&self) -> Option<&str> {
        self.deleted_by.as_deref()
    }

    fn set_deleted_by(&mut self, device: Option<String>) {
        self.deleted_by = device;
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("missing id".into());
        }
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => Ok(()),
            _ => Err("missing title".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_requires_id_and_title() {
        assert!(Task::new("t1", "Buy milk").validate().is_ok());
        assert!(Task::new("", "Buy milk").validate().is_err());

        let untitled = Task {
            id: "x".into(),
            ..Task::default()
        };
        assert_eq!(untitled.validate(), Err("missing title".into()));
    }

    #[test]
    fn missing_optional_fields_decode_to_defaults() {
        let task: Task = serde_json::from_str(r#"{"id":"x","updated_at":5}"#).unwrap();
        assert_eq!(task.id, "x");
        assert!(task.title.is_none());
        assert_eq!(task.updated_at, 5);
        assert!(!task.is_deleted());
    }

    #[test]
    fn updated_at_is_required() {
        assert!(serde_json::from_str::<Task>(r#"{"id":"x","title":"t"}"#).is_err());
    }

    #[test]
    fn generated_ids_are_prefixed() {
        assert!(Task::generate_id().starts_with("task-"));
    }
}
