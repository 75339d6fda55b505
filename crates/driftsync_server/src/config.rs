//! Server configuration.

use driftsync_protocol::Task;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Table served under `/api/<table>`.
    pub table: String,
    /// Maximum number of items in one push request.
    pub max_push_batch: usize,
}

impl ServerConfig {
    /// Serves `table` with the default batch limit.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            max_push_batch: 1000,
        }
    }

    /// Sets the served table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(Task::TABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.table, "tasks");
        assert_eq!(config.max_push_batch, 1000);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("tasks")
            .with_table("notes")
            .with_max_push_batch(50);

        assert_eq!(config.table, "notes");
        assert_eq!(config.max_push_batch, 50);
    }
}
