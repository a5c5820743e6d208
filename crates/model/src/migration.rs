use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a migration campaign.
///
/// Transitions only Pending -> InProgress -> {Finished | Stopped}. Stopped is
/// set externally and observed cooperatively by the processor between batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    Pending,
    InProgress,
    Stopped,
    Finished,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::Stopped => "stopped",
            MigrationStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a migration's tasks are carried out. Dispatched once per migration,
/// before the first batch is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Each task is sent to a remote endpoint; path params are appended as
    /// URL segments and the body travels as JSON.
    Http {
        endpoint: String,
        method: String,
        #[serde(default)]
        rollback_endpoint: Option<String>,
        #[serde(default)]
        rollback_method: Option<String>,
    },
    /// Each task is handed to an in-process handler injected by the
    /// embedding application.
    Internal,
}

/// One named migration campaign: which queue to drain, how to execute its
/// tasks, and where the run currently stands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    pub name: String,
    pub queue_name: String,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    pub mode: ExecutionMode,
    #[serde(default)]
    pub status: MigrationStatus,
    /// ETA for the remaining tasks, refreshed after every batch.
    #[serde(default)]
    pub time_left_ms: Option<u64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_num_threads() -> usize {
    1
}

impl Migration {
    pub fn new(name: impl Into<String>, queue_name: impl Into<String>, mode: ExecutionMode) -> Self {
        Migration {
            name: name.into(),
            queue_name: queue_name.into(),
            num_threads: default_num_threads(),
            mode,
            status: MigrationStatus::Pending,
            time_left_ms: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_mode_roundtrips_as_tagged_json() {
        let mode = ExecutionMode::Http {
            endpoint: "http://localhost:8080/accounts".into(),
            method: "POST".into(),
            rollback_endpoint: Some("http://localhost:8080/accounts/rollback".into()),
            rollback_method: Some("DELETE".into()),
        };

        let json = serde_json::to_value(&mode).unwrap();
        assert_eq!(json["type"], "http");
        assert_eq!(json["method"], "POST");

        let back: ExecutionMode = serde_json::from_value(json).unwrap();
        assert_eq!(back, mode);
    }

    #[test]
    fn migration_definition_fills_defaults() {
        let raw = r#"{
            "name": "accounts-to-v2",
            "queue_name": "accounts",
            "mode": { "type": "internal" }
        }"#;

        let migration: Migration = serde_json::from_str(raw).unwrap();
        assert_eq!(migration.status, MigrationStatus::Pending);
        assert_eq!(migration.num_threads, 1);
        assert!(migration.time_left_ms.is_none());
    }

    #[test]
    fn status_display_matches_wire_form() {
        assert_eq!(MigrationStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            serde_json::to_value(MigrationStatus::InProgress).unwrap(),
            "in_progress"
        );
    }
}
