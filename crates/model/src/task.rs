use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a single task. Failed is terminal; a failed task is never
/// re-enqueued automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work inside a migration's queue.
///
/// `params`/`rollback_params` feed the internal strategy and live only in
/// memory: the producer supplies them at publish time and they are never
/// persisted, so a restart loses them (spec'd behavior, not an accident).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationTask {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub rollback_error_message: Option<String>,
    #[serde(default)]
    pub http_body: Option<serde_json::Value>,
    #[serde(default)]
    pub http_params: Vec<String>,
    #[serde(skip)]
    pub params: Option<serde_json::Value>,
    #[serde(skip)]
    pub rollback_params: Option<serde_json::Value>,
}

impl MigrationTask {
    pub fn new(name: impl Into<String>) -> Self {
        MigrationTask {
            id: Uuid::new_v4(),
            name: name.into(),
            status: TaskStatus::Pending,
            error_message: None,
            rollback_error_message: None,
            http_body: None,
            http_params: Vec::new(),
            params: None,
            rollback_params: None,
        }
    }

    pub fn with_http_body(mut self, body: serde_json::Value) -> Self {
        self.http_body = Some(body);
        self
    }

    pub fn with_http_params(mut self, params: Vec<String>) -> Self {
        self.http_params = params;
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_rollback_params(mut self, params: serde_json::Value) -> Self {
        self.rollback_params = Some(params);
        self
    }
}
