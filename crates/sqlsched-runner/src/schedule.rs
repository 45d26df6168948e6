//! Schedule document model and the two-level failure-policy resolver.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use sqlsched_sql::DbType;

/// Failure handling policy attached to a schedule or an individual task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// A failure aborts the enclosing scope.
    Stop,
    /// A failure is recorded and skipped past.
    Continue,
}

impl ErrorPolicy {
    /// Effective policy for a task: an explicit task-level policy always
    /// wins over the schedule-level fallback. This is the single place
    /// the two levels meet; both the validation-abort and the
    /// execution-abort decisions go through here.
    pub fn resolve(task: Option<ErrorPolicy>, schedule: ErrorPolicy) -> ErrorPolicy {
        task.unwrap_or(schedule)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPolicy::Stop => "stop",
            ErrorPolicy::Continue => "continue",
        }
    }
}

/// Top-level unit of work: one database target, many tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub schedule_name: String,
    pub policy_when_error: ErrorPolicy,
    #[serde(default)]
    pub db_type: Option<DbType>,
    #[serde(default)]
    pub db_url: Option<String>,
    #[serde(default)]
    pub db_user: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
    /// Optional override for where the outcome trail is written.
    #[serde(default)]
    pub result_file_path: Option<PathBuf>,
    #[serde(default)]
    pub task_list: Vec<Task>,
}

impl Schedule {
    /// Loads and deserializes a schedule document from a JSON file.
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading schedule document {}", path.display()))?;
        let schedule: Schedule = serde_json::from_str(&raw)
            .with_context(|| format!("parsing schedule document {}", path.display()))?;
        Ok(schedule)
    }
}

/// Ordered group of SQL entries sharing one transaction and one
/// effective policy. Entries are literal statements, or paths ending in
/// `.sql` whose contents are resolved during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_name: String,
    #[serde(default)]
    pub policy_when_error: Option<ErrorPolicy>,
    #[serde(default)]
    pub sql_list: Vec<String>,
}

impl Task {
    pub fn effective_policy(&self, schedule: &Schedule) -> ErrorPolicy {
        ErrorPolicy::resolve(self.policy_when_error, schedule.policy_when_error)
    }
}
