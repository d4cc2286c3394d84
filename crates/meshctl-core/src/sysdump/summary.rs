//! Sysdump run results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// File the summary is written to inside the dump directory.
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub name: String,
    pub status: TaskStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskResult {
    pub fn completed(name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            status: TaskStatus::Completed,
            duration_ms: elapsed.as_millis() as u64,
            message: None,
        }
    }

    pub fn failed(name: impl Into<String>, elapsed: Duration, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TaskStatus::Failed,
            duration_ms: elapsed.as_millis() as u64,
            message: Some(message.into()),
        }
    }

    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TaskStatus::Skipped,
            duration_ms: 0,
            message: Some(reason.into()),
        }
    }
}

/// Outcome of one collection, tasks in registration order.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub id: Uuid,
    pub directory: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskResult>,
}

impl Summary {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            directory: directory.into(),
            started_at: Utc::now(),
            finished_at: None,
            tasks: Vec::new(),
        }
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn completed(&self) -> usize {
        self.count(TaskStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TaskStatus::Skipped)
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskResult> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Failed)
    }

    /// Stamp the finish time and write `summary.json` into `dir`.
    pub async fn finish(&mut self, dir: &Path) -> Result<PathBuf> {
        self.finished_at = Some(Utc::now());
        let path = dir.join(SUMMARY_FILE);
        tokio::fs::write(&path, serde_json::to_vec_pretty(self)?).await?;
        Ok(path)
    }
}
