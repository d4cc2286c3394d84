//! Connectivity run results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestResult {
    pub fn passed(name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Passed,
            duration_ms: elapsed.as_millis() as u64,
            message: None,
        }
    }

    pub fn failed(name: impl Into<String>, elapsed: Duration, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Failed,
            duration_ms: elapsed.as_millis() as u64,
            message: Some(message.into()),
        }
    }

    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Skipped,
            duration_ms: 0,
            message: Some(reason.into()),
        }
    }
}

/// Results of one connectivity run, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<TestResult>,
}

impl Report {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: TestResult) {
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// Tests that actually ran.
    pub fn executed(&self) -> usize {
        self.passed() + self.failed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.status == TestStatus::Failed)
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}
