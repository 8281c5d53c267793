//! Batch reports and the last-execution record.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::watermark::Watermark;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// No listing changed since the watermark; nothing was written.
    Empty,
    Committed,
}

/// Summary of one successful batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub watermark: Watermark,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub candidates: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    pub columns_added: usize,
    /// Emitted rows per `event_type/event_action`.
    pub events: BTreeMap<String, usize>,
    pub warnings: usize,
    pub status: BatchStatus,
}

impl BatchReport {
    pub fn empty(batch_id: Uuid, watermark: Watermark, started_at: DateTime<Utc>) -> Self {
        Self {
            batch_id,
            watermark,
            started_at,
            finished_at: Utc::now(),
            candidates: 0,
            inserted: 0,
            skipped_existing: 0,
            columns_added: 0,
            events: BTreeMap::new(),
            warnings: 0,
            status: BatchStatus::Empty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    NeverRun,
    Running,
    Succeeded,
    Failed,
}

/// What the most recent run did, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub report: Option<BatchReport>,
    pub error: Option<String>,
}

impl Default for ExecutionRecord {
    fn default() -> Self {
        Self {
            status: ExecutionStatus::NeverRun,
            started_at: None,
            finished_at: None,
            attempts: 0,
            report: None,
            error: None,
        }
    }
}

/// Shared holder of the last execution record.
#[derive(Debug, Default)]
pub struct LastExecution {
    record: RwLock<ExecutionRecord>,
}

impl LastExecution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.update(|r| {
            *r = ExecutionRecord {
                status: ExecutionStatus::Running,
                started_at: Some(Utc::now()),
                ..ExecutionRecord::default()
            };
        });
    }

    pub fn attempt(&self) {
        self.update(|r| r.attempts += 1);
    }

    pub fn succeed(&self, report: BatchReport) {
        self.update(|r| {
            r.status = ExecutionStatus::Succeeded;
            r.finished_at = Some(Utc::now());
            r.report = Some(report);
            r.error = None;
        });
    }

    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|r| {
            r.status = ExecutionStatus::Failed;
            r.finished_at = Some(Utc::now());
            r.error = Some(error);
        });
    }

    pub fn snapshot(&self) -> ExecutionRecord {
        self.record.read().map(|r| r.clone()).unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut ExecutionRecord)) {
        if let Ok(mut record) = self.record.write() {
            f(&mut record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tracks_lifecycle() {
        let last = LastExecution::new();
        assert_eq!(last.snapshot().status, ExecutionStatus::NeverRun);

        last.start();
        last.attempt();
        last.attempt();
        let running = last.snapshot();
        assert_eq!(running.status, ExecutionStatus::Running);
        assert_eq!(running.attempts, 2);
        assert!(running.started_at.is_some());

        last.fail("fact store timeout: commit");
        let failed = last.snapshot();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("fact store timeout: commit"));

        last.start();
        let report = BatchReport::empty(Uuid::now_v7(), Watermark::FullRebuild, Utc::now());
        last.succeed(report.clone());
        let succeeded = last.snapshot();
        assert_eq!(succeeded.status, ExecutionStatus::Succeeded);
        assert_eq!(succeeded.attempts, 0);
        assert_eq!(succeeded.report, Some(report));
        assert!(succeeded.error.is_none());
    }

    #[test]
    fn report_serializes_watermark_and_status() {
        let report = BatchReport::empty(Uuid::now_v7(), Watermark::FullRebuild, Utc::now());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "empty");
        assert_eq!(json["watermark"]["kind"], "full_rebuild");
    }
}
