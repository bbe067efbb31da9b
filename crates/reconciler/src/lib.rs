//! Pull-based deadline reconciliation.
//!
//! Nothing fires when a deadline passes; instead callers invoke
//! [`Reconciler::check_overdue`] on whatever cadence suits them (a
//! timer, an incoming message, a manual menu tap). Each sweep moves
//! expired `todo`/`in_progress` tasks to `overdue` exactly once and
//! reports the newly flipped tasks. The reconciler also owns the
//! retention sweep that clears old terminal tasks.

use chrono::{DateTime, Duration, Utc};
use database::{task, Database, DatabaseError, Priority, Task};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from reconciliation.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// What happens to terminal tasks older than the retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveMode {
    /// Delete outright.
    Purge,
    /// Copy into the `tasks_archive` table, then delete.
    #[default]
    MoveToArchive,
}

/// Reconciler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Terminal tasks untouched for this many days are swept.
    pub retention_days: u32,
    pub archive_mode: ArchiveMode,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            retention_days: 14,
            archive_mode: ArchiveMode::MoveToArchive,
        }
    }
}

/// A task the latest sweep flipped to `overdue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverdueNotice {
    pub task_id: i64,
    pub description: String,
    pub title: Option<String>,
    pub assignee_id: Option<i64>,
    pub assignee_name: Option<String>,
    pub deadline: DateTime<Utc>,
    /// Hours past the deadline, rounded to one decimal, never negative.
    pub hours_overdue: f64,
    pub priority: Priority,
    pub chat_id: i64,
}

impl OverdueNotice {
    fn from_task(task: &Task, deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let hours = (now - deadline).num_minutes() as f64 / 60.0;
        Self {
            task_id: task.id,
            description: task.description.clone(),
            title: task.title.clone(),
            assignee_id: task.assignee_id,
            assignee_name: task.assignee_name.clone(),
            deadline,
            hours_overdue: (hours.max(0.0) * 10.0).round() / 10.0,
            priority: task.priority,
            chat_id: task.chat_id,
        }
    }
}

/// Sweeps deadlines and retention on demand.
#[derive(Debug, Clone)]
pub struct Reconciler {
    db: Database,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(db: Database) -> Self {
        Self::with_config(db, ReconcilerConfig::default())
    }

    pub fn with_config(db: Database, config: ReconcilerConfig) -> Self {
        Self { db, config }
    }

    /// Flip expired active tasks to `overdue` and report them.
    ///
    /// Idempotent: a task already marked `overdue` is never reported
    /// again. Each task is claimed individually with a status guard, so
    /// a concurrent user transition (or a failure on one task) never
    /// blocks the rest of the sweep.
    pub async fn check_overdue(
        &self,
        chat_id: Option<i64>,
    ) -> Result<Vec<OverdueNotice>, ReconcilerError> {
        let now = Utc::now();
        let candidates = task::overdue_candidates(self.db.pool(), chat_id, now).await?;
        let mut notices = Vec::new();

        for candidate in candidates {
            let Some(deadline) = candidate.deadline else {
                continue;
            };
            match task::claim_overdue(self.db.pool(), candidate.id).await {
                Ok(true) => notices.push(OverdueNotice::from_task(&candidate, deadline, now)),
                Ok(false) => {
                    tracing::debug!(task_id = candidate.id, "task claimed elsewhere, skipping");
                }
                Err(err) => {
                    tracing::warn!(task_id = candidate.id, error = %err, "overdue claim failed");
                }
            }
        }

        if !notices.is_empty() {
            tracing::info!(count = notices.len(), "tasks moved to overdue");
        }
        Ok(notices)
    }

    /// Active tasks whose deadline falls within the next
    /// `window_hours`, soonest first.
    pub async fn upcoming(
        &self,
        chat_id: Option<i64>,
        window_hours: u32,
    ) -> Result<Vec<Task>, ReconcilerError> {
        let now = Utc::now();
        let until = now + Duration::hours(window_hours as i64);
        let tasks = task::upcoming_tasks(self.db.pool(), chat_id, now, until).await?;
        Ok(tasks)
    }

    /// Sweep terminal tasks older than the retention window, applying
    /// the configured [`ArchiveMode`]. Returns the number swept.
    pub async fn archive_old_tasks(&self, chat_id: Option<i64>) -> Result<u64, ReconcilerError> {
        let cutoff = Utc::now() - Duration::days(self.config.retention_days as i64);
        let swept = match self.config.archive_mode {
            ArchiveMode::Purge => {
                task::purge_old_terminal(self.db.pool(), chat_id, cutoff).await?
            }
            ArchiveMode::MoveToArchive => {
                task::move_old_terminal_to_archive(self.db.pool(), chat_id, cutoff).await?
            }
        };
        if swept > 0 {
            tracing::info!(swept, mode = ?self.config.archive_mode, "old terminal tasks swept");
        }
        Ok(swept)
    }
}
