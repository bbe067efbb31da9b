//! Database models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Task lifecycle status.
///
/// `Overdue` is only ever written by the reconciler; user actions can
/// target `InProgress`, `Done`, and `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Cancelled,
    Overdue,
}

impl TaskStatus {
    /// Converts the status to a string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Overdue => "overdue",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "cancelled" => Some(Self::Cancelled),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }

    /// Whether the task still counts as open work.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Todo | Self::InProgress | Self::Overdue)
    }

    /// Whether the status is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// The three statuses that count as open work.
    pub const ACTIVE: [TaskStatus; 3] = [Self::Todo, Self::InProgress, Self::Overdue];
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Converts the priority to a string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parses a priority from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// A unit of work scoped to a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    /// Monotonically increasing id, assigned at creation.
    pub id: i64,
    /// Required free-text description.
    pub description: String,
    /// Optional short title.
    pub title: Option<String>,
    /// Creator identity (immutable).
    pub creator_id: i64,
    /// Creator display name at creation time.
    pub creator_name: Option<String>,
    /// Current assignee, if any.
    pub assignee_id: Option<i64>,
    /// Assignee display name.
    pub assignee_name: Option<String>,
    /// Chat scope the task belongs to (immutable).
    pub chat_id: i64,
    /// Optional deadline; without one the task never becomes overdue.
    pub deadline: Option<DateTime<Utc>>,
    /// Task priority.
    pub priority: Priority,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Normalized tags (child relation, hydrated on read).
    #[sqlx(skip)]
    pub tags: Vec<String>,
    /// References to externally scheduled reminder jobs (child relation).
    #[sqlx(skip)]
    pub scheduled_job_refs: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Set once when the task first enters `done`; never cleared.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub description: String,
    pub title: Option<String>,
    pub creator_id: i64,
    pub creator_name: Option<String>,
    pub assignee_id: Option<i64>,
    pub assignee_name: Option<String>,
    pub chat_id: i64,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub tags: Vec<String>,
}

impl NewTask {
    /// Creates a new task input with the required fields.
    pub fn new(description: impl Into<String>, creator_id: i64, chat_id: i64) -> Self {
        Self {
            description: description.into(),
            creator_id,
            chat_id,
            ..Self::default()
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the assignee.
    pub fn with_assignee(mut self, id: i64, name: Option<String>) -> Self {
        self.assignee_id = Some(id);
        self.assignee_name = name;
        self
    }

    /// Sets the deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the tags (normalized on insert).
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Allow-listed partial update for a task.
///
/// Only the fields present here can be edited; a patch with no fields
/// set is rejected as a validation error. Double-`Option` fields
/// distinguish "leave alone" (outer `None`) from "clear" (inner `None`).
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub description: Option<String>,
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<Option<i64>>,
    pub assignee_name: Option<Option<String>>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    /// Whether no editable field is present.
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.title.is_none()
            && self.priority.is_none()
            && self.assignee_id.is_none()
            && self.assignee_name.is_none()
            && self.deadline.is_none()
            && self.tags.is_none()
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Filter by assignee.
    pub assignee_id: Option<i64>,
    /// Filter by chat scope.
    pub chat_id: Option<i64>,
    /// Filter by status set.
    pub statuses: Option<Vec<TaskStatus>>,
    /// Limit number of results.
    pub limit: Option<u32>,
}

impl TaskFilter {
    /// Creates a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by assignee.
    pub fn with_assignee(mut self, id: i64) -> Self {
        self.assignee_id = Some(id);
        self
    }

    /// Filters by chat scope.
    pub fn with_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    /// Filters by a set of statuses.
    pub fn with_statuses(mut self, statuses: impl Into<Vec<TaskStatus>>) -> Self {
        self.statuses = Some(statuses.into());
        self
    }

    /// Limits the number of results.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of a status change.
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// The task after the change (unchanged for a redundant call).
    pub task: Task,
    pub old_status: TaskStatus,
    pub new_status: TaskStatus,
    /// True when the task was already in the target status (no-op).
    pub unchanged: bool,
    /// Reminder-job refs the caller should cancel (populated on
    /// transitions into done/cancelled).
    pub jobs_to_cancel: Vec<String>,
}

/// Result of a deadline extension.
#[derive(Debug, Clone)]
pub struct DeadlineExtension {
    pub task: Task,
    pub old_deadline: Option<DateTime<Utc>>,
    pub new_deadline: DateTime<Utc>,
    /// Reminder-job refs that were registered against the old deadline.
    pub jobs_to_reschedule: Vec<String>,
}

/// Aggregation period for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatsPeriod {
    #[default]
    All,
    Week,
    Month,
}

impl StatsPeriod {
    /// The `created_at` cutoff for this period, if bounded.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::All => None,
            Self::Week => Some(now - chrono::Duration::days(7)),
            Self::Month => Some(now - chrono::Duration::days(30)),
        }
    }
}

/// Per-assignee task count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AssigneeCount {
    pub assignee_id: i64,
    pub assignee_name: Option<String>,
    pub task_count: i64,
}

/// Counts per status plus the busiest assignees.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: i64,
    pub todo: i64,
    pub in_progress: i64,
    pub done: i64,
    pub cancelled: i64,
    pub overdue: i64,
    pub top_assignees: Vec<AssigneeCount>,
}

/// Per-priority task count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PriorityCount {
    pub priority: Priority,
    pub task_count: i64,
}

/// Tag usage count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TagCount {
    pub tag: String,
    pub task_count: i64,
}

/// Created/completed counts for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    /// Day in `YYYY-MM-DD` form.
    pub day: String,
    pub created: i64,
    pub completed: i64,
}

/// Week-over-week activity summary for a chat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub created_this_week: i64,
    pub done_this_week: i64,
    pub cancelled_this_week: i64,
    pub created_prev_week: i64,
    pub done_prev_week: i64,
    pub active_tasks: i64,
    pub overdue_tasks: i64,
    pub top_performers: Vec<AssigneeCount>,
}

/// A chat participant known to the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Platform-native numeric id.
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    /// Chat scopes the user has been observed in (append-only).
    #[sqlx(skip)]
    pub chat_ids: Vec<i64>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// One observation of a user, applied merge-by-presence: a field only
/// overwrites the stored value when the new value is non-empty.
#[derive(Debug, Clone, Default)]
pub struct UserSighting {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub chat_id: Option<i64>,
}

impl UserSighting {
    /// Creates a sighting for the given identity.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Sets the username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the first/last name.
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Sets the chat scope the user was seen in.
    pub fn in_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }
}

/// Normalize tags: trim whitespace, strip a leading `#`, lowercase,
/// drop empties, deduplicate preserving first occurrence.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for t in tags {
        let tag = t
            .as_ref()
            .trim()
            .trim_start_matches('#')
            .trim()
            .to_lowercase();
        if !tag.is_empty() && seen.insert(tag.clone()) {
            result.push(tag);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("bogus"), None);
    }

    #[test]
    fn test_status_classes() {
        assert!(TaskStatus::Todo.is_active());
        assert!(TaskStatus::Overdue.is_active());
        assert!(!TaskStatus::Done.is_active());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_priority_default() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(Priority::parse("high"), Some(Priority::High));
    }

    #[test]
    fn test_normalize_tags_dedupes_case_and_hash() {
        let tags = normalize_tags(["#Urgent", " urgent ", "URGENT"]);
        assert_eq!(tags, vec!["urgent".to_string()]);
    }

    #[test]
    fn test_normalize_tags_preserves_order_and_drops_empty() {
        let tags = normalize_tags(["#b", "", "  ", "#a", "b"]);
        assert_eq!(tags, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_task_patch_empty() {
        assert!(TaskPatch::default().is_empty());
        let patch = TaskPatch {
            title: Some("t".into()),
            ..TaskPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_new_task_builder() {
        let input = NewTask::new("Prepare the report", 7, -100)
            .with_priority(Priority::High)
            .with_tags(vec!["#Report".into()]);
        assert_eq!(input.creator_id, 7);
        assert_eq!(input.chat_id, -100);
        assert_eq!(input.priority, Priority::High);
    }
}
