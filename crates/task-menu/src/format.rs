//! Text formatting for menu views.

use chrono::{DateTime, Utc};
use database::{Priority, Task, TaskStatus};

pub fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "📝 To do",
        TaskStatus::InProgress => "🔄 In progress",
        TaskStatus::Done => "✅ Done",
        TaskStatus::Cancelled => "🚫 Cancelled",
        TaskStatus::Overdue => "⚠️ Overdue",
    }
}

pub fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "🔴",
        Priority::Medium => "🟡",
        Priority::Low => "🟢",
    }
}

pub fn fmt_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Truncate to at most `max` characters, appending an ellipsis when
/// something was cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

/// One-line summary used for list-view buttons.
pub fn task_line(task: &Task) -> String {
    let name = task.title.as_deref().unwrap_or(&task.description);
    format!(
        "{} #{} {}",
        priority_marker(task.priority),
        task.id,
        truncate(name, 32)
    )
}

/// Multi-line task detail body.
pub fn task_detail(task: &Task) -> String {
    let mut lines = vec![format!(
        "{} Task #{}",
        priority_marker(task.priority),
        task.id
    )];
    if let Some(title) = &task.title {
        lines.push(format!("<b>{}</b>", title));
    }
    lines.push(task.description.clone());
    lines.push(format!("Status: {}", status_label(task.status)));
    if let Some(name) = &task.assignee_name {
        lines.push(format!("Assignee: {}", name));
    } else if let Some(id) = task.assignee_id {
        lines.push(format!("Assignee: user {}", id));
    }
    if let Some(deadline) = task.deadline {
        lines.push(format!("Deadline: {}", fmt_deadline(deadline)));
    }
    if !task.tags.is_empty() {
        let tags: Vec<String> = task.tags.iter().map(|t| format!("#{t}")).collect();
        lines.push(format!("Tags: {}", tags.join(" ")));
    }
    if let Some(completed_at) = task.completed_at {
        lines.push(format!("Completed: {}", fmt_deadline(completed_at)));
    }
    lines.join("\n")
}
