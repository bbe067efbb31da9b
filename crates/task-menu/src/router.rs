//! Stateless callback routing.
//!
//! One entry point, [`MenuRouter::route`], takes a raw callback token
//! plus the ambient chat/caller identity and returns a complete
//! [`MenuResponse`]. No per-user session state is kept anywhere; two
//! users tapping interleaved buttons in the same chat cannot interfere.
//! Routing never returns an error to the caller: failures, stale
//! tokens, and timeouts all come back as renderable responses with a
//! way back to the main menu.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use database::{
    stats, task, Database, DatabaseError, StatsPeriod, Task, TaskFilter, TaskStatus,
};
use tokio::time::timeout;

use crate::charts::ChartRenderer;
use crate::command::{Callback, ChartKind, TaskAction};
use crate::format;
use crate::response::{Button, MenuResponse};

/// Receives reminder-job refs that became obsolete because their task
/// reached a terminal status.
#[async_trait]
pub trait ReminderSink: Send + Sync {
    async fn cancel(&self, task_id: i64, job_refs: &[String]);
}

/// Router tuning.
#[derive(Debug, Clone)]
pub struct MenuConfig {
    /// Hard ceiling on handling one callback.
    pub action_timeout: Duration,
    /// Row cap for the "my tasks" view.
    pub my_tasks_limit: u32,
    /// Row cap for the "all tasks" view.
    pub all_tasks_limit: u32,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(5),
            my_tasks_limit: 10,
            all_tasks_limit: 15,
        }
    }
}

/// Routes callback tokens to task views and actions.
#[derive(Clone)]
pub struct MenuRouter {
    db: Database,
    charts: Option<Arc<dyn ChartRenderer>>,
    reminders: Option<Arc<dyn ReminderSink>>,
    config: MenuConfig,
}

impl MenuRouter {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            charts: None,
            reminders: None,
            config: MenuConfig::default(),
        }
    }

    pub fn with_charts(mut self, charts: Arc<dyn ChartRenderer>) -> Self {
        self.charts = Some(charts);
        self
    }

    pub fn with_reminder_sink(mut self, sink: Arc<dyn ReminderSink>) -> Self {
        self.reminders = Some(sink);
        self
    }

    pub fn with_config(mut self, config: MenuConfig) -> Self {
        self.config = config;
        self
    }

    /// Handle one callback token.
    ///
    /// `caller_id` is the user who tapped the button; views that are
    /// relative to a person (like "my tasks") need it, everything else
    /// ignores it.
    pub async fn route(&self, chat_id: i64, caller_id: Option<i64>, token: &str) -> MenuResponse {
        let callback = Callback::parse(token);
        match timeout(
            self.config.action_timeout,
            self.dispatch(chat_id, caller_id, &callback),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::warn!(token, error = %err, "callback handling failed");
                error_response(&err)
            }
            Err(_) => {
                tracing::warn!(token, "callback handling timed out");
                MenuResponse::new("⏳ That took too long. Please try again.").with_main_button()
            }
        }
    }

    async fn dispatch(
        &self,
        chat_id: i64,
        caller_id: Option<i64>,
        callback: &Callback,
    ) -> Result<MenuResponse, DatabaseError> {
        match callback {
            Callback::Main => Ok(main_menu()),
            Callback::CreatePrompt => Ok(create_prompt()),
            Callback::My => self.my_tasks(chat_id, caller_id).await,
            Callback::All => self.all_tasks(chat_id).await,
            Callback::Overdue => self.overdue(chat_id).await,
            Callback::Stats => self.stats(chat_id).await,
            Callback::Charts => Ok(chart_menu()),
            Callback::Task(id) => self.task_detail(*id).await,
            Callback::Action(action, id) => self.apply_action(*action, *id).await,
            Callback::Edit(id) => self.edit_prompt(*id).await,
            Callback::Extend(id) => self.extend_prompt(*id).await,
            Callback::Chart(kind) => Ok(self.chart(*kind, chat_id).await),
            Callback::Unknown(raw) => {
                tracing::debug!(token = raw.as_str(), "unrecognized callback token");
                Ok(MenuResponse::new("🤔 That button is no longer valid.").with_main_button())
            }
        }
    }

    async fn my_tasks(
        &self,
        chat_id: i64,
        caller_id: Option<i64>,
    ) -> Result<MenuResponse, DatabaseError> {
        let Some(caller_id) = caller_id else {
            return Ok(
                MenuResponse::new("🤷 I can't tell who you are in this chat.").with_main_button()
            );
        };
        let filter = TaskFilter::new()
            .with_assignee(caller_id)
            .with_chat(chat_id)
            .with_statuses(TaskStatus::ACTIVE)
            .with_limit(self.config.my_tasks_limit);
        let tasks = task::list_tasks(self.db.pool(), &filter).await?;
        Ok(task_list("📝 Your open tasks", &tasks, "You have no open tasks."))
    }

    async fn all_tasks(&self, chat_id: i64) -> Result<MenuResponse, DatabaseError> {
        let filter = TaskFilter::new()
            .with_chat(chat_id)
            .with_statuses(TaskStatus::ACTIVE)
            .with_limit(self.config.all_tasks_limit);
        let tasks = task::list_tasks(self.db.pool(), &filter).await?;
        Ok(task_list(
            "📋 Open tasks in this chat",
            &tasks,
            "No open tasks in this chat.",
        ))
    }

    async fn overdue(&self, chat_id: i64) -> Result<MenuResponse, DatabaseError> {
        let tasks = task::currently_overdue(self.db.pool(), Some(chat_id), Utc::now()).await?;
        Ok(task_list(
            "⚠️ Past their deadline",
            &tasks,
            "Nothing is overdue. 🎉",
        ))
    }

    async fn stats(&self, chat_id: i64) -> Result<MenuResponse, DatabaseError> {
        let stats = stats::task_stats(self.db.pool(), Some(chat_id), StatsPeriod::All).await?;
        let priorities = stats::priority_counts(self.db.pool(), Some(chat_id)).await?;

        let mut lines = vec![
            "📊 Task statistics".to_string(),
            String::new(),
            format!("Total: {}", stats.total),
            format!("📝 To do: {}", stats.todo),
            format!("🔄 In progress: {}", stats.in_progress),
            format!("✅ Done: {}", stats.done),
            format!("🚫 Cancelled: {}", stats.cancelled),
            format!("⚠️ Overdue: {}", stats.overdue),
        ];
        if !priorities.is_empty() {
            lines.push(String::new());
            lines.push("By priority:".to_string());
            for p in &priorities {
                lines.push(format!(
                    "{} {}: {}",
                    format::priority_marker(p.priority),
                    p.priority.as_str(),
                    p.task_count
                ));
            }
        }
        if !stats.top_assignees.is_empty() {
            lines.push(String::new());
            lines.push("Busiest assignees:".to_string());
            for a in &stats.top_assignees {
                let name = a
                    .assignee_name
                    .clone()
                    .unwrap_or_else(|| format!("user {}", a.assignee_id));
                lines.push(format!("• {}: {}", name, a.task_count));
            }
        }

        Ok(MenuResponse::new(lines.join("\n")).with_main_button())
    }

    async fn task_detail(&self, id: i64) -> Result<MenuResponse, DatabaseError> {
        let task = task::get_task(self.db.pool(), id).await?;
        Ok(detail_response(&task))
    }

    async fn apply_action(
        &self,
        action: TaskAction,
        id: i64,
    ) -> Result<MenuResponse, DatabaseError> {
        let target = match action {
            TaskAction::Start => TaskStatus::InProgress,
            TaskAction::Done => TaskStatus::Done,
            TaskAction::Cancel => TaskStatus::Cancelled,
        };
        let change = task::change_status(self.db.pool(), id, target).await?;

        if change.unchanged {
            let text = format!(
                "ℹ️ Task #{id} is already {}.\n\n{}",
                format::status_label(change.new_status),
                format::task_detail(&change.task)
            );
            return Ok(detail_response(&change.task).map_text(text));
        }

        if !change.jobs_to_cancel.is_empty() {
            match &self.reminders {
                Some(sink) => sink.cancel(id, &change.jobs_to_cancel).await,
                None => tracing::debug!(
                    task_id = id,
                    jobs = change.jobs_to_cancel.len(),
                    "no reminder sink installed, dropping job refs"
                ),
            }
        }

        let text = format!(
            "👍 Task #{id} is now {}.\n\n{}",
            format::status_label(change.new_status),
            format::task_detail(&change.task)
        );
        Ok(detail_response(&change.task).map_text(text))
    }

    async fn edit_prompt(&self, id: i64) -> Result<MenuResponse, DatabaseError> {
        let task = task::get_task(self.db.pool(), id).await?;
        let text = format!(
            "✏️ To edit task #{}, reply with one of:\n\
             /edit {id} description <new text>\n\
             /edit {id} title <new title>\n\
             /edit {id} priority <low|medium|high>\n\
             /edit {id} assignee <name or @username>\n\
             /edit {id} tags <tag1 tag2 …>",
            task.id,
            id = task.id
        );
        Ok(MenuResponse::new(text)
            .with_row(vec![Button::new("⬅️ Back", &Callback::Task(task.id))])
            .with_main_button())
    }

    async fn extend_prompt(&self, id: i64) -> Result<MenuResponse, DatabaseError> {
        let task = task::get_task(self.db.pool(), id).await?;
        if task.status.is_terminal() {
            let text = format!(
                "ℹ️ Task #{} is already {}; its deadline can no longer change.",
                task.id,
                format::status_label(task.status)
            );
            return Ok(MenuResponse::new(text).with_main_button());
        }
        let current = match task.deadline {
            Some(deadline) => format!("Current deadline: {}.", format::fmt_deadline(deadline)),
            None => "It has no deadline yet.".to_string(),
        };
        let text = format!(
            "⏰ To move the deadline of task #{}, reply with:\n\
             /extend {} <date and time>\n{}",
            task.id, task.id, current
        );
        Ok(MenuResponse::new(text)
            .with_row(vec![Button::new("⬅️ Back", &Callback::Task(task.id))])
            .with_main_button())
    }

    async fn chart(&self, kind: ChartKind, chat_id: i64) -> MenuResponse {
        let Some(renderer) = &self.charts else {
            return MenuResponse::new("📉 Charts are not available here.").with_main_button();
        };
        match renderer.render(kind, Some(chat_id)).await {
            Ok(artifact) => MenuResponse::new(artifact.caption)
                .with_media(artifact.path)
                .with_main_button(),
            Err(err) => {
                tracing::warn!(chart = kind.slug(), error = %err, "chart rendering failed");
                MenuResponse::new("📉 Could not draw that chart right now.").with_main_button()
            }
        }
    }
}

fn main_menu() -> MenuResponse {
    MenuResponse::new("📋 Task tracker — what would you like to do?")
        .with_row(vec![
            Button::new("➕ New task", &Callback::CreatePrompt),
            Button::new("📝 My tasks", &Callback::My),
        ])
        .with_row(vec![
            Button::new("📋 All tasks", &Callback::All),
            Button::new("⚠️ Overdue", &Callback::Overdue),
        ])
        .with_row(vec![
            Button::new("📊 Stats", &Callback::Stats),
            Button::new("📈 Charts", &Callback::Charts),
        ])
}

fn create_prompt() -> MenuResponse {
    MenuResponse::new(
        "➕ To create a task, send a message like:\n\
         /task Prepare the quarterly report @ivan by friday 18:00 #reports !high",
    )
    .with_main_button()
}

fn chart_menu() -> MenuResponse {
    MenuResponse::new("📈 Which chart?")
        .with_row(vec![
            Button::new("Status", &Callback::Chart(ChartKind::Status)),
            Button::new("Workload", &Callback::Chart(ChartKind::Workload)),
        ])
        .with_row(vec![
            Button::new("Priority", &Callback::Chart(ChartKind::Priority)),
            Button::new("Trend", &Callback::Chart(ChartKind::Trend)),
        ])
        .with_main_button()
}

fn task_list(title: &str, tasks: &[Task], empty: &str) -> MenuResponse {
    if tasks.is_empty() {
        return MenuResponse::new(empty.to_string()).with_main_button();
    }
    let mut response = MenuResponse::new(format!("{title} ({})", tasks.len()));
    for task in tasks {
        response = response.with_row(vec![Button::new(
            format::task_line(task),
            &Callback::Task(task.id),
        )]);
    }
    response.with_main_button()
}

fn detail_response(task: &Task) -> MenuResponse {
    let mut response = MenuResponse::new(format::task_detail(task));

    if !task.status.is_terminal() {
        let mut actions = Vec::new();
        if task.status != TaskStatus::InProgress {
            actions.push(Button::new(
                "▶️ Start",
                &Callback::Action(TaskAction::Start, task.id),
            ));
        }
        actions.push(Button::new(
            "✅ Done",
            &Callback::Action(TaskAction::Done, task.id),
        ));
        response = response.with_row(actions);

        response = response.with_row(vec![
            Button::new("✏️ Edit", &Callback::Edit(task.id)),
            Button::new("⏰ Deadline", &Callback::Extend(task.id)),
            Button::new("🚫 Cancel", &Callback::Action(TaskAction::Cancel, task.id)),
        ]);
    }

    response.with_main_button()
}

fn error_response(err: &DatabaseError) -> MenuResponse {
    let text = match err {
        DatabaseError::NotFound { .. } => {
            "🔍 That task no longer exists. It may have been archived.".to_string()
        }
        DatabaseError::InvalidTransition { from, to } => {
            format!("🚫 A task that is {from} can't be moved to {to}.")
        }
        DatabaseError::Validation(message) => format!("🚫 {message}."),
        _ => "⚠️ Something went wrong. Please try again.".to_string(),
    };
    MenuResponse::new(text).with_main_button()
}

impl MenuResponse {
    fn map_text(mut self, text: String) -> Self {
        self.text = text;
        self
    }
}
