//! Task CRUD operations and the status state machine.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{
    normalize_tags, DeadlineExtension, NewTask, StatusChange, Task, TaskFilter, TaskPatch,
    TaskStatus,
};

/// Create a new task with status `todo`.
pub async fn create_task(pool: &SqlitePool, input: &NewTask) -> Result<Task> {
    if input.description.trim().is_empty() {
        return Err(DatabaseError::Validation(
            "description is required".to_string(),
        ));
    }
    if input.creator_id == 0 {
        return Err(DatabaseError::Validation("creator is required".to_string()));
    }
    if input.chat_id == 0 {
        return Err(DatabaseError::Validation(
            "chat scope is required".to_string(),
        ));
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO tasks
            (description, title, creator_id, creator_name,
             assignee_id, assignee_name, chat_id,
             deadline, priority, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.description)
    .bind(&input.title)
    .bind(input.creator_id)
    .bind(&input.creator_name)
    .bind(input.assignee_id)
    .bind(&input.assignee_name)
    .bind(input.chat_id)
    .bind(input.deadline)
    .bind(input.priority)
    .bind(TaskStatus::Todo)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let task_id = result.last_insert_rowid();

    for tag in normalize_tags(&input.tags) {
        sqlx::query("INSERT OR IGNORE INTO task_tags (task_id, tag) VALUES (?, ?)")
            .bind(task_id)
            .bind(&tag)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::info!(task_id, chat_id = input.chat_id, "task created");

    get_task(pool, task_id).await
}

/// Get a task by id, with tags and job refs hydrated.
pub async fn get_task(pool: &SqlitePool, id: i64) -> Result<Task> {
    let mut task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Task",
            id: id.to_string(),
        })?;

    hydrate(pool, std::slice::from_mut(&mut task)).await?;
    Ok(task)
}

/// Replace the scheduled reminder-job refs for a task.
pub async fn set_job_refs(pool: &SqlitePool, task_id: i64, refs: &[String]) -> Result<()> {
    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM tasks WHERE id = ?")
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(DatabaseError::NotFound {
            entity: "Task",
            id: task_id.to_string(),
        });
    }

    sqlx::query("DELETE FROM task_jobs WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    for job_ref in refs {
        sqlx::query("INSERT OR IGNORE INTO task_jobs (task_id, job_ref) VALUES (?, ?)")
            .bind(task_id)
            .bind(job_ref)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Get the reminder-job refs registered for a task.
pub async fn job_refs(pool: &SqlitePool, task_id: i64) -> Result<Vec<String>> {
    let refs = sqlx::query_scalar::<_, String>(
        "SELECT job_ref FROM task_jobs WHERE task_id = ? ORDER BY job_ref",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await?;
    Ok(refs)
}

/// Change a task's status.
///
/// A redundant call (task already in the target status) is a no-op that
/// returns the unchanged record with `unchanged = true` and does not
/// touch `updated_at`. Transitions out of `done`/`cancelled` and
/// user-chosen transitions into `overdue` or back to `todo` are
/// rejected. Entering `done` sets `completed_at` exactly once; entering
/// `done`/`cancelled` hands back the task's reminder-job refs so the
/// caller can cancel them.
pub async fn change_status(pool: &SqlitePool, id: i64, target: TaskStatus) -> Result<StatusChange> {
    let mut tx = pool.begin().await?;

    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Task",
            id: id.to_string(),
        })?;

    let old_status = task.status;

    if old_status == target {
        tx.commit().await?;
        let task = get_task(pool, id).await?;
        return Ok(StatusChange {
            task,
            old_status,
            new_status: target,
            unchanged: true,
            jobs_to_cancel: Vec::new(),
        });
    }

    let invalid = || DatabaseError::InvalidTransition {
        from: old_status.as_str(),
        to: target.as_str(),
    };

    if old_status.is_terminal() {
        return Err(invalid());
    }
    // `overdue` is written only by the reconciler; `todo` is reached
    // only at creation or via a deadline extension.
    if !matches!(
        target,
        TaskStatus::InProgress | TaskStatus::Done | TaskStatus::Cancelled
    ) {
        return Err(invalid());
    }

    let now = Utc::now();
    let completed_at = if target == TaskStatus::Done {
        Some(task.completed_at.unwrap_or(now))
    } else {
        task.completed_at
    };

    sqlx::query("UPDATE tasks SET status = ?, updated_at = ?, completed_at = ? WHERE id = ?")
        .bind(target)
        .bind(now)
        .bind(completed_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(
        task_id = id,
        from = old_status.as_str(),
        to = target.as_str(),
        "task status changed"
    );

    let jobs_to_cancel = if target.is_terminal() {
        job_refs(pool, id).await?
    } else {
        Vec::new()
    };

    let task = get_task(pool, id).await?;
    Ok(StatusChange {
        task,
        old_status,
        new_status: target,
        unchanged: false,
        jobs_to_cancel,
    })
}

/// Replace a task's deadline.
///
/// An `overdue` task reverts to `todo` regardless of the new deadline's
/// value. Returns the old deadline and the reminder-job refs that were
/// registered against it, for caller-side re-registration.
pub async fn extend_deadline(
    pool: &SqlitePool,
    id: i64,
    new_deadline: DateTime<Utc>,
) -> Result<DeadlineExtension> {
    let mut tx = pool.begin().await?;

    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Task",
            id: id.to_string(),
        })?;

    if task.status.is_terminal() {
        return Err(DatabaseError::Validation(format!(
            "cannot extend deadline of a {} task",
            task.status.as_str()
        )));
    }

    let new_status = if task.status == TaskStatus::Overdue {
        TaskStatus::Todo
    } else {
        task.status
    };

    sqlx::query("UPDATE tasks SET deadline = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(new_deadline)
        .bind(new_status)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(task_id = id, "task deadline extended");

    let jobs_to_reschedule = job_refs(pool, id).await?;
    let updated = get_task(pool, id).await?;
    Ok(DeadlineExtension {
        task: updated,
        old_deadline: task.deadline,
        new_deadline,
        jobs_to_reschedule,
    })
}

/// Apply an allow-listed partial update.
///
/// Tags are re-normalized; a patch with no fields set is a validation
/// error.
pub async fn edit_task(pool: &SqlitePool, id: i64, patch: &TaskPatch) -> Result<Task> {
    if patch.is_empty() {
        return Err(DatabaseError::Validation(
            "no editable fields in patch".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(DatabaseError::NotFound {
            entity: "Task",
            id: id.to_string(),
        });
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(description) = &patch.description {
        qb.push(", description = ").push_bind(description);
    }
    if let Some(title) = &patch.title {
        qb.push(", title = ").push_bind(title);
    }
    if let Some(priority) = patch.priority {
        qb.push(", priority = ").push_bind(priority);
    }
    if let Some(assignee_id) = patch.assignee_id {
        qb.push(", assignee_id = ").push_bind(assignee_id);
    }
    if let Some(assignee_name) = &patch.assignee_name {
        qb.push(", assignee_name = ").push_bind(assignee_name);
    }
    if let Some(deadline) = patch.deadline {
        qb.push(", deadline = ").push_bind(deadline);
    }
    qb.push(" WHERE id = ").push_bind(id);
    qb.build().execute(&mut *tx).await?;

    if let Some(tags) = &patch.tags {
        sqlx::query("DELETE FROM task_tags WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for tag in normalize_tags(tags) {
            sqlx::query("INSERT OR IGNORE INTO task_tags (task_id, tag) VALUES (?, ?)")
                .bind(id)
                .bind(&tag)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    tracing::debug!(task_id = id, "task edited");

    get_task(pool, id).await
}

/// List tasks matching a filter, ordered by priority (high first), then
/// deadline ascending with missing deadlines last, then id descending.
pub async fn list_tasks(pool: &SqlitePool, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tasks WHERE 1 = 1");
    if let Some(assignee_id) = filter.assignee_id {
        qb.push(" AND assignee_id = ").push_bind(assignee_id);
    }
    if let Some(chat_id) = filter.chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    if let Some(statuses) = &filter.statuses {
        qb.push(" AND status IN (");
        let mut sep = qb.separated(", ");
        for status in statuses {
            sep.push_bind(*status);
        }
        qb.push(")");
    }
    qb.push(
        " ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, \
         deadline IS NULL, deadline ASC, id DESC",
    );
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit as i64);
    }

    let mut tasks = qb.build_query_as::<Task>().fetch_all(pool).await?;
    hydrate(pool, &mut tasks).await?;
    Ok(tasks)
}

/// List tasks created by a user, newest first.
pub async fn list_created(
    pool: &SqlitePool,
    creator_id: i64,
    chat_id: Option<i64>,
) -> Result<Vec<Task>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tasks WHERE creator_id = ");
    qb.push_bind(creator_id);
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    qb.push(" ORDER BY created_at DESC, id DESC");

    let mut tasks = qb.build_query_as::<Task>().fetch_all(pool).await?;
    hydrate(pool, &mut tasks).await?;
    Ok(tasks)
}

/// Case-insensitive substring search over description, title, and tags,
/// newest first.
pub async fn search_tasks(pool: &SqlitePool, text: &str, chat_id: Option<i64>) -> Result<Vec<Task>> {
    let pattern = format!("%{}%", text);

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tasks WHERE ");
    if let Some(chat_id) = chat_id {
        qb.push("chat_id = ").push_bind(chat_id).push(" AND ");
    }
    qb.push("(description LIKE ")
        .push_bind(pattern.clone())
        .push(" OR IFNULL(title, '') LIKE ")
        .push_bind(pattern.clone())
        .push(" OR EXISTS (SELECT 1 FROM task_tags tt WHERE tt.task_id = tasks.id AND tt.tag LIKE ")
        .push_bind(pattern)
        .push("))");
    qb.push(" ORDER BY created_at DESC, id DESC");

    let mut tasks = qb.build_query_as::<Task>().fetch_all(pool).await?;
    hydrate(pool, &mut tasks).await?;
    Ok(tasks)
}

/// List tasks carrying a specific (normalized) tag, newest first.
pub async fn list_by_tag(pool: &SqlitePool, tag: &str, chat_id: Option<i64>) -> Result<Vec<Task>> {
    let tag = tag.trim().trim_start_matches('#').to_lowercase();

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT t.* FROM tasks t \
         INNER JOIN task_tags tt ON tt.task_id = t.id WHERE tt.tag = ",
    );
    qb.push_bind(tag);
    if let Some(chat_id) = chat_id {
        qb.push(" AND t.chat_id = ").push_bind(chat_id);
    }
    qb.push(" ORDER BY t.created_at DESC, t.id DESC");

    let mut tasks = qb.build_query_as::<Task>().fetch_all(pool).await?;
    hydrate(pool, &mut tasks).await?;
    Ok(tasks)
}

/// Active tasks whose deadline has already passed, soonest-expired
/// first. This is the on-demand "currently overdue" view; it includes
/// tasks the reconciler has already marked `overdue`.
pub async fn currently_overdue(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Vec<Task>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT * FROM tasks WHERE deadline IS NOT NULL AND deadline < ",
    );
    qb.push_bind(now);
    qb.push(" AND status IN ('todo', 'in_progress', 'overdue')");
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    qb.push(" ORDER BY deadline ASC");

    let mut tasks = qb.build_query_as::<Task>().fetch_all(pool).await?;
    hydrate(pool, &mut tasks).await?;
    Ok(tasks)
}

/// Tasks eligible for the overdue transition: deadline passed and
/// status still `todo`/`in_progress`. Already-`overdue` tasks are
/// excluded so repeated reconciliation is idempotent.
pub async fn overdue_candidates(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Vec<Task>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT * FROM tasks WHERE deadline IS NOT NULL AND deadline < ",
    );
    qb.push_bind(now);
    qb.push(" AND status IN ('todo', 'in_progress')");
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    qb.push(" ORDER BY deadline ASC");

    let mut tasks = qb.build_query_as::<Task>().fetch_all(pool).await?;
    hydrate(pool, &mut tasks).await?;
    Ok(tasks)
}

/// Claim a single task for the overdue transition.
///
/// The status guard makes the claim atomic with respect to concurrent
/// user transitions: returns false when the task was moved out of
/// `todo`/`in_progress` in the meantime.
pub async fn claim_overdue(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'overdue', updated_at = ? \
         WHERE id = ? AND status IN ('todo', 'in_progress')",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Active (`todo`/`in_progress`) tasks whose deadline falls within the
/// given window, ordered by deadline ascending.
pub async fn upcoming_tasks(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Task>> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT * FROM tasks WHERE deadline IS NOT NULL AND deadline >= ");
    qb.push_bind(from);
    qb.push(" AND deadline <= ").push_bind(to);
    qb.push(" AND status IN ('todo', 'in_progress')");
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    qb.push(" ORDER BY deadline ASC");

    let mut tasks = qb.build_query_as::<Task>().fetch_all(pool).await?;
    hydrate(pool, &mut tasks).await?;
    Ok(tasks)
}

/// Delete terminal (done/cancelled) tasks last updated before the
/// cutoff. Active tasks are never removed regardless of age. Returns
/// the number of tasks removed.
pub async fn purge_old_terminal(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    cutoff: DateTime<Utc>,
) -> Result<u64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "DELETE FROM tasks WHERE status IN ('done', 'cancelled') AND updated_at < ",
    );
    qb.push_bind(cutoff);
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }

    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Move terminal (done/cancelled) tasks last updated before the cutoff
/// into `tasks_archive`, then remove them from `tasks`. Returns the
/// number of tasks archived.
pub async fn move_old_terminal_to_archive(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    cutoff: DateTime<Utc>,
) -> Result<u64> {
    let archived_at = Utc::now();
    let mut tx = pool.begin().await?;

    let mut insert: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO tasks_archive \
         (id, description, title, creator_id, creator_name, assignee_id, assignee_name, \
          chat_id, deadline, priority, status, created_at, updated_at, completed_at, archived_at) \
         SELECT id, description, title, creator_id, creator_name, assignee_id, assignee_name, \
          chat_id, deadline, priority, status, created_at, updated_at, completed_at, ",
    );
    insert.push_bind(archived_at);
    insert.push(" FROM tasks WHERE status IN ('done', 'cancelled') AND updated_at < ");
    insert.push_bind(cutoff);
    if let Some(chat_id) = chat_id {
        insert.push(" AND chat_id = ").push_bind(chat_id);
    }
    let result = insert.build().execute(&mut *tx).await?;
    let archived = result.rows_affected();

    let mut delete: QueryBuilder<Sqlite> = QueryBuilder::new(
        "DELETE FROM tasks WHERE status IN ('done', 'cancelled') AND updated_at < ",
    );
    delete.push_bind(cutoff);
    if let Some(chat_id) = chat_id {
        delete.push(" AND chat_id = ").push_bind(chat_id);
    }
    delete.build().execute(&mut *tx).await?;

    tx.commit().await?;
    Ok(archived)
}

/// Hydrate child relations (tags, job refs) into the given tasks.
async fn hydrate(pool: &SqlitePool, tasks: &mut [Task]) -> Result<()> {
    for task in tasks.iter_mut() {
        task.tags = sqlx::query_scalar::<_, String>(
            "SELECT tag FROM task_tags WHERE task_id = ? ORDER BY rowid",
        )
        .bind(task.id)
        .fetch_all(pool)
        .await?;
        task.scheduled_job_refs = job_refs(pool, task.id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use crate::Database;
    use chrono::Duration;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn basic_task() -> NewTask {
        NewTask::new("Prepare the quarterly report", 7, -1001)
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();

        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.completed_at.is_none());
        assert!(task.tags.is_empty());
        assert!(task.scheduled_job_refs.is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_description() {
        let db = test_db().await;
        let input = NewTask::new("   ", 7, -1001);
        let result = create_task(db.pool(), &input).await;
        assert!(matches!(result, Err(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_requires_creator_and_chat() {
        let db = test_db().await;
        assert!(matches!(
            create_task(db.pool(), &NewTask::new("x", 0, -1)).await,
            Err(DatabaseError::Validation(_))
        ));
        assert!(matches!(
            create_task(db.pool(), &NewTask::new("x", 7, 0)).await,
            Err(DatabaseError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_normalizes_tags() {
        let db = test_db().await;
        let input = basic_task().with_tags(vec![
            "#Urgent".to_string(),
            " urgent ".to_string(),
            "URGENT".to_string(),
        ]);
        let task = create_task(db.pool(), &input).await.unwrap();
        assert_eq!(task.tags, vec!["urgent".to_string()]);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let db = test_db().await;
        let result = get_task(db.pool(), 999).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_status_change_sets_completed_at_once() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();

        let change = change_status(db.pool(), task.id, TaskStatus::Done)
            .await
            .unwrap();
        assert_eq!(change.new_status, TaskStatus::Done);
        assert!(!change.unchanged);
        let first_completed = change.task.completed_at.unwrap();

        // Redundant call keeps the original completion marker.
        let again = change_status(db.pool(), task.id, TaskStatus::Done)
            .await
            .unwrap();
        assert!(again.unchanged);
        assert_eq!(again.task.completed_at, Some(first_completed));
    }

    #[tokio::test]
    async fn test_redundant_change_does_not_touch_updated_at() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();

        let change = change_status(db.pool(), task.id, TaskStatus::Todo)
            .await
            .unwrap();
        assert!(change.unchanged);
        assert_eq!(change.task.updated_at, task.updated_at);
        assert!(change.jobs_to_cancel.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_states_reject_transitions() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();
        change_status(db.pool(), task.id, TaskStatus::Cancelled)
            .await
            .unwrap();

        let result = change_status(db.pool(), task.id, TaskStatus::InProgress).await;
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_overdue_is_not_a_user_target() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();

        let result = change_status(db.pool(), task.id, TaskStatus::Overdue).await;
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_done_hands_back_job_refs() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();
        set_job_refs(db.pool(), task.id, &["job-1".to_string(), "job-2".to_string()])
            .await
            .unwrap();

        let change = change_status(db.pool(), task.id, TaskStatus::Done)
            .await
            .unwrap();
        assert_eq!(
            change.jobs_to_cancel,
            vec!["job-1".to_string(), "job-2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_set_job_refs_unknown_task() {
        let db = test_db().await;
        let result = set_job_refs(db.pool(), 999, &["job-1".to_string()]).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));

        let result = set_job_refs(db.pool(), 999, &[]).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_set_job_refs_replaces_previous() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();
        set_job_refs(db.pool(), task.id, &["job-1".to_string()])
            .await
            .unwrap();
        set_job_refs(db.pool(), task.id, &["job-2".to_string()])
            .await
            .unwrap();

        assert_eq!(job_refs(db.pool(), task.id).await.unwrap(), vec!["job-2".to_string()]);
    }

    #[tokio::test]
    async fn test_start_does_not_hand_back_job_refs() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();
        set_job_refs(db.pool(), task.id, &["job-1".to_string()])
            .await
            .unwrap();

        let change = change_status(db.pool(), task.id, TaskStatus::InProgress)
            .await
            .unwrap();
        assert!(change.jobs_to_cancel.is_empty());
        // The refs stay registered on the task.
        assert_eq!(change.task.scheduled_job_refs, vec!["job-1".to_string()]);
    }

    #[tokio::test]
    async fn test_extend_deadline_reverts_overdue_even_into_the_past() {
        let db = test_db().await;
        let input = basic_task().with_deadline(Utc::now() - Duration::hours(2));
        let task = create_task(db.pool(), &input).await.unwrap();
        assert!(claim_overdue(db.pool(), task.id).await.unwrap());

        // New deadline is still in the past; the status reverts anyway.
        let past = Utc::now() - Duration::hours(1);
        let extension = extend_deadline(db.pool(), task.id, past).await.unwrap();
        assert_eq!(extension.task.status, TaskStatus::Todo);
        assert_eq!(extension.old_deadline, task.deadline);
        assert_eq!(extension.new_deadline, past);
    }

    #[tokio::test]
    async fn test_extend_deadline_returns_old_jobs() {
        let db = test_db().await;
        let input = basic_task().with_deadline(Utc::now() + Duration::hours(1));
        let task = create_task(db.pool(), &input).await.unwrap();
        set_job_refs(db.pool(), task.id, &["rem-1".to_string()])
            .await
            .unwrap();

        let extension = extend_deadline(db.pool(), task.id, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(extension.jobs_to_reschedule, vec!["rem-1".to_string()]);
    }

    #[tokio::test]
    async fn test_extend_deadline_rejects_terminal() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();
        change_status(db.pool(), task.id, TaskStatus::Done)
            .await
            .unwrap();

        let result = extend_deadline(db.pool(), task.id, Utc::now()).await;
        assert!(matches!(result, Err(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn test_edit_applies_allowed_fields() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();

        let patch = TaskPatch {
            description: Some("Ship the report".to_string()),
            priority: Some(Priority::High),
            assignee_id: Some(Some(42)),
            assignee_name: Some(Some("maria".to_string())),
            tags: Some(vec!["#Report".to_string(), "report".to_string()]),
            ..TaskPatch::default()
        };
        let updated = edit_task(db.pool(), task.id, &patch).await.unwrap();

        assert_eq!(updated.description, "Ship the report");
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.assignee_id, Some(42));
        assert_eq!(updated.tags, vec!["report".to_string()]);
        // Untouched fields survive.
        assert_eq!(updated.status, TaskStatus::Todo);
        assert_eq!(updated.creator_id, task.creator_id);
    }

    #[tokio::test]
    async fn test_edit_clears_assignee() {
        let db = test_db().await;
        let input = basic_task().with_assignee(42, Some("maria".to_string()));
        let task = create_task(db.pool(), &input).await.unwrap();

        let patch = TaskPatch {
            assignee_id: Some(None),
            assignee_name: Some(None),
            ..TaskPatch::default()
        };
        let updated = edit_task(db.pool(), task.id, &patch).await.unwrap();
        assert!(updated.assignee_id.is_none());
        assert!(updated.assignee_name.is_none());
    }

    #[tokio::test]
    async fn test_edit_empty_patch_is_error() {
        let db = test_db().await;
        let task = create_task(db.pool(), &basic_task()).await.unwrap();

        let result = edit_task(db.pool(), task.id, &TaskPatch::default()).await;
        assert!(matches!(result, Err(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn test_edit_unknown_task() {
        let db = test_db().await;
        let patch = TaskPatch {
            title: Some("t".to_string()),
            ..TaskPatch::default()
        };
        let result = edit_task(db.pool(), 999, &patch).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_orders_priority_before_deadline() {
        let db = test_db().await;
        let medium = basic_task().with_deadline(Utc::now() + Duration::days(1));
        let medium = create_task(db.pool(), &medium).await.unwrap();
        let high = basic_task().with_priority(Priority::High);
        let high = create_task(db.pool(), &high).await.unwrap();

        let tasks = list_tasks(db.pool(), &TaskFilter::new()).await.unwrap();
        // High priority sorts first even without a deadline.
        assert_eq!(tasks[0].id, high.id);
        assert_eq!(tasks[1].id, medium.id);
    }

    #[tokio::test]
    async fn test_list_deadline_nulls_last_then_id_desc() {
        let db = test_db().await;
        let with_deadline = basic_task().with_deadline(Utc::now() + Duration::days(2));
        let a = create_task(db.pool(), &with_deadline).await.unwrap();
        let b = create_task(db.pool(), &basic_task()).await.unwrap();
        let c = create_task(db.pool(), &basic_task()).await.unwrap();

        let tasks = list_tasks(db.pool(), &TaskFilter::new()).await.unwrap();
        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        // Deadline-bearing task first, then no-deadline tasks newest first.
        assert_eq!(ids, vec![a.id, c.id, b.id]);
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_chat() {
        let db = test_db().await;
        let in_chat = create_task(db.pool(), &basic_task()).await.unwrap();
        let other_chat = NewTask::new("Elsewhere", 7, -2002);
        create_task(db.pool(), &other_chat).await.unwrap();
        let done = create_task(db.pool(), &basic_task()).await.unwrap();
        change_status(db.pool(), done.id, TaskStatus::Done)
            .await
            .unwrap();

        let filter = TaskFilter::new()
            .with_chat(-1001)
            .with_statuses(TaskStatus::ACTIVE);
        let tasks = list_tasks(db.pool(), &filter).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, in_chat.id);
    }

    #[tokio::test]
    async fn test_search_matches_tags_case_insensitively() {
        let db = test_db().await;
        let tagged = basic_task().with_tags(vec!["backend".to_string()]);
        let tagged = create_task(db.pool(), &tagged).await.unwrap();
        create_task(db.pool(), &NewTask::new("Frontend polish", 7, -1001))
            .await
            .unwrap();

        let hits = search_tasks(db.pool(), "BACKEND", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, tagged.id);

        let hits = search_tasks(db.pool(), "quarterly", None).await.unwrap();
        assert!(hits.iter().any(|t| t.id == tagged.id));
    }

    #[tokio::test]
    async fn test_list_by_tag_normalizes_query() {
        let db = test_db().await;
        let tagged = basic_task().with_tags(vec!["#Infra".to_string()]);
        let tagged = create_task(db.pool(), &tagged).await.unwrap();

        let hits = list_by_tag(db.pool(), "#INFRA", Some(-1001)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, tagged.id);
    }

    #[tokio::test]
    async fn test_currently_overdue_includes_marked_overdue() {
        let db = test_db().await;
        let expired = basic_task().with_deadline(Utc::now() - Duration::hours(3));
        let expired = create_task(db.pool(), &expired).await.unwrap();
        let marked = basic_task().with_deadline(Utc::now() - Duration::hours(5));
        let marked = create_task(db.pool(), &marked).await.unwrap();
        claim_overdue(db.pool(), marked.id).await.unwrap();
        // Future deadline stays out.
        let future = basic_task().with_deadline(Utc::now() + Duration::hours(1));
        create_task(db.pool(), &future).await.unwrap();

        let tasks = currently_overdue(db.pool(), Some(-1001), Utc::now())
            .await
            .unwrap();
        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        // Soonest-expired first.
        assert_eq!(ids, vec![marked.id, expired.id]);
    }

    #[tokio::test]
    async fn test_overdue_candidates_skip_already_overdue() {
        let db = test_db().await;
        let expired = basic_task().with_deadline(Utc::now() - Duration::hours(1));
        let expired = create_task(db.pool(), &expired).await.unwrap();

        let candidates = overdue_candidates(db.pool(), None, Utc::now()).await.unwrap();
        assert_eq!(candidates.len(), 1);

        assert!(claim_overdue(db.pool(), expired.id).await.unwrap());
        let candidates = overdue_candidates(db.pool(), None, Utc::now()).await.unwrap();
        assert!(candidates.is_empty());
        // Second claim finds nothing to do.
        assert!(!claim_overdue(db.pool(), expired.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_upcoming_window() {
        let db = test_db().await;
        let soon = basic_task().with_deadline(Utc::now() + Duration::hours(2));
        let soon = create_task(db.pool(), &soon).await.unwrap();
        let later = basic_task().with_deadline(Utc::now() + Duration::days(3));
        create_task(db.pool(), &later).await.unwrap();

        let now = Utc::now();
        let tasks = upcoming_tasks(db.pool(), None, now, now + Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, soon.id);
    }

    #[tokio::test]
    async fn test_purge_never_removes_active_tasks() {
        let db = test_db().await;
        let active = create_task(db.pool(), &basic_task()).await.unwrap();
        let done = create_task(db.pool(), &basic_task()).await.unwrap();
        change_status(db.pool(), done.id, TaskStatus::Done)
            .await
            .unwrap();

        // Cutoff in the future: every terminal task is older than it.
        let removed = purge_old_terminal(db.pool(), None, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(get_task(db.pool(), active.id).await.is_ok());
        assert!(get_task(db.pool(), done.id).await.is_err());
    }

    #[tokio::test]
    async fn test_move_to_archive_copies_rows() {
        let db = test_db().await;
        let done = create_task(db.pool(), &basic_task()).await.unwrap();
        change_status(db.pool(), done.id, TaskStatus::Done)
            .await
            .unwrap();

        let archived = move_old_terminal_to_archive(db.pool(), None, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(archived, 1);
        assert!(get_task(db.pool(), done.id).await.is_err());

        let kept: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks_archive")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(kept, 1);
    }
}
