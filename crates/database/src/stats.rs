//! Aggregate statistics over tasks.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::Result;
use crate::models::{
    AssigneeCount, DayCount, PriorityCount, StatsPeriod, TagCount, TaskStats, WeeklySummary,
};

/// Per-status counts plus the busiest assignees, optionally scoped to a
/// chat and bounded to a creation period.
pub async fn task_stats(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    period: StatsPeriod,
) -> Result<TaskStats> {
    let cutoff = period.cutoff(Utc::now());

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT status, COUNT(*) FROM tasks WHERE 1 = 1");
    push_scope(&mut qb, chat_id, cutoff);
    qb.push(" GROUP BY status");

    let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(pool).await?;

    let mut stats = TaskStats::default();
    for (status, count) in rows {
        stats.total += count;
        match status.as_str() {
            "todo" => stats.todo = count,
            "in_progress" => stats.in_progress = count,
            "done" => stats.done = count,
            "cancelled" => stats.cancelled = count,
            "overdue" => stats.overdue = count,
            other => tracing::warn!(status = other, "unknown status in stats"),
        }
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT assignee_id, assignee_name, COUNT(*) AS task_count \
         FROM tasks WHERE assignee_id IS NOT NULL",
    );
    push_scope(&mut qb, chat_id, cutoff);
    qb.push(" GROUP BY assignee_id ORDER BY task_count DESC, assignee_id ASC LIMIT 10");
    stats.top_assignees = qb.build_query_as::<AssigneeCount>().fetch_all(pool).await?;

    Ok(stats)
}

/// Task counts per priority, highest priority first.
pub async fn priority_counts(pool: &SqlitePool, chat_id: Option<i64>) -> Result<Vec<PriorityCount>> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT priority, COUNT(*) AS task_count FROM tasks WHERE 1 = 1");
    push_scope(&mut qb, chat_id, None);
    qb.push(
        " GROUP BY priority \
         ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END",
    );

    let counts = qb.build_query_as::<PriorityCount>().fetch_all(pool).await?;
    Ok(counts)
}

/// Tag usage counts, most used first.
pub async fn list_tags(pool: &SqlitePool, chat_id: Option<i64>) -> Result<Vec<TagCount>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT tt.tag, COUNT(*) AS task_count FROM task_tags tt \
         INNER JOIN tasks t ON t.id = tt.task_id WHERE 1 = 1",
    );
    if let Some(chat_id) = chat_id {
        qb.push(" AND t.chat_id = ").push_bind(chat_id);
    }
    qb.push(" GROUP BY tt.tag ORDER BY task_count DESC, tt.tag ASC");

    let counts = qb.build_query_as::<TagCount>().fetch_all(pool).await?;
    Ok(counts)
}

/// Created/completed counts per calendar day over the trailing window.
///
/// Days with no activity are omitted; days appear in ascending order.
pub async fn daily_trend(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<DayCount>> {
    let cutoff = now - Duration::days(days as i64);
    let mut merged: BTreeMap<String, (i64, i64)> = BTreeMap::new();

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT substr(created_at, 1, 10) AS day, COUNT(*) FROM tasks WHERE created_at >= ",
    );
    qb.push_bind(cutoff);
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    qb.push(" GROUP BY day");
    let created: Vec<(String, i64)> = qb.build_query_as().fetch_all(pool).await?;
    for (day, count) in created {
        merged.entry(day).or_default().0 = count;
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT substr(completed_at, 1, 10) AS day, COUNT(*) FROM tasks \
         WHERE status = 'done' AND completed_at >= ",
    );
    qb.push_bind(cutoff);
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    qb.push(" GROUP BY day");
    let completed: Vec<(String, i64)> = qb.build_query_as().fetch_all(pool).await?;
    for (day, count) in completed {
        merged.entry(day).or_default().1 = count;
    }

    Ok(merged
        .into_iter()
        .map(|(day, (created, completed))| DayCount {
            day,
            created,
            completed,
        })
        .collect())
}

/// Week-over-week activity summary for a chat.
pub async fn weekly_summary(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<WeeklySummary> {
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);

    let created_this_week =
        count_where(pool, chat_id, "created_at >= ", week_ago, None).await?;
    let done_this_week =
        count_where(pool, chat_id, "completed_at >= ", week_ago, Some("done")).await?;
    let cancelled_this_week = count_between(
        pool,
        chat_id,
        "updated_at",
        week_ago,
        now,
        Some("cancelled"),
    )
    .await?;
    let created_prev_week =
        count_between(pool, chat_id, "created_at", two_weeks_ago, week_ago, None).await?;
    let done_prev_week = count_between(
        pool,
        chat_id,
        "completed_at",
        two_weeks_ago,
        week_ago,
        Some("done"),
    )
    .await?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COUNT(*) FROM tasks WHERE status IN ('todo', 'in_progress', 'overdue')",
    );
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    let active_tasks: i64 = qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM tasks WHERE status = 'overdue'");
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    let overdue_tasks: i64 = qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT assignee_id, assignee_name, COUNT(*) AS task_count FROM tasks \
         WHERE status = 'done' AND assignee_id IS NOT NULL AND completed_at >= ",
    );
    qb.push_bind(week_ago);
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    qb.push(" GROUP BY assignee_id ORDER BY task_count DESC, assignee_id ASC LIMIT 5");
    let top_performers = qb.build_query_as::<AssigneeCount>().fetch_all(pool).await?;

    Ok(WeeklySummary {
        created_this_week,
        done_this_week,
        cancelled_this_week,
        created_prev_week,
        done_prev_week,
        active_tasks,
        overdue_tasks,
        top_performers,
    })
}

fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, chat_id: Option<i64>, cutoff: Option<DateTime<Utc>>) {
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    if let Some(cutoff) = cutoff {
        qb.push(" AND created_at >= ").push_bind(cutoff);
    }
}

async fn count_where(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    condition: &str,
    bound: DateTime<Utc>,
    status: Option<&str>,
) -> Result<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM tasks WHERE ");
    qb.push(condition).push_bind(bound);
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status.to_string());
    }
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}

async fn count_between(
    pool: &SqlitePool,
    chat_id: Option<i64>,
    column: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    status: Option<&str>,
) -> Result<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM tasks WHERE ");
    qb.push(column).push(" >= ").push_bind(from);
    qb.push(" AND ").push(column).push(" < ").push_bind(to);
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status.to_string());
    }
    if let Some(chat_id) = chat_id {
        qb.push(" AND chat_id = ").push_bind(chat_id);
    }
    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}
