//! User directory operations.
//!
//! The directory is populated passively from message traffic, so each
//! write is a "sighting": fields merge by presence and chat membership
//! is append-only.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{User, UserSighting};

/// Record a sighting of a user, inserting or merging by presence.
///
/// Non-empty fields overwrite stored values; empty or absent fields
/// leave them alone. `last_seen_at` always advances.
pub async fn upsert_user(pool: &SqlitePool, sighting: &UserSighting) -> Result<User> {
    if sighting.id == 0 {
        return Err(DatabaseError::Validation("user id is required".to_string()));
    }

    let now = Utc::now();
    let username = non_empty(&sighting.username);
    let first_name = non_empty(&sighting.first_name);
    let last_name = non_empty(&sighting.last_name);
    let display_name = non_empty(&sighting.display_name);

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE users SET
            username     = COALESCE(?, username),
            first_name   = COALESCE(?, first_name),
            last_name    = COALESCE(?, last_name),
            display_name = COALESCE(?, display_name),
            last_seen_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&username)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&display_name)
    .bind(now)
    .bind(sighting.id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, username, first_name, last_name, display_name,
                 first_seen_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sighting.id)
        .bind(&username)
        .bind(&first_name)
        .bind(&last_name)
        .bind(&display_name)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tracing::debug!(user_id = sighting.id, "user first seen");
    }

    if let Some(chat_id) = sighting.chat_id {
        sqlx::query("INSERT OR IGNORE INTO user_chats (user_id, chat_id) VALUES (?, ?)")
            .bind(sighting.id)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    get_user(pool, sighting.id).await
}

/// Get a user by id, with chat memberships hydrated.
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<User> {
    let mut user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "User",
            id: id.to_string(),
        })?;

    user.chat_ids = chat_ids(pool, id).await?;
    Ok(user)
}

/// Look up a user by exact username, case-insensitively.
pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let username = username.trim().trim_start_matches('@').to_lowercase();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(username) = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    match user {
        Some(mut user) => {
            user.chat_ids = chat_ids(pool, user.id).await?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

/// List known users, optionally only those seen in a given chat.
pub async fn list_users(pool: &SqlitePool, chat_id: Option<i64>) -> Result<Vec<User>> {
    let mut users = match chat_id {
        Some(chat_id) => {
            sqlx::query_as::<_, User>(
                "SELECT u.* FROM users u \
                 INNER JOIN user_chats uc ON uc.user_id = u.id \
                 WHERE uc.chat_id = ? ORDER BY u.id",
            )
            .bind(chat_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
                .fetch_all(pool)
                .await?
        }
    };

    for user in users.iter_mut() {
        user.chat_ids = chat_ids(pool, user.id).await?;
    }
    Ok(users)
}

async fn chat_ids(pool: &SqlitePool, user_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT chat_id FROM user_chats WHERE user_id = ? ORDER BY chat_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
