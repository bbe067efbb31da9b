//! SQLite persistence layer for the team task tracker.
//!
//! Holds the task store (lifecycle state machine, listing, search,
//! statistics) and the passively-populated user directory. All
//! operations are free functions over a [`sqlx::SqlitePool`]; the
//! [`Database`] wrapper owns the pool and runs migrations.
//!
//! # Example
//!
//! ```rust,no_run
//! use database::{Database, NewTask};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), database::DatabaseError> {
//!     let db = Database::connect("sqlite:tracker.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let input = NewTask::new("Prepare the quarterly report", 7, -1001);
//!     let task = database::task::create_task(db.pool(), &input).await?;
//!     println!("created task #{}", task.id);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod models;
pub mod stats;
pub mod task;
pub mod user;

pub use error::{DatabaseError, Result};
pub use models::{
    normalize_tags, AssigneeCount, DayCount, DeadlineExtension, NewTask, Priority, PriorityCount,
    StatsPeriod, StatusChange, TagCount, Task, TaskFilter, TaskPatch, TaskStats, TaskStatus, User,
    UserSighting, WeeklySummary,
};

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Default maximum number of pooled connections.
pub const DEFAULT_POOL_SIZE: u32 = 5;

/// Owns the connection pool and schema migrations.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database at the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, DEFAULT_POOL_SIZE).await
    }

    /// Connect with an explicit pool size.
    pub async fn connect_with_pool_size(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::debug!(url, max_connections, "database connected");
        Ok(Self { pool })
    }

    /// Run pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for in-flight connections to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
