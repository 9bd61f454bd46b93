//! Shelf Storage
//!
//! `SQLite` catalog for the Shelf library manager.
//!
//! # Architecture
//!
//! - **Vertical Slicing**: `albums` and `items` each own their queries
//! - **Flexible attributes**: full records are stored as JSON next to the
//!   indexed columns, so arbitrary fields survive a round trip
//! - **Atomic writes**: every `Catalog` mutation runs in one transaction
//!
//! # Example
//!
//! ```rust,no_run
//! use shelf_storage::{SqliteCatalog, create_pool, run_migrations};
//! use shelf_core::Catalog;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool("sqlite://library.db").await?;
//! run_migrations(&pool).await?;
//!
//! let catalog = SqliteCatalog::new(pool);
//! let albums = catalog.albums().await?;
//! # Ok(())
//! # }
//! ```

mod catalog;
mod error;

pub mod albums;
pub mod items;

pub use catalog::SqliteCatalog;
pub use error::StorageError;

use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePool;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
///
/// # Errors
///
/// Returns an error if migrations fail to run
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Create a new `SQLite` pool
///
/// # Arguments
///
/// * `database_url` - `SQLite` connection string (e.g., `<sqlite://library.db>`)
///
/// # Errors
///
/// Returns an error if the connection fails
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;

    tracing::debug!(url = %database_url, "Opening catalog database");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
