//! SQLite storage: connection pool, schema and queries.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::Result;

pub mod schema;
pub mod sqlite;

/// Open the configured database and bring its schema up to date.
pub async fn init_storage(config: &StorageConfig) -> Result<SqlitePool> {
    info!("Storage: sqlite at {}", config.path);

    let pool = if config.is_in_memory() {
        open_in_memory().await?
    } else {
        if let Some(parent) = std::path::Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::error::ZingyError::Config(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?
    };

    migrate(&pool).await?;
    Ok(pool)
}

/// Fresh in-memory database on a single pooled connection.
///
/// The connection is never recycled, since closing it discards the data.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Apply every schema statement. Safe to run on each start.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in schema::MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let pool = open_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let tables: i64 = row.get("n");
        assert_eq!(tables, 12);
    }

    #[tokio::test]
    async fn test_init_storage_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("zingy.db");
        let config = StorageConfig {
            path: path.to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };

        let pool = init_storage(&config).await.unwrap();
        pool.close().await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_negative_balance_rejected_by_schema() {
        let pool = init_storage(&StorageConfig::in_memory()).await.unwrap();
        let result = sqlx::query(
            "INSERT INTO clients (id, name, phone, referral_code, points, created_at) \
             VALUES ('x', 'Ana', '5511999999999', 'ABCDEFGH', -1, '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
