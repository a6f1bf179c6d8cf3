//! SQLite queries, one module per table group.
//!
//! Every function takes a `&mut SqliteConnection` so the services can compose
//! several of them inside one `BEGIN IMMEDIATE` transaction.

pub mod clients;
pub mod codes;
pub mod ledger;
pub mod notifications;
pub mod referrals;
pub mod rewards;
pub mod webhooks;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::model::TextEnum;
use crate::utils::parse_ts;

/// Acquire a connection and open a write transaction on it.
///
/// BEGIN IMMEDIATE takes the write lock upfront, so two flows never race to
/// upgrade a shared lock and deadlock each other.
pub async fn begin_immediate(pool: &SqlitePool) -> Result<PoolConnection<Sqlite>> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(conn)
}

/// Commit on success, roll back on error.
pub async fn finish<T>(conn: &mut SqliteConnection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => Ok(value),
            Err(e) => {
                // The connection goes back to the pool; it must not stay mid-transaction
                rollback(conn).await;
                Err(e.into())
            }
        },
        Err(e) => {
            debug!(error = %e, "transaction rolled back");
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn rollback(conn: &mut SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        warn!(error = %e, "rollback failed");
    }
}

pub(crate) fn uuid_col(row: &SqliteRow, col: &str) -> Result<Uuid> {
    let raw: String = row.try_get(col)?;
    Ok(Uuid::parse_str(&raw)?)
}

pub(crate) fn opt_uuid_col(row: &SqliteRow, col: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|r| Uuid::parse_str(&r).map_err(Into::into)).transpose()
}

pub(crate) fn ts_col(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(col)?;
    parse_ts(&raw)
}

pub(crate) fn opt_ts_col(row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(col)?;
    raw.as_deref().map(parse_ts).transpose()
}

pub(crate) fn enum_col<E: TextEnum>(row: &SqliteRow, col: &str) -> Result<E> {
    let raw: String = row.try_get(col)?;
    E::parse(&raw)
}

/// Convert an `Option<Uuid>` into a nullable text value.
pub(crate) fn opt_id(id: Option<Uuid>) -> Option<String> {
    id.map(|id| id.to_string())
}
