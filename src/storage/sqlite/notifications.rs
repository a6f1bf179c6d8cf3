//! Notification rows.

use chrono::{DateTime, Utc};
use sea_query::{Expr, Func, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{enum_col, opt_ts_col, ts_col, uuid_col};
use crate::error::Result;
use crate::model::{Notification, TextEnum};
use crate::storage::schema::Notifications;
use crate::utils::format_ts;

const COLUMNS: [Notifications; 7] = [
    Notifications::Id,
    Notifications::ClientId,
    Notifications::Kind,
    Notifications::Title,
    Notifications::Body,
    Notifications::ReadAt,
    Notifications::CreatedAt,
];

fn from_row(row: &SqliteRow) -> Result<Notification> {
    Ok(Notification {
        id: uuid_col(row, "id")?,
        client_id: uuid_col(row, "client_id")?,
        kind: enum_col(row, "kind")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        read_at: opt_ts_col(row, "read_at")?,
        created_at: ts_col(row, "created_at")?,
    })
}

pub async fn insert(conn: &mut SqliteConnection, notification: &Notification) -> Result<()> {
    let query = Query::insert()
        .into_table(Notifications::Table)
        .columns(COLUMNS)
        .values_panic([
            notification.id.to_string().into(),
            notification.client_id.to_string().into(),
            notification.kind.as_str().into(),
            notification.title.clone().into(),
            notification.body.clone().into(),
            notification.read_at.map(format_ts).into(),
            format_ts(notification.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

// Sync so the (non-Send) statement never lives across an await.
fn list_for_client_sql(client_id: Uuid, unread_only: bool, limit: u64) -> String {
    let mut select = Query::select();
    select
        .columns(COLUMNS)
        .from(Notifications::Table)
        .and_where(Expr::col(Notifications::ClientId).eq(client_id.to_string()));
    if unread_only {
        select.and_where(Expr::col(Notifications::ReadAt).is_null());
    }
    select
        .order_by(Notifications::CreatedAt, Order::Desc)
        .order_by_expr(Expr::cust("rowid"), Order::Desc)
        .limit(limit)
        .to_string(SqliteQueryBuilder)
}

/// Newest first.
pub async fn list_for_client(
    conn: &mut SqliteConnection,
    client_id: Uuid,
    unread_only: bool,
    limit: u64,
) -> Result<Vec<Notification>> {
    let query = list_for_client_sql(client_id, unread_only, limit);
    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(from_row).collect()
}

/// Mark one of the client's notifications read. Returns false when the
/// notification does not exist or belongs to someone else.
pub async fn mark_read(
    conn: &mut SqliteConnection,
    client_id: Uuid,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let query = Query::update()
        .table(Notifications::Table)
        .value(
            Notifications::ReadAt,
            Func::if_null(Expr::col(Notifications::ReadAt), format_ts(now)),
        )
        .and_where(Expr::col(Notifications::Id).eq(id.to_string()))
        .and_where(Expr::col(Notifications::ClientId).eq(client_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Returns how many notifications changed.
pub async fn mark_all_read(
    conn: &mut SqliteConnection,
    client_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64> {
    let query = Query::update()
        .table(Notifications::Table)
        .value(Notifications::ReadAt, format_ts(now))
        .and_where(Expr::col(Notifications::ClientId).eq(client_id.to_string()))
        .and_where(Expr::col(Notifications::ReadAt).is_null())
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

pub async fn unread_count(conn: &mut SqliteConnection, client_id: Uuid) -> Result<i64> {
    let query = Query::select()
        .expr(Expr::col(Notifications::Id).count())
        .from(Notifications::Table)
        .and_where(Expr::col(Notifications::ClientId).eq(client_id.to_string()))
        .and_where(Expr::col(Notifications::ReadAt).is_null())
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
    Ok(row.try_get(0)?)
}
