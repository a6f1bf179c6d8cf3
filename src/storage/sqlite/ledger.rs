//! Ledger entry rows.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{enum_col, ts_col, uuid_col};
use crate::error::Result;
use crate::model::{LedgerEntry, TextEnum};
use crate::storage::schema::LedgerEntries;
use crate::utils::format_ts;

const COLUMNS: [LedgerEntries; 8] = [
    LedgerEntries::Id,
    LedgerEntries::ClientId,
    LedgerEntries::Delta,
    LedgerEntries::BalanceAfter,
    LedgerEntries::Kind,
    LedgerEntries::Reference,
    LedgerEntries::Note,
    LedgerEntries::CreatedAt,
];

fn from_row(row: &SqliteRow) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: uuid_col(row, "id")?,
        client_id: uuid_col(row, "client_id")?,
        delta: row.try_get("delta")?,
        balance_after: row.try_get("balance_after")?,
        kind: enum_col(row, "kind")?,
        reference: row.try_get("reference")?,
        note: row.try_get("note")?,
        created_at: ts_col(row, "created_at")?,
    })
}

pub async fn insert(conn: &mut SqliteConnection, entry: &LedgerEntry) -> Result<()> {
    let query = Query::insert()
        .into_table(LedgerEntries::Table)
        .columns(COLUMNS)
        .values_panic([
            entry.id.to_string().into(),
            entry.client_id.to_string().into(),
            entry.delta.into(),
            entry.balance_after.into(),
            entry.kind.as_str().into(),
            entry.reference.clone().into(),
            entry.note.clone().into(),
            format_ts(entry.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

/// Most recent entries first. Entries written in the same instant keep their
/// insertion order.
pub async fn list_for_client(
    conn: &mut SqliteConnection,
    client_id: Uuid,
    limit: u64,
) -> Result<Vec<LedgerEntry>> {
    let query = Query::select()
        .columns(COLUMNS)
        .from(LedgerEntries::Table)
        .and_where(Expr::col(LedgerEntries::ClientId).eq(client_id.to_string()))
        .order_by(LedgerEntries::CreatedAt, Order::Desc)
        .order_by_expr(Expr::cust("rowid"), Order::Desc)
        .limit(limit)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(from_row).collect()
}

/// Sum of every delta recorded for the client.
pub async fn balance_of(conn: &mut SqliteConnection, client_id: Uuid) -> Result<i64> {
    let query = Query::select()
        .expr(Expr::cust("COALESCE(SUM(delta), 0)"))
        .from(LedgerEntries::Table)
        .and_where(Expr::col(LedgerEntries::ClientId).eq(client_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
    Ok(row.try_get(0)?)
}
