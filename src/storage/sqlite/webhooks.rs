//! Webhook endpoints and the event outbox.
//!
//! Events are written to `webhook_outbox` inside the transaction of the flow
//! that raised them, and removed from the pending set only once the relay
//! has delivered them.

use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{opt_ts_col, ts_col, uuid_col};
use crate::error::Result;
use crate::model::{OutboxEvent, WebhookEndpoint};
use crate::storage::schema::{WebhookEndpoints, WebhookOutbox};
use crate::utils::format_ts;

// ============================================================================
// Endpoints
// ============================================================================

const ENDPOINT_COLUMNS: [WebhookEndpoints; 6] = [
    WebhookEndpoints::Id,
    WebhookEndpoints::Url,
    WebhookEndpoints::Secret,
    WebhookEndpoints::Events,
    WebhookEndpoints::Active,
    WebhookEndpoints::CreatedAt,
];

fn endpoint_from_row(row: &SqliteRow) -> Result<WebhookEndpoint> {
    let events: String = row.try_get("events")?;
    Ok(WebhookEndpoint {
        id: uuid_col(row, "id")?,
        url: row.try_get("url")?,
        secret: row.try_get("secret")?,
        events: serde_json::from_str(&events)?,
        active: row.try_get("active")?,
        created_at: ts_col(row, "created_at")?,
    })
}

pub async fn insert_endpoint(conn: &mut SqliteConnection, endpoint: &WebhookEndpoint) -> Result<()> {
    let query = Query::insert()
        .into_table(WebhookEndpoints::Table)
        .columns(ENDPOINT_COLUMNS)
        .values_panic([
            endpoint.id.to_string().into(),
            endpoint.url.clone().into(),
            endpoint.secret.clone().into(),
            serde_json::to_string(&endpoint.events)?.into(),
            endpoint.active.into(),
            format_ts(endpoint.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

// Built outside the async fn: sea-query statements are not Send.
fn list_endpoints_sql(active_only: bool) -> String {
    let mut select = Query::select();
    select.columns(ENDPOINT_COLUMNS).from(WebhookEndpoints::Table);
    if active_only {
        select.and_where(Expr::col(WebhookEndpoints::Active).eq(true));
    }
    select
        .order_by(WebhookEndpoints::CreatedAt, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

pub async fn list_endpoints(
    conn: &mut SqliteConnection,
    active_only: bool,
) -> Result<Vec<WebhookEndpoint>> {
    let query = list_endpoints_sql(active_only);
    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(endpoint_from_row).collect()
}

pub async fn set_endpoint_active(
    conn: &mut SqliteConnection,
    id: Uuid,
    active: bool,
) -> Result<bool> {
    let query = Query::update()
        .table(WebhookEndpoints::Table)
        .value(WebhookEndpoints::Active, active)
        .and_where(Expr::col(WebhookEndpoints::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Outbox
// ============================================================================

const OUTBOX_COLUMNS: [WebhookOutbox; 8] = [
    WebhookOutbox::Id,
    WebhookOutbox::Event,
    WebhookOutbox::Payload,
    WebhookOutbox::CreatedAt,
    WebhookOutbox::Attempts,
    WebhookOutbox::DeliveredAt,
    WebhookOutbox::LastError,
    WebhookOutbox::Dead,
];

fn event_from_row(row: &SqliteRow) -> Result<OutboxEvent> {
    let payload: String = row.try_get("payload")?;
    Ok(OutboxEvent {
        id: uuid_col(row, "id")?,
        event: row.try_get("event")?,
        payload: serde_json::from_str(&payload)?,
        created_at: ts_col(row, "created_at")?,
        attempts: row.try_get("attempts")?,
        delivered_at: opt_ts_col(row, "delivered_at")?,
        last_error: row.try_get("last_error")?,
        dead: row.try_get("dead")?,
    })
}

pub async fn enqueue(conn: &mut SqliteConnection, event: &OutboxEvent) -> Result<()> {
    let query = Query::insert()
        .into_table(WebhookOutbox::Table)
        .columns(OUTBOX_COLUMNS)
        .values_panic([
            event.id.to_string().into(),
            event.event.clone().into(),
            serde_json::to_string(&event.payload)?.into(),
            format_ts(event.created_at).into(),
            event.attempts.into(),
            event.delivered_at.map(format_ts).into(),
            event.last_error.clone().into(),
            event.dead.into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

pub async fn get_event(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<OutboxEvent>> {
    let query = Query::select()
        .columns(OUTBOX_COLUMNS)
        .from(WebhookOutbox::Table)
        .and_where(Expr::col(WebhookOutbox::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(event_from_row).transpose()
}

/// Undelivered, live events, oldest first.
pub async fn pending(conn: &mut SqliteConnection, limit: u64) -> Result<Vec<OutboxEvent>> {
    let query = Query::select()
        .columns(OUTBOX_COLUMNS)
        .from(WebhookOutbox::Table)
        .and_where(Expr::col(WebhookOutbox::DeliveredAt).is_null())
        .and_where(Expr::col(WebhookOutbox::Dead).eq(false))
        .order_by(WebhookOutbox::CreatedAt, Order::Asc)
        .order_by_expr(Expr::cust("rowid"), Order::Asc)
        .limit(limit)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(event_from_row).collect()
}

/// Every event of one kind, oldest first.
pub async fn list_by_event(conn: &mut SqliteConnection, event: &str) -> Result<Vec<OutboxEvent>> {
    let query = Query::select()
        .columns(OUTBOX_COLUMNS)
        .from(WebhookOutbox::Table)
        .and_where(Expr::col(WebhookOutbox::Event).eq(event))
        .order_by(WebhookOutbox::CreatedAt, Order::Asc)
        .order_by_expr(Expr::cust("rowid"), Order::Asc)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(event_from_row).collect()
}

pub async fn mark_delivered(conn: &mut SqliteConnection, id: Uuid, now: DateTime<Utc>) -> Result<()> {
    let query = Query::update()
        .table(WebhookOutbox::Table)
        .value(WebhookOutbox::DeliveredAt, format_ts(now))
        .and_where(Expr::col(WebhookOutbox::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

/// Record a failed delivery pass.
pub async fn record_failure(
    conn: &mut SqliteConnection,
    id: Uuid,
    attempts: i64,
    error: &str,
    dead: bool,
) -> Result<()> {
    let query = Query::update()
        .table(WebhookOutbox::Table)
        .value(WebhookOutbox::Attempts, attempts)
        .value(WebhookOutbox::LastError, error)
        .value(WebhookOutbox::Dead, dead)
        .and_where(Expr::col(WebhookOutbox::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}
