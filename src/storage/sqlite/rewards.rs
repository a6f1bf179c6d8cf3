//! Rewards, stock reservation and redemption rows.

use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{enum_col, opt_ts_col, ts_col, uuid_col};
use crate::error::Result;
use crate::model::{Redemption, RedemptionStatus, Reward, TextEnum};
use crate::storage::schema::{Redemptions, Rewards};
use crate::utils::format_ts;

// ============================================================================
// Rewards
// ============================================================================

const REWARD_COLUMNS: [Rewards; 7] = [
    Rewards::Id,
    Rewards::Name,
    Rewards::Description,
    Rewards::Cost,
    Rewards::Stock,
    Rewards::Active,
    Rewards::CreatedAt,
];

fn reward_from_row(row: &SqliteRow) -> Result<Reward> {
    Ok(Reward {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        cost: row.try_get("cost")?,
        stock: row.try_get("stock")?,
        active: row.try_get("active")?,
        created_at: ts_col(row, "created_at")?,
    })
}

pub async fn insert_reward(conn: &mut SqliteConnection, reward: &Reward) -> Result<()> {
    let query = Query::insert()
        .into_table(Rewards::Table)
        .columns(REWARD_COLUMNS)
        .values_panic([
            reward.id.to_string().into(),
            reward.name.clone().into(),
            reward.description.clone().into(),
            reward.cost.into(),
            reward.stock.into(),
            reward.active.into(),
            format_ts(reward.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

pub async fn get_reward(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Reward>> {
    let query = Query::select()
        .columns(REWARD_COLUMNS)
        .from(Rewards::Table)
        .and_where(Expr::col(Rewards::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(reward_from_row).transpose()
}

// Conditional builders live in sync fns so no statement is held across an
// await (sea-query statements are not Send).
fn list_rewards_sql(active_only: bool) -> String {
    let mut select = Query::select();
    select.columns(REWARD_COLUMNS).from(Rewards::Table);
    if active_only {
        select.and_where(Expr::col(Rewards::Active).eq(true));
    }
    select
        .order_by(Rewards::Cost, Order::Asc)
        .order_by(Rewards::Name, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// Rewards by cost, cheapest first.
pub async fn list_rewards(conn: &mut SqliteConnection, active_only: bool) -> Result<Vec<Reward>> {
    let query = list_rewards_sql(active_only);
    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(reward_from_row).collect()
}

pub async fn set_reward_active(conn: &mut SqliteConnection, id: Uuid, active: bool) -> Result<bool> {
    let query = Query::update()
        .table(Rewards::Table)
        .value(Rewards::Active, active)
        .and_where(Expr::col(Rewards::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_stock(conn: &mut SqliteConnection, id: Uuid, stock: Option<i64>) -> Result<bool> {
    let query = Query::update()
        .table(Rewards::Table)
        .value(Rewards::Stock, stock)
        .and_where(Expr::col(Rewards::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Take one unit of stock. Unlimited rewards always succeed.
///
/// Returns false when the reward is out of stock.
pub async fn reserve_stock(conn: &mut SqliteConnection, id: Uuid) -> Result<bool> {
    let query = Query::update()
        .table(Rewards::Table)
        .value(Rewards::Stock, Expr::col(Rewards::Stock).sub(1))
        .and_where(Expr::col(Rewards::Id).eq(id.to_string()))
        .and_where(Expr::col(Rewards::Stock).gt(0))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    if result.rows_affected() > 0 {
        return Ok(true);
    }

    // No row changed: either unlimited (NULL stock) or exhausted.
    let reward = get_reward(conn, id).await?;
    Ok(reward.is_some_and(|r| r.stock.is_none()))
}

/// Return one unit of stock. No-op for unlimited rewards.
pub async fn release_stock(conn: &mut SqliteConnection, id: Uuid) -> Result<()> {
    let query = Query::update()
        .table(Rewards::Table)
        .value(Rewards::Stock, Expr::col(Rewards::Stock).add(1))
        .and_where(Expr::col(Rewards::Id).eq(id.to_string()))
        .and_where(Expr::col(Rewards::Stock).is_not_null())
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

// ============================================================================
// Redemptions
// ============================================================================

const REDEMPTION_COLUMNS: [Redemptions; 9] = [
    Redemptions::Id,
    Redemptions::ClientId,
    Redemptions::RewardId,
    Redemptions::PointsSpent,
    Redemptions::Status,
    Redemptions::CreatedAt,
    Redemptions::DecidedAt,
    Redemptions::DecidedBy,
    Redemptions::Note,
];

fn redemption_from_row(row: &SqliteRow) -> Result<Redemption> {
    Ok(Redemption {
        id: uuid_col(row, "id")?,
        client_id: uuid_col(row, "client_id")?,
        reward_id: uuid_col(row, "reward_id")?,
        points_spent: row.try_get("points_spent")?,
        status: enum_col(row, "status")?,
        created_at: ts_col(row, "created_at")?,
        decided_at: opt_ts_col(row, "decided_at")?,
        decided_by: row.try_get("decided_by")?,
        note: row.try_get("note")?,
    })
}

pub async fn insert_redemption(conn: &mut SqliteConnection, redemption: &Redemption) -> Result<()> {
    let query = Query::insert()
        .into_table(Redemptions::Table)
        .columns(REDEMPTION_COLUMNS)
        .values_panic([
            redemption.id.to_string().into(),
            redemption.client_id.to_string().into(),
            redemption.reward_id.to_string().into(),
            redemption.points_spent.into(),
            redemption.status.as_str().into(),
            format_ts(redemption.created_at).into(),
            redemption.decided_at.map(format_ts).into(),
            redemption.decided_by.clone().into(),
            redemption.note.clone().into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

pub async fn get_redemption(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Redemption>> {
    let query = Query::select()
        .columns(REDEMPTION_COLUMNS)
        .from(Redemptions::Table)
        .and_where(Expr::col(Redemptions::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(redemption_from_row).transpose()
}

/// Filter for [`list_redemptions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RedemptionFilter {
    pub client_id: Option<Uuid>,
    pub status: Option<RedemptionStatus>,
}

fn list_redemptions_sql(filter: RedemptionFilter) -> String {
    let mut select = Query::select();
    select.columns(REDEMPTION_COLUMNS).from(Redemptions::Table);
    if let Some(client_id) = filter.client_id {
        select.and_where(Expr::col(Redemptions::ClientId).eq(client_id.to_string()));
    }
    if let Some(status) = filter.status {
        select.and_where(Expr::col(Redemptions::Status).eq(status.as_str()));
    }
    select
        .order_by(Redemptions::CreatedAt, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// Oldest first, so the admin queue reads in arrival order.
pub async fn list_redemptions(
    conn: &mut SqliteConnection,
    filter: RedemptionFilter,
) -> Result<Vec<Redemption>> {
    let query = list_redemptions_sql(filter);
    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(redemption_from_row).collect()
}

/// Move a pending redemption to `status`.
///
/// Guarded on `status = 'pending'`; returns false if the redemption was
/// already decided.
pub async fn decide(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: RedemptionStatus,
    decided_by: &str,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let query = Query::update()
        .table(Redemptions::Table)
        .value(Redemptions::Status, status.as_str())
        .value(Redemptions::DecidedAt, format_ts(now))
        .value(Redemptions::DecidedBy, decided_by)
        .value(Redemptions::Note, note.map(str::to_string))
        .and_where(Expr::col(Redemptions::Id).eq(id.to_string()))
        .and_where(Expr::col(Redemptions::Status).eq(RedemptionStatus::Pending.as_str()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}
