//! Code batches, codes and campaigns.

use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{opt_id, opt_ts_col, opt_uuid_col, ts_col, uuid_col};
use crate::error::Result;
use crate::model::{Campaign, Code, CodeBatch};
use crate::storage::schema::{Campaigns, CodeBatches, Codes};
use crate::utils::format_ts;

// ============================================================================
// Batches
// ============================================================================

const BATCH_COLUMNS: [CodeBatches; 8] = [
    CodeBatches::Id,
    CodeBatches::Name,
    CodeBatches::Prefix,
    CodeBatches::Points,
    CodeBatches::Quantity,
    CodeBatches::ExpiresAt,
    CodeBatches::Active,
    CodeBatches::CreatedAt,
];

fn batch_from_row(row: &SqliteRow) -> Result<CodeBatch> {
    Ok(CodeBatch {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        prefix: row.try_get("prefix")?,
        points: row.try_get("points")?,
        quantity: row.try_get("quantity")?,
        expires_at: opt_ts_col(row, "expires_at")?,
        active: row.try_get("active")?,
        created_at: ts_col(row, "created_at")?,
    })
}

pub async fn insert_batch(conn: &mut SqliteConnection, batch: &CodeBatch) -> Result<()> {
    let query = Query::insert()
        .into_table(CodeBatches::Table)
        .columns(BATCH_COLUMNS)
        .values_panic([
            batch.id.to_string().into(),
            batch.name.clone().into(),
            batch.prefix.clone().into(),
            batch.points.into(),
            batch.quantity.into(),
            batch.expires_at.map(format_ts).into(),
            batch.active.into(),
            format_ts(batch.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

pub async fn get_batch(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<CodeBatch>> {
    let query = Query::select()
        .columns(BATCH_COLUMNS)
        .from(CodeBatches::Table)
        .and_where(Expr::col(CodeBatches::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(batch_from_row).transpose()
}

/// Newest first.
pub async fn list_batches(conn: &mut SqliteConnection) -> Result<Vec<CodeBatch>> {
    let query = Query::select()
        .columns(BATCH_COLUMNS)
        .from(CodeBatches::Table)
        .order_by(CodeBatches::CreatedAt, Order::Desc)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(batch_from_row).collect()
}

pub async fn set_batch_active(conn: &mut SqliteConnection, id: Uuid, active: bool) -> Result<bool> {
    let query = Query::update()
        .table(CodeBatches::Table)
        .value(CodeBatches::Active, active)
        .and_where(Expr::col(CodeBatches::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Codes
// ============================================================================

const CODE_COLUMNS: [Codes; 6] = [
    Codes::Id,
    Codes::BatchId,
    Codes::Code,
    Codes::RedeemedBy,
    Codes::RedeemedAt,
    Codes::PointsAwarded,
];

fn code_from_row(row: &SqliteRow) -> Result<Code> {
    Ok(Code {
        id: uuid_col(row, "id")?,
        batch_id: uuid_col(row, "batch_id")?,
        code: row.try_get("code")?,
        redeemed_by: opt_uuid_col(row, "redeemed_by")?,
        redeemed_at: opt_ts_col(row, "redeemed_at")?,
        points_awarded: row.try_get("points_awarded")?,
    })
}

/// Insert a code unless its text is already taken.
///
/// Returns false on a text collision so the caller can draw another suffix.
pub async fn try_insert_code(conn: &mut SqliteConnection, code: &Code) -> Result<bool> {
    let query = Query::insert()
        .into_table(Codes::Table)
        .columns(CODE_COLUMNS)
        .values_panic([
            code.id.to_string().into(),
            code.batch_id.to_string().into(),
            code.code.clone().into(),
            opt_id(code.redeemed_by).into(),
            code.redeemed_at.map(format_ts).into(),
            code.points_awarded.into(),
        ])
        .on_conflict(OnConflict::column(Codes::Code).do_nothing().to_owned())
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_code(conn: &mut SqliteConnection, text: &str) -> Result<Option<Code>> {
    let query = Query::select()
        .columns(CODE_COLUMNS)
        .from(Codes::Table)
        .and_where(Expr::col(Codes::Code).eq(text))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(code_from_row).transpose()
}

pub async fn list_codes(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<Vec<Code>> {
    let query = Query::select()
        .columns(CODE_COLUMNS)
        .from(Codes::Table)
        .and_where(Expr::col(Codes::BatchId).eq(batch_id.to_string()))
        .order_by(Codes::Code, Order::Asc)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(code_from_row).collect()
}

/// Claim an unredeemed code for a client.
///
/// The `redeemed_by IS NULL` guard makes the claim single-use: of two
/// concurrent claims exactly one affects a row.
pub async fn claim_code(
    conn: &mut SqliteConnection,
    code_id: Uuid,
    client_id: Uuid,
    points: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let query = Query::update()
        .table(Codes::Table)
        .value(Codes::RedeemedBy, client_id.to_string())
        .value(Codes::RedeemedAt, format_ts(now))
        .value(Codes::PointsAwarded, points)
        .and_where(Expr::col(Codes::Id).eq(code_id.to_string()))
        .and_where(Expr::col(Codes::RedeemedBy).is_null())
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Number of codes already redeemed from a batch.
pub async fn count_redeemed(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<i64> {
    let query = Query::select()
        .expr(Expr::col(Codes::Id).count())
        .from(Codes::Table)
        .and_where(Expr::col(Codes::BatchId).eq(batch_id.to_string()))
        .and_where(Expr::col(Codes::RedeemedBy).is_not_null())
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
    Ok(row.try_get(0)?)
}

// ============================================================================
// Campaigns
// ============================================================================

const CAMPAIGN_COLUMNS: [Campaigns; 7] = [
    Campaigns::Id,
    Campaigns::Name,
    Campaigns::MultiplierPercent,
    Campaigns::StartsAt,
    Campaigns::EndsAt,
    Campaigns::Active,
    Campaigns::CreatedAt,
];

fn campaign_from_row(row: &SqliteRow) -> Result<Campaign> {
    Ok(Campaign {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        multiplier_percent: row.try_get("multiplier_percent")?,
        starts_at: ts_col(row, "starts_at")?,
        ends_at: ts_col(row, "ends_at")?,
        active: row.try_get("active")?,
        created_at: ts_col(row, "created_at")?,
    })
}

pub async fn insert_campaign(conn: &mut SqliteConnection, campaign: &Campaign) -> Result<()> {
    let query = Query::insert()
        .into_table(Campaigns::Table)
        .columns(CAMPAIGN_COLUMNS)
        .values_panic([
            campaign.id.to_string().into(),
            campaign.name.clone().into(),
            campaign.multiplier_percent.into(),
            format_ts(campaign.starts_at).into(),
            format_ts(campaign.ends_at).into(),
            campaign.active.into(),
            format_ts(campaign.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

pub async fn set_campaign_active(
    conn: &mut SqliteConnection,
    id: Uuid,
    active: bool,
) -> Result<bool> {
    let query = Query::update()
        .table(Campaigns::Table)
        .value(Campaigns::Active, active)
        .and_where(Expr::col(Campaigns::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Every campaign, newest window first.
pub async fn list_campaigns(conn: &mut SqliteConnection) -> Result<Vec<Campaign>> {
    let query = Query::select()
        .columns(CAMPAIGN_COLUMNS)
        .from(Campaigns::Table)
        .order_by(Campaigns::StartsAt, Order::Desc)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(campaign_from_row).collect()
}

/// Active campaigns whose window contains `now`, highest multiplier first.
pub async fn running_campaigns(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Campaign>> {
    let now = format_ts(now);
    let query = Query::select()
        .columns(CAMPAIGN_COLUMNS)
        .from(Campaigns::Table)
        .and_where(Expr::col(Campaigns::Active).eq(true))
        .and_where(Expr::col(Campaigns::StartsAt).lte(now.clone()))
        .and_where(Expr::col(Campaigns::EndsAt).gt(now))
        .order_by(Campaigns::MultiplierPercent, Order::Desc)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(campaign_from_row).collect()
}
