//! Referral rows and the single-row referral settings table.

use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{enum_col, opt_ts_col, ts_col, uuid_col};
use crate::error::Result;
use crate::model::{Referral, ReferralSettings, ReferralStats, ReferralStatus, TextEnum, Tier};
use crate::storage::schema::{ReferralSettings as Settings, Referrals};
use crate::utils::format_ts;

/// Primary key of the only settings row.
const SETTINGS_ROW: i64 = 1;

const COLUMNS: [Referrals; 9] = [
    Referrals::Id,
    Referrals::ReferrerId,
    Referrals::RefereeId,
    Referrals::Status,
    Referrals::ReferrerTier,
    Referrals::ReferrerBonus,
    Referrals::RefereeBonus,
    Referrals::CreatedAt,
    Referrals::CompletedAt,
];

fn from_row(row: &SqliteRow) -> Result<Referral> {
    let tier: Option<String> = row.try_get("referrer_tier")?;
    Ok(Referral {
        id: uuid_col(row, "id")?,
        referrer_id: uuid_col(row, "referrer_id")?,
        referee_id: uuid_col(row, "referee_id")?,
        status: enum_col(row, "status")?,
        referrer_tier: tier.as_deref().map(Tier::parse).transpose()?,
        referrer_bonus: row.try_get("referrer_bonus")?,
        referee_bonus: row.try_get("referee_bonus")?,
        created_at: ts_col(row, "created_at")?,
        completed_at: opt_ts_col(row, "completed_at")?,
    })
}

pub async fn insert(conn: &mut SqliteConnection, referral: &Referral) -> Result<()> {
    let query = Query::insert()
        .into_table(Referrals::Table)
        .columns(COLUMNS)
        .values_panic([
            referral.id.to_string().into(),
            referral.referrer_id.to_string().into(),
            referral.referee_id.to_string().into(),
            referral.status.as_str().into(),
            referral.referrer_tier.map(|t| t.as_str()).into(),
            referral.referrer_bonus.into(),
            referral.referee_bonus.into(),
            format_ts(referral.created_at).into(),
            referral.completed_at.map(format_ts).into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

/// The referral that brought `referee_id` in, if any.
pub async fn find_by_referee(
    conn: &mut SqliteConnection,
    referee_id: Uuid,
) -> Result<Option<Referral>> {
    let query = Query::select()
        .columns(COLUMNS)
        .from(Referrals::Table)
        .and_where(Expr::col(Referrals::RefereeId).eq(referee_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(from_row).transpose()
}

/// Referrals made by one client, newest first.
pub async fn list_for_referrer(
    conn: &mut SqliteConnection,
    referrer_id: Uuid,
) -> Result<Vec<Referral>> {
    let query = Query::select()
        .columns(COLUMNS)
        .from(Referrals::Table)
        .and_where(Expr::col(Referrals::ReferrerId).eq(referrer_id.to_string()))
        .order_by(Referrals::CreatedAt, Order::Desc)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(from_row).collect()
}

/// Settle a pending referral.
///
/// Guarded on `status = 'pending'`; returns false when the referral was
/// already settled, which makes a replayed completion a no-op.
pub async fn complete(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: ReferralStatus,
    referrer_tier: Tier,
    referrer_bonus: i64,
    referee_bonus: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let query = Query::update()
        .table(Referrals::Table)
        .value(Referrals::Status, status.as_str())
        .value(Referrals::ReferrerTier, referrer_tier.as_str())
        .value(Referrals::ReferrerBonus, referrer_bonus)
        .value(Referrals::RefereeBonus, referee_bonus)
        .value(Referrals::CompletedAt, format_ts(now))
        .and_where(Expr::col(Referrals::Id).eq(id.to_string()))
        .and_where(Expr::col(Referrals::Status).eq(ReferralStatus::Pending.as_str()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Counts for one referrer. `month_start` bounds the monthly window.
pub async fn stats(
    conn: &mut SqliteConnection,
    referrer_id: Uuid,
    month_start: DateTime<Utc>,
) -> Result<ReferralStats> {
    let completed = ReferralStatus::Completed.as_str();
    let query = Query::select()
        .expr_as(
            Expr::cust_with_values(
                "COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0)",
                [completed],
            ),
            sea_query::Alias::new("lifetime"),
        )
        .expr_as(
            Expr::cust_with_values(
                "COALESCE(SUM(CASE WHEN status = ? AND completed_at >= ? THEN 1 ELSE 0 END), 0)",
                [completed.to_string(), format_ts(month_start)],
            ),
            sea_query::Alias::new("this_month"),
        )
        .expr_as(
            Expr::cust_with_values(
                "COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0)",
                [ReferralStatus::Capped.as_str()],
            ),
            sea_query::Alias::new("capped"),
        )
        .expr_as(
            Expr::cust_with_values(
                "COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0)",
                [ReferralStatus::Pending.as_str()],
            ),
            sea_query::Alias::new("pending"),
        )
        .from(Referrals::Table)
        .and_where(Expr::col(Referrals::ReferrerId).eq(referrer_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
    Ok(ReferralStats {
        completed_this_month: row.try_get("this_month")?,
        completed_lifetime: row.try_get("lifetime")?,
        capped: row.try_get("capped")?,
        pending: row.try_get("pending")?,
    })
}

// ============================================================================
// Settings
// ============================================================================

const SETTINGS_COLUMNS: [Settings; 10] = [
    Settings::Id,
    Settings::Enabled,
    Settings::RefereeBonus,
    Settings::BronzeBonus,
    Settings::SilverBonus,
    Settings::GoldBonus,
    Settings::VipBonus,
    Settings::MonthlyCap,
    Settings::LifetimeCap,
    Settings::UpdatedAt,
];

pub async fn get_settings(conn: &mut SqliteConnection) -> Result<Option<ReferralSettings>> {
    let query = Query::select()
        .columns(SETTINGS_COLUMNS)
        .from(Settings::Table)
        .and_where(Expr::col(Settings::Id).eq(SETTINGS_ROW))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(ReferralSettings {
        enabled: row.try_get("enabled")?,
        referee_bonus: row.try_get("referee_bonus")?,
        bronze_bonus: row.try_get("bronze_bonus")?,
        silver_bonus: row.try_get("silver_bonus")?,
        gold_bonus: row.try_get("gold_bonus")?,
        vip_bonus: row.try_get("vip_bonus")?,
        monthly_cap: row.try_get("monthly_cap")?,
        lifetime_cap: row.try_get("lifetime_cap")?,
    }))
}

fn put_settings_sql(settings: &ReferralSettings, now: DateTime<Utc>, overwrite: bool) -> String {
    let on_conflict = if overwrite {
        OnConflict::column(Settings::Id)
            .update_columns([
                Settings::Enabled,
                Settings::RefereeBonus,
                Settings::BronzeBonus,
                Settings::SilverBonus,
                Settings::GoldBonus,
                Settings::VipBonus,
                Settings::MonthlyCap,
                Settings::LifetimeCap,
                Settings::UpdatedAt,
            ])
            .to_owned()
    } else {
        OnConflict::column(Settings::Id).do_nothing().to_owned()
    };

    Query::insert()
        .into_table(Settings::Table)
        .columns(SETTINGS_COLUMNS)
        .values_panic([
            SETTINGS_ROW.into(),
            settings.enabled.into(),
            settings.referee_bonus.into(),
            settings.bronze_bonus.into(),
            settings.silver_bonus.into(),
            settings.gold_bonus.into(),
            settings.vip_bonus.into(),
            settings.monthly_cap.into(),
            settings.lifetime_cap.into(),
            format_ts(now).into(),
        ])
        .on_conflict(on_conflict)
        .to_string(SqliteQueryBuilder)
}

/// Write the settings row.
///
/// With `overwrite` false an existing row is left alone, which is how the
/// configured defaults seed a fresh database without clobbering edits.
pub async fn put_settings(
    conn: &mut SqliteConnection,
    settings: &ReferralSettings,
    now: DateTime<Utc>,
    overwrite: bool,
) -> Result<bool> {
    let query = put_settings_sql(settings, now, overwrite);
    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}
