//! Client rows and the version-guarded balance update.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{ts_col, uuid_col};
use crate::error::{Result, ZingyError};
use crate::model::Client;
use crate::storage::schema::Clients;
use crate::utils::format_ts;

const COLUMNS: [Clients; 10] = [
    Clients::Id,
    Clients::Name,
    Clients::Phone,
    Clients::Email,
    Clients::ReferralCode,
    Clients::Points,
    Clients::LifetimePoints,
    Clients::Version,
    Clients::Active,
    Clients::CreatedAt,
];

fn from_row(row: &SqliteRow) -> Result<Client> {
    Ok(Client {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        referral_code: row.try_get("referral_code")?,
        points: row.try_get("points")?,
        lifetime_points: row.try_get("lifetime_points")?,
        version: row.try_get("version")?,
        active: row.try_get("active")?,
        created_at: ts_col(row, "created_at")?,
    })
}

fn map_insert_error(err: sqlx::Error) -> ZingyError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() && db.message().contains("clients.phone") {
            return ZingyError::DuplicatePhone;
        }
    }
    err.into()
}

pub async fn insert(conn: &mut SqliteConnection, client: &Client) -> Result<()> {
    let query = Query::insert()
        .into_table(Clients::Table)
        .columns(COLUMNS)
        .values_panic([
            client.id.to_string().into(),
            client.name.clone().into(),
            client.phone.clone().into(),
            client.email.clone().into(),
            client.referral_code.clone().into(),
            client.points.into(),
            client.lifetime_points.into(),
            client.version.into(),
            client.active.into(),
            format_ts(client.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query)
        .execute(&mut *conn)
        .await
        .map_err(map_insert_error)?;
    Ok(())
}

async fn fetch_one_where(
    conn: &mut SqliteConnection,
    column: Clients,
    value: String,
) -> Result<Option<Client>> {
    let query = Query::select()
        .columns(COLUMNS)
        .from(Clients::Table)
        .and_where(Expr::col(column).eq(value))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn get(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Client>> {
    fetch_one_where(conn, Clients::Id, id.to_string()).await
}

/// Like [`get`], but a missing client is an error.
pub async fn require(conn: &mut SqliteConnection, id: Uuid) -> Result<Client> {
    get(conn, id)
        .await?
        .ok_or_else(|| ZingyError::not_found("client", id))
}

pub async fn find_by_phone(conn: &mut SqliteConnection, phone: &str) -> Result<Option<Client>> {
    fetch_one_where(conn, Clients::Phone, phone.to_string()).await
}

pub async fn find_by_referral_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> Result<Option<Client>> {
    fetch_one_where(conn, Clients::ReferralCode, code.to_string()).await
}

/// Clients ordered by registration, oldest first.
pub async fn list(conn: &mut SqliteConnection, limit: u64, offset: u64) -> Result<Vec<Client>> {
    let query = Query::select()
        .columns(COLUMNS)
        .from(Clients::Table)
        .order_by(Clients::CreatedAt, Order::Asc)
        .limit(limit)
        .offset(offset)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(from_row).collect()
}

/// Returns false when no such client exists.
pub async fn set_active(conn: &mut SqliteConnection, id: Uuid, active: bool) -> Result<bool> {
    let query = Query::update()
        .table(Clients::Table)
        .value(Clients::Active, active)
        .value(Clients::Version, Expr::col(Clients::Version).add(1))
        .and_where(Expr::col(Clients::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Write a new balance, guarded by the version `client` was read at.
///
/// Returns the client as stored after the update. Zero affected rows means
/// another flow changed the client since it was read.
pub async fn update_balance(
    conn: &mut SqliteConnection,
    client: &Client,
    points: i64,
    lifetime_points: i64,
) -> Result<Client> {
    let query = Query::update()
        .table(Clients::Table)
        .value(Clients::Points, points)
        .value(Clients::LifetimePoints, lifetime_points)
        .value(Clients::Version, client.version + 1)
        .and_where(Expr::col(Clients::Id).eq(client.id.to_string()))
        .and_where(Expr::col(Clients::Version).eq(client.version))
        .to_string(SqliteQueryBuilder);

    let result = sqlx::query(&query).execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Err(ZingyError::ConcurrencyConflict {
            entity: "client",
            id: client.id,
        });
    }

    Ok(Client {
        points,
        lifetime_points,
        version: client.version + 1,
        ..client.clone()
    })
}
