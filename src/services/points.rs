use serde_json::json;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use super::{emit, notify, post, require_active, Posting, ServiceContext};
use crate::error::{errmsg, Result, ZingyError};
use crate::ledger::validation::{require_amount, require_not_blank, MAX_POINTS};
use crate::model::{Client, EntryKind, EventKind, NotificationKind};
use crate::storage::sqlite::{begin_immediate, clients, finish};
use crate::utils::retry_conflicts;

/// Both sides of a completed transfer.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub from: Client,
    pub to: Client,
    pub amount: i64,
}

/// Administrative adjustments and client-to-client transfers.
#[derive(Clone)]
pub struct PointsService {
    ctx: ServiceContext,
}

impl PointsService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Credit or debit a client by hand.
    ///
    /// Credits count as earnings and raise lifetime points. A debit that
    /// would take the balance below zero is rejected.
    pub async fn adjust(
        &self,
        client_id: Uuid,
        delta: i64,
        note: &str,
        admin: &str,
    ) -> Result<Client> {
        if delta == 0 {
            return Err(ZingyError::validation(errmsg::ADJUSTMENT_ZERO));
        }
        if delta.unsigned_abs() > MAX_POINTS.unsigned_abs() {
            return Err(ZingyError::validation(errmsg::POINTS_TOO_LARGE));
        }
        require_not_blank(admin, errmsg::ADMIN_REQUIRED)?;

        let client = retry_conflicts(&self.ctx.config.retry, "adjust_points", || {
            self.adjust_once(client_id, delta, note, admin)
        })
        .await?;

        info!(client_id = %client_id, delta, admin, balance = client.points, "Points adjusted");
        Ok(client)
    }

    async fn adjust_once(
        &self,
        client_id: Uuid,
        delta: i64,
        note: &str,
        admin: &str,
    ) -> Result<Client> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = self.adjust_tx(&mut conn, client_id, delta, note, admin).await;
        finish(&mut conn, result).await
    }

    async fn adjust_tx(
        &self,
        conn: &mut SqliteConnection,
        client_id: Uuid,
        delta: i64,
        note: &str,
        admin: &str,
    ) -> Result<Client> {
        let now = self.ctx.now();
        let client = clients::require(conn, client_id).await?;
        let note = note.trim();

        let client = post(
            conn,
            &client,
            Posting {
                delta,
                kind: EntryKind::Adjustment,
                earns: true,
                reference: Some(admin.to_string()),
                note: (!note.is_empty()).then_some(note),
            },
            now,
        )
        .await?;

        let body = if delta > 0 {
            format!("{} points were added to your account.", delta)
        } else {
            format!("{} points were removed from your account.", -delta)
        };
        notify(conn, client.id, NotificationKind::Adjustment, "Balance adjusted", body, now).await?;

        emit(
            conn,
            EventKind::PointsAdjusted,
            json!({
                "client_id": client.id,
                "delta": delta,
                "balance": client.points,
                "note": note,
                "admin": admin,
            }),
            now,
        )
        .await?;

        Ok(client)
    }

    /// Move points from one client to another.
    ///
    /// Transferred points are not earnings: the receiver's lifetime points
    /// and tier do not change.
    pub async fn transfer(&self, from_id: Uuid, to_id: Uuid, amount: i64) -> Result<Transfer> {
        if from_id == to_id {
            return Err(ZingyError::SelfTransfer);
        }
        require_amount(amount, errmsg::POINTS_POSITIVE)?;

        let transfer = retry_conflicts(&self.ctx.config.retry, "transfer_points", || {
            self.transfer_once(from_id, to_id, amount)
        })
        .await?;

        info!(from = %from_id, to = %to_id, amount, "Points transferred");
        Ok(transfer)
    }

    async fn transfer_once(&self, from_id: Uuid, to_id: Uuid, amount: i64) -> Result<Transfer> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = self.transfer_tx(&mut conn, from_id, to_id, amount).await;
        finish(&mut conn, result).await
    }

    async fn transfer_tx(
        &self,
        conn: &mut SqliteConnection,
        from_id: Uuid,
        to_id: Uuid,
        amount: i64,
    ) -> Result<Transfer> {
        let now = self.ctx.now();
        let sender = clients::require(conn, from_id).await?;
        let receiver = clients::require(conn, to_id).await?;
        require_active(&sender)?;
        require_active(&receiver)?;

        let sender = post(
            conn,
            &sender,
            Posting {
                delta: -amount,
                kind: EntryKind::TransferOut,
                earns: false,
                reference: Some(receiver.id.to_string()),
                note: Some(receiver.name.as_str()),
            },
            now,
        )
        .await?;
        let receiver = post(
            conn,
            &receiver,
            Posting {
                delta: amount,
                kind: EntryKind::TransferIn,
                earns: false,
                reference: Some(sender.id.to_string()),
                note: Some(sender.name.as_str()),
            },
            now,
        )
        .await?;

        notify(
            conn,
            sender.id,
            NotificationKind::Transfer,
            "Points sent",
            format!("You sent {} points to {}.", amount, receiver.name),
            now,
        )
        .await?;
        notify(
            conn,
            receiver.id,
            NotificationKind::Transfer,
            "Points received",
            format!("{} sent you {} points.", sender.name, amount),
            now,
        )
        .await?;

        emit(
            conn,
            EventKind::PointsTransferred,
            json!({
                "from_client_id": sender.id,
                "to_client_id": receiver.id,
                "amount": amount,
                "from_balance": sender.points,
                "to_balance": receiver.points,
            }),
            now,
        )
        .await?;

        Ok(Transfer {
            from: sender,
            to: receiver,
            amount,
        })
    }
}
