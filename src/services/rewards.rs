use serde_json::json;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use super::{emit, notify, post, require_active, Posting, ServiceContext};
use crate::error::{errmsg, Result, ZingyError};
use crate::ledger::validation::{require_amount, require_non_negative, require_not_blank};
use crate::model::{
    EntryKind, EventKind, NewReward, NotificationKind, Redemption, RedemptionStatus, Reward,
    TextEnum,
};
use crate::storage::sqlite::rewards::{self, RedemptionFilter};
use crate::storage::sqlite::{begin_immediate, clients, finish};
use crate::utils::retry_conflicts;

/// Reward catalogue and the redemption workflow.
#[derive(Clone)]
pub struct RewardService {
    ctx: ServiceContext,
}

impl RewardService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn create_reward(&self, new: NewReward) -> Result<Reward> {
        require_not_blank(&new.name, errmsg::NAME_REQUIRED)?;
        require_amount(new.cost, errmsg::COST_POSITIVE)?;
        if let Some(stock) = new.stock {
            require_non_negative(stock, errmsg::STOCK_NON_NEGATIVE)?;
        }

        let reward = Reward {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            description: new.description.trim().to_string(),
            cost: new.cost,
            stock: new.stock,
            active: true,
            created_at: self.ctx.now(),
        };

        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = rewards::insert_reward(&mut conn, &reward).await;
        finish(&mut conn, result).await?;

        info!(reward_id = %reward.id, cost = reward.cost, stock = ?reward.stock, "Reward created");
        Ok(reward)
    }

    pub async fn get_reward(&self, id: Uuid) -> Result<Reward> {
        let mut conn = self.ctx.pool.acquire().await?;
        rewards::get_reward(&mut conn, id)
            .await?
            .ok_or_else(|| ZingyError::not_found("reward", id))
    }

    /// Catalogue, cheapest first.
    pub async fn list_rewards(&self, active_only: bool) -> Result<Vec<Reward>> {
        let mut conn = self.ctx.pool.acquire().await?;
        rewards::list_rewards(&mut conn, active_only).await
    }

    /// Set the remaining stock; `None` makes the reward unlimited.
    pub async fn update_stock(&self, id: Uuid, stock: Option<i64>) -> Result<()> {
        if let Some(stock) = stock {
            require_non_negative(stock, errmsg::STOCK_NON_NEGATIVE)?;
        }
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = match rewards::set_stock(&mut conn, id, stock).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ZingyError::not_found("reward", id)),
            Err(e) => Err(e),
        };
        finish(&mut conn, result).await
    }

    pub async fn set_reward_active(&self, id: Uuid, active: bool) -> Result<()> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = match rewards::set_reward_active(&mut conn, id, active).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ZingyError::not_found("reward", id)),
            Err(e) => Err(e),
        };
        finish(&mut conn, result).await
    }

    // ------------------------------------------------------------------------
    // Redemptions
    // ------------------------------------------------------------------------

    /// Spend points on a reward.
    ///
    /// Points and one unit of stock are taken immediately; the redemption
    /// then waits for an administrator.
    pub async fn request_redemption(&self, client_id: Uuid, reward_id: Uuid) -> Result<Redemption> {
        let redemption = retry_conflicts(&self.ctx.config.retry, "request_redemption", || {
            self.request_once(client_id, reward_id)
        })
        .await?;

        info!(
            redemption_id = %redemption.id,
            client_id = %client_id,
            reward_id = %reward_id,
            points = redemption.points_spent,
            "Redemption requested"
        );
        Ok(redemption)
    }

    async fn request_once(&self, client_id: Uuid, reward_id: Uuid) -> Result<Redemption> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = self.request_tx(&mut conn, client_id, reward_id).await;
        finish(&mut conn, result).await
    }

    async fn request_tx(
        &self,
        conn: &mut SqliteConnection,
        client_id: Uuid,
        reward_id: Uuid,
    ) -> Result<Redemption> {
        let now = self.ctx.now();

        let reward = rewards::get_reward(conn, reward_id)
            .await?
            .ok_or_else(|| ZingyError::not_found("reward", reward_id))?;
        if !reward.active {
            return Err(ZingyError::rejected(errmsg::REWARD_INACTIVE));
        }
        let client = clients::require(conn, client_id).await?;
        require_active(&client)?;
        if client.points < reward.cost {
            return Err(ZingyError::InsufficientPoints {
                available: client.points,
                required: reward.cost,
            });
        }
        if !rewards::reserve_stock(conn, reward.id).await? {
            return Err(ZingyError::OutOfStock(reward.id));
        }

        let redemption = Redemption {
            id: Uuid::new_v4(),
            client_id: client.id,
            reward_id: reward.id,
            points_spent: reward.cost,
            status: RedemptionStatus::Pending,
            created_at: now,
            decided_at: None,
            decided_by: None,
            note: None,
        };
        rewards::insert_redemption(conn, &redemption).await?;

        let client = post(
            conn,
            &client,
            Posting {
                delta: -reward.cost,
                kind: EntryKind::Redemption,
                earns: false,
                reference: Some(redemption.id.to_string()),
                note: Some(reward.name.as_str()),
            },
            now,
        )
        .await?;

        emit(
            conn,
            EventKind::RedemptionRequested,
            json!({
                "redemption_id": redemption.id,
                "client_id": client.id,
                "client_name": client.name,
                "client_phone": client.phone,
                "reward_id": reward.id,
                "reward_name": reward.name,
                "points": reward.cost,
                "balance": client.points,
            }),
            now,
        )
        .await?;

        Ok(redemption)
    }

    /// Approve a pending redemption.
    pub async fn approve_redemption(
        &self,
        id: Uuid,
        admin: &str,
        note: Option<&str>,
    ) -> Result<Redemption> {
        self.decide(id, RedemptionStatus::Approved, admin, note).await
    }

    /// Reject a pending redemption, refunding its points and stock.
    pub async fn reject_redemption(
        &self,
        id: Uuid,
        admin: &str,
        note: Option<&str>,
    ) -> Result<Redemption> {
        self.decide(id, RedemptionStatus::Rejected, admin, note).await
    }

    async fn decide(
        &self,
        id: Uuid,
        status: RedemptionStatus,
        admin: &str,
        note: Option<&str>,
    ) -> Result<Redemption> {
        require_not_blank(admin, errmsg::ADMIN_REQUIRED)?;
        let note = note.map(str::trim).filter(|n| !n.is_empty());

        let redemption = retry_conflicts(&self.ctx.config.retry, "decide_redemption", || {
            self.decide_once(id, status, admin, note)
        })
        .await?;

        info!(
            redemption_id = %id,
            status = status.as_str(),
            admin,
            "Redemption decided"
        );
        Ok(redemption)
    }

    async fn decide_once(
        &self,
        id: Uuid,
        status: RedemptionStatus,
        admin: &str,
        note: Option<&str>,
    ) -> Result<Redemption> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = self.decide_tx(&mut conn, id, status, admin, note).await;
        finish(&mut conn, result).await
    }

    async fn decide_tx(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        status: RedemptionStatus,
        admin: &str,
        note: Option<&str>,
    ) -> Result<Redemption> {
        let now = self.ctx.now();

        let redemption = rewards::get_redemption(conn, id)
            .await?
            .ok_or_else(|| ZingyError::not_found("redemption", id))?;
        let invalid = || ZingyError::InvalidTransition {
            from: redemption.status.as_str().to_string(),
            to: status.as_str().to_string(),
        };
        if !redemption.status.can_transition_to(status) {
            return Err(invalid());
        }
        if !rewards::decide(conn, id, status, admin, note, now).await? {
            return Err(invalid());
        }

        let reward_name = rewards::get_reward(conn, redemption.reward_id)
            .await?
            .map(|r| r.name)
            .unwrap_or_default();

        let (event, body) = match status {
            RedemptionStatus::Rejected => {
                let client = clients::require(conn, redemption.client_id).await?;
                post(
                    conn,
                    &client,
                    Posting {
                        delta: redemption.points_spent,
                        kind: EntryKind::RedemptionRefund,
                        earns: false,
                        reference: Some(redemption.id.to_string()),
                        note,
                    },
                    now,
                )
                .await?;
                rewards::release_stock(conn, redemption.reward_id).await?;
                (
                    EventKind::RedemptionRejected,
                    format!(
                        "Your request for {} was declined. {} points were returned.",
                        reward_name, redemption.points_spent
                    ),
                )
            }
            _ => (
                EventKind::RedemptionApproved,
                format!("Your {} is ready to collect.", reward_name),
            ),
        };

        notify(
            conn,
            redemption.client_id,
            NotificationKind::RedemptionUpdate,
            "Redemption update",
            body,
            now,
        )
        .await?;

        let decided = Redemption {
            status,
            decided_at: Some(now),
            decided_by: Some(admin.to_string()),
            note: note.map(str::to_string),
            ..redemption
        };

        emit(
            conn,
            event,
            json!({
                "redemption_id": decided.id,
                "client_id": decided.client_id,
                "reward_id": decided.reward_id,
                "reward_name": reward_name,
                "points": decided.points_spent,
                "status": decided.status.as_str(),
                "decided_by": admin,
                "note": decided.note,
            }),
            now,
        )
        .await?;

        Ok(decided)
    }

    pub async fn get_redemption(&self, id: Uuid) -> Result<Redemption> {
        let mut conn = self.ctx.pool.acquire().await?;
        rewards::get_redemption(&mut conn, id)
            .await?
            .ok_or_else(|| ZingyError::not_found("redemption", id))
    }

    /// Redemptions matching `filter`, oldest first.
    pub async fn list_redemptions(&self, filter: RedemptionFilter) -> Result<Vec<Redemption>> {
        let mut conn = self.ctx.pool.acquire().await?;
        rewards::list_redemptions(&mut conn, filter).await
    }
}
