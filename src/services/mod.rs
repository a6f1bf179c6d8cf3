//! Transactional loyalty flows.
//!
//! Each service owns one area of the program. Mutating flows open a
//! `BEGIN IMMEDIATE` transaction, do all of their work on that connection
//! (balance, ledger entry, notification, outbox row) and commit once. A flow
//! that loses a version race is re-run from the top by
//! [`retry_conflicts`](crate::utils::retry_conflicts).

mod campaigns;
mod clients;
mod codes;
mod notifications;
mod points;
mod referrals;
mod rewards;
mod webhooks;

pub use campaigns::CampaignService;
pub use clients::ClientService;
pub use codes::{CodeService, ScanOutcome};
pub use notifications::NotificationService;
pub use points::{PointsService, Transfer};
pub use referrals::{ReferralOutcome, ReferralService};
pub use rewards::RewardService;
pub use webhooks::WebhookService;

pub use crate::storage::sqlite::rewards::RedemptionFilter;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{errmsg, Result, ZingyError};
use crate::model::{
    Client, EntryKind, EventKind, LedgerEntry, Notification, NotificationKind, OutboxEvent,
    TextEnum,
};
use crate::storage;
use crate::storage::sqlite::{
    clients as client_store, ledger, notifications as notification_store,
    webhooks as webhook_store,
};
use crate::utils::{Clock, SystemClock};
use crate::webhook::{OutboxRelay, WebhookSender};

/// Shared handles every service needs.
#[derive(Clone)]
pub struct ServiceContext {
    pub(crate) pool: SqlitePool,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: Arc<Config>,
}

impl ServiceContext {
    pub fn new(pool: SqlitePool, config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            config: Arc::new(config),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// One balance change to post against a client.
pub(crate) struct Posting<'a> {
    pub delta: i64,
    pub kind: EntryKind,
    /// Earned points also raise lifetime points (and so the tier).
    pub earns: bool,
    pub reference: Option<String>,
    pub note: Option<&'a str>,
}

/// Apply a posting under the client's version guard and record the ledger
/// entry. Returns the client as stored afterwards.
pub(crate) async fn post(
    conn: &mut SqliteConnection,
    client: &Client,
    posting: Posting<'_>,
    now: DateTime<Utc>,
) -> Result<Client> {
    let too_large = || ZingyError::validation(errmsg::POINTS_TOO_LARGE);
    let points = client.points.checked_add(posting.delta).ok_or_else(too_large)?;
    if points < 0 {
        return Err(ZingyError::InsufficientPoints {
            available: client.points,
            required: posting.delta.checked_neg().ok_or_else(too_large)?,
        });
    }
    let lifetime_points = if posting.earns && posting.delta > 0 {
        client
            .lifetime_points
            .checked_add(posting.delta)
            .ok_or_else(too_large)?
    } else {
        client.lifetime_points
    };

    let updated = client_store::update_balance(conn, client, points, lifetime_points).await?;

    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        client_id: client.id,
        delta: posting.delta,
        balance_after: updated.points,
        kind: posting.kind,
        reference: posting.reference,
        note: posting.note.map(str::to_string),
        created_at: now,
    };
    ledger::insert(conn, &entry).await?;

    debug!(
        client_id = %client.id,
        delta = posting.delta,
        balance = updated.points,
        kind = entry.kind.as_str(),
        "Posted ledger entry"
    );
    Ok(updated)
}

/// Write a notification on the flow's connection.
pub(crate) async fn notify(
    conn: &mut SqliteConnection,
    client_id: Uuid,
    kind: NotificationKind,
    title: impl Into<String>,
    body: impl Into<String>,
    now: DateTime<Utc>,
) -> Result<Notification> {
    let notification = Notification {
        id: Uuid::new_v4(),
        client_id,
        kind,
        title: title.into(),
        body: body.into(),
        read_at: None,
        created_at: now,
    };
    notification_store::insert(conn, &notification).await?;
    Ok(notification)
}

/// Record a webhook event in the outbox on the flow's connection.
pub(crate) async fn emit(
    conn: &mut SqliteConnection,
    kind: EventKind,
    payload: Value,
    now: DateTime<Utc>,
) -> Result<OutboxEvent> {
    let event = OutboxEvent {
        id: Uuid::new_v4(),
        event: kind.as_str().to_string(),
        payload,
        created_at: now,
        attempts: 0,
        delivered_at: None,
        last_error: None,
        dead: false,
    };
    webhook_store::enqueue(conn, &event).await?;
    debug!(id = %event.id, event = %event.event, "Event written to outbox");
    Ok(event)
}

/// Active client or a rejection.
pub(crate) fn require_active(client: &Client) -> Result<()> {
    if !client.active {
        return Err(ZingyError::rejected(crate::error::errmsg::CLIENT_INACTIVE));
    }
    Ok(())
}

/// The whole loyalty program behind one handle.
#[derive(Clone)]
pub struct Loyalty {
    ctx: ServiceContext,
    pub clients: ClientService,
    pub points: PointsService,
    pub codes: CodeService,
    pub referrals: ReferralService,
    pub rewards: RewardService,
    pub campaigns: CampaignService,
    pub notifications: NotificationService,
    pub webhooks: WebhookService,
}

impl Loyalty {
    pub fn new(pool: SqlitePool, config: Config, clock: Arc<dyn Clock>) -> Self {
        let ctx = ServiceContext::new(pool, config, clock);
        Self {
            clients: ClientService::new(ctx.clone()),
            points: PointsService::new(ctx.clone()),
            codes: CodeService::new(ctx.clone()),
            referrals: ReferralService::new(ctx.clone()),
            rewards: RewardService::new(ctx.clone()),
            campaigns: CampaignService::new(ctx.clone()),
            notifications: NotificationService::new(ctx.clone()),
            webhooks: WebhookService::new(ctx.clone()),
            ctx,
        }
    }

    /// Open storage from `config`, apply the schema and seed the referral
    /// settings row.
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let pool = storage::init_storage(&config.storage).await?;
        let loyalty = Self::new(pool, config, clock);
        loyalty.referrals.seed_settings().await?;
        Ok(loyalty)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.ctx.pool
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Outbox relay delivering this program's webhook events through `sender`.
    pub fn relay(&self, sender: Arc<dyn WebhookSender>) -> OutboxRelay {
        OutboxRelay::new(
            self.ctx.pool.clone(),
            sender,
            self.ctx.config.webhooks.clone(),
            self.ctx.clock.clone(),
        )
    }
}
