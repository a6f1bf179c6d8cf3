use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use super::{emit, notify, post, Posting, ServiceContext};
use crate::config::Config;
use crate::error::Result;
use crate::ledger::validation::validate_referral_settings;
use crate::ledger::{self, BonusDecision, CapKind};
use crate::model::{
    Client, EntryKind, EventKind, NotificationKind, Referral, ReferralSettings, ReferralStats,
    ReferralStatus, TextEnum,
};
use crate::storage::sqlite::{begin_immediate, clients, finish, referrals};
use crate::utils::month_start;

/// How a qualifying referral settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferralOutcome {
    pub referral: Referral,
    /// Set when the referrer got nothing because a cap was reached.
    pub cap: Option<CapKind>,
    /// The referee after any welcome bonus.
    #[serde(skip)]
    pub referee: Client,
}

/// Live settings, falling back to the configured defaults before the row is
/// seeded.
pub(crate) async fn load_settings(
    conn: &mut SqliteConnection,
    config: &Config,
) -> Result<ReferralSettings> {
    Ok(referrals::get_settings(conn)
        .await?
        .unwrap_or_else(|| ReferralSettings::from(&config.referrals)))
}

/// Settle the referee's pending referral inside the qualifying transaction.
///
/// Returns `None` when the referee was not referred or the referral has
/// already settled.
pub(crate) async fn complete_tx(
    conn: &mut SqliteConnection,
    config: &Config,
    referee: &Client,
    now: DateTime<Utc>,
) -> Result<Option<ReferralOutcome>> {
    let Some(referral) = referrals::find_by_referee(conn, referee.id).await? else {
        return Ok(None);
    };
    if referral.status != ReferralStatus::Pending {
        return Ok(None);
    }

    let settings = load_settings(conn, config).await?;
    let referrer = clients::require(conn, referral.referrer_id).await?;
    // Tier is taken before this referral's bonus lands
    let tier = referrer.tier(&config.tiers);
    let stats = referrals::stats(conn, referrer.id, month_start(now)).await?;

    let (status, referrer_bonus, cap) = match ledger::referrer_bonus(&settings, tier, &stats) {
        BonusDecision::Award { points, .. } if referrer.active => {
            (ReferralStatus::Completed, points, None)
        }
        BonusDecision::Award { .. } | BonusDecision::Disabled => (ReferralStatus::Capped, 0, None),
        BonusDecision::Capped(kind) => (ReferralStatus::Capped, 0, Some(kind)),
    };
    let referee_bonus = ledger::referee_bonus(&settings);

    let settled = referrals::complete(
        conn,
        referral.id,
        status,
        tier,
        referrer_bonus,
        referee_bonus,
        now,
    )
    .await?;
    if !settled {
        return Ok(None);
    }

    let reference = Some(referral.id.to_string());
    if referrer_bonus > 0 {
        post(
            conn,
            &referrer,
            Posting {
                delta: referrer_bonus,
                kind: EntryKind::ReferralBonus,
                earns: true,
                reference: reference.clone(),
                note: Some(referee.name.as_str()),
            },
            now,
        )
        .await?;
        notify(
            conn,
            referrer.id,
            NotificationKind::ReferralReward,
            "Referral bonus",
            format!(
                "{} made their first scan. You earned {} points.",
                referee.name, referrer_bonus
            ),
            now,
        )
        .await?;
    }

    let referee = if referee_bonus > 0 {
        let updated = post(
            conn,
            referee,
            Posting {
                delta: referee_bonus,
                kind: EntryKind::ReferralWelcome,
                earns: true,
                reference,
                note: None,
            },
            now,
        )
        .await?;
        notify(
            conn,
            referee.id,
            NotificationKind::ReferralReward,
            "Welcome bonus",
            format!(
                "Thanks for joining through {}. You earned {} bonus points.",
                referrer.name, referee_bonus
            ),
            now,
        )
        .await?;
        updated
    } else {
        referee.clone()
    };

    let referral = Referral {
        status,
        referrer_tier: Some(tier),
        referrer_bonus,
        referee_bonus,
        completed_at: Some(now),
        ..referral
    };

    emit(
        conn,
        EventKind::ReferralCompleted,
        json!({
            "referral_id": referral.id,
            "referrer_id": referral.referrer_id,
            "referee_id": referral.referee_id,
            "status": referral.status.as_str(),
            "referrer_tier": tier.as_str(),
            "referrer_bonus": referrer_bonus,
            "referee_bonus": referee_bonus,
            "cap": cap,
        }),
        now,
    )
    .await?;

    info!(
        referral_id = %referral.id,
        referrer_id = %referral.referrer_id,
        status = referral.status.as_str(),
        referrer_bonus,
        referee_bonus,
        "Referral settled"
    );

    Ok(Some(ReferralOutcome {
        referral,
        cap,
        referee,
    }))
}

/// Referral settings and statistics.
#[derive(Clone)]
pub struct ReferralService {
    ctx: ServiceContext,
}

impl ReferralService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn settings(&self) -> Result<ReferralSettings> {
        let mut conn = self.ctx.pool.acquire().await?;
        load_settings(&mut conn, &self.ctx.config).await
    }

    /// Replace the live settings.
    pub async fn update_settings(&self, settings: ReferralSettings) -> Result<ReferralSettings> {
        validate_referral_settings(&settings)?;

        let now = self.ctx.now();
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = referrals::put_settings(&mut conn, &settings, now, true).await;
        finish(&mut conn, result).await?;

        info!(
            enabled = settings.enabled,
            monthly_cap = settings.monthly_cap,
            lifetime_cap = settings.lifetime_cap,
            "Referral settings updated"
        );
        Ok(settings)
    }

    /// Write the configured defaults unless settings already exist.
    ///
    /// Returns true when the row was created.
    pub async fn seed_settings(&self) -> Result<bool> {
        let defaults = ReferralSettings::from(&self.ctx.config.referrals);
        validate_referral_settings(&defaults)?;
        let now = self.ctx.now();
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = referrals::put_settings(&mut conn, &defaults, now, false).await;
        let created = finish(&mut conn, result).await?;
        if created {
            info!("Seeded referral settings from configuration");
        }
        Ok(created)
    }

    /// Counts for one referrer, with the monthly window taken at the current
    /// time.
    pub async fn stats(&self, client_id: Uuid) -> Result<ReferralStats> {
        let mut conn = self.ctx.pool.acquire().await?;
        clients::require(&mut conn, client_id).await?;
        referrals::stats(&mut conn, client_id, month_start(self.ctx.now())).await
    }

    /// Referrals made by a client, newest first.
    pub async fn referrals_by(&self, client_id: Uuid) -> Result<Vec<Referral>> {
        let mut conn = self.ctx.pool.acquire().await?;
        referrals::list_for_referrer(&mut conn, client_id).await
    }

    /// The referral that brought a client in.
    pub async fn referral_of(&self, client_id: Uuid) -> Result<Option<Referral>> {
        let mut conn = self.ctx.pool.acquire().await?;
        referrals::find_by_referee(&mut conn, client_id).await
    }
}
