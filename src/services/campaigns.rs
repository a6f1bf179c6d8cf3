use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use super::ServiceContext;
use crate::error::{errmsg, Result, ZingyError};
use crate::ledger::validation::{require_not_blank, require_window, MAX_MULTIPLIER_PERCENT};
use crate::ledger::BASE_MULTIPLIER;
use crate::model::{Campaign, NewCampaign};
use crate::storage::sqlite::{begin_immediate, codes, finish};

/// Largest multiplier among campaigns running at `now`.
pub(crate) async fn best_multiplier_tx(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<i64> {
    let running = codes::running_campaigns(conn, now).await?;
    Ok(running
        .iter()
        .map(|c| c.multiplier_percent)
        .max()
        .unwrap_or(BASE_MULTIPLIER))
}

/// Time-boxed points multipliers.
#[derive(Clone)]
pub struct CampaignService {
    ctx: ServiceContext,
}

impl CampaignService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, new: NewCampaign) -> Result<Campaign> {
        require_not_blank(&new.name, errmsg::NAME_REQUIRED)?;
        if !(BASE_MULTIPLIER..=MAX_MULTIPLIER_PERCENT).contains(&new.multiplier_percent) {
            return Err(ZingyError::validation(errmsg::MULTIPLIER_INVALID));
        }
        require_window(new.starts_at, new.ends_at)?;

        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            multiplier_percent: new.multiplier_percent,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            active: true,
            created_at: self.ctx.now(),
        };

        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = codes::insert_campaign(&mut conn, &campaign).await;
        finish(&mut conn, result).await?;

        info!(
            campaign_id = %campaign.id,
            multiplier = campaign.multiplier_percent,
            starts_at = %campaign.starts_at,
            ends_at = %campaign.ends_at,
            "Campaign created"
        );
        Ok(campaign)
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<()> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = match codes::set_campaign_active(&mut conn, id, active).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ZingyError::not_found("campaign", id)),
            Err(e) => Err(e),
        };
        finish(&mut conn, result).await
    }

    pub async fn list(&self) -> Result<Vec<Campaign>> {
        let mut conn = self.ctx.pool.acquire().await?;
        codes::list_campaigns(&mut conn).await
    }

    /// Campaigns running at `now`, highest multiplier first.
    pub async fn active_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let mut conn = self.ctx.pool.acquire().await?;
        codes::running_campaigns(&mut conn, now).await
    }

    /// Multiplier a scan at `now` would get; 100 when nothing is running.
    pub async fn best_multiplier(&self, now: DateTime<Utc>) -> Result<i64> {
        let mut conn = self.ctx.pool.acquire().await?;
        best_multiplier_tx(&mut conn, now).await
    }
}
