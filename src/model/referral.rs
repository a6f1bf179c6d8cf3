use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{TextEnum, Tier};
use crate::config::ReferralDefaults;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    /// Referee registered but has not scanned a code yet.
    Pending,
    /// Qualified and the referrer was paid.
    Completed,
    /// Qualified but the referrer had reached a cap; no referrer bonus.
    Capped,
}

impl TextEnum for ReferralStatus {
    const ENTITY: &'static str = "referral status";
    const ALL: &'static [Self] = &[
        ReferralStatus::Pending,
        ReferralStatus::Completed,
        ReferralStatus::Capped,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::Completed => "completed",
            ReferralStatus::Capped => "capped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referee_id: Uuid,
    pub status: ReferralStatus,
    pub referrer_tier: Option<Tier>,
    pub referrer_bonus: i64,
    pub referee_bonus: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Program-wide referral rules, edited by administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralSettings {
    pub enabled: bool,
    pub referee_bonus: i64,
    pub bronze_bonus: i64,
    pub silver_bonus: i64,
    pub gold_bonus: i64,
    pub vip_bonus: i64,
    pub monthly_cap: i64,
    pub lifetime_cap: i64,
}

impl ReferralSettings {
    pub fn bonus_for(&self, tier: Tier) -> i64 {
        match tier {
            Tier::Bronze => self.bronze_bonus,
            Tier::Silver => self.silver_bonus,
            Tier::Gold => self.gold_bonus,
            Tier::Vip => self.vip_bonus,
        }
    }
}

impl From<&ReferralDefaults> for ReferralSettings {
    fn from(d: &ReferralDefaults) -> Self {
        Self {
            enabled: d.enabled,
            referee_bonus: d.referee_bonus,
            bronze_bonus: d.bronze_bonus,
            silver_bonus: d.silver_bonus,
            gold_bonus: d.gold_bonus,
            vip_bonus: d.vip_bonus,
            monthly_cap: d.monthly_cap,
            lifetime_cap: d.lifetime_cap,
        }
    }
}

impl Default for ReferralSettings {
    fn default() -> Self {
        Self::from(&ReferralDefaults::default())
    }
}

/// Referral counts for one referrer. Only bonus-paying referrals count
/// toward caps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferralStats {
    pub completed_this_month: i64,
    pub completed_lifetime: i64,
    pub capped: i64,
    pub pending: i64,
}
