//! Pure ledger rules: referral bonuses, caps and campaign multipliers.
//!
//! Nothing here touches storage. Services gather the inputs inside their
//! transaction and apply the decision these functions return.

pub mod validation;

use serde::Serialize;

use crate::model::{ReferralSettings, ReferralStats, Tier};

/// Which cap stopped a referral bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapKind {
    Monthly,
    Lifetime,
}

/// Outcome of evaluating a qualifying referral for its referrer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusDecision {
    /// Referral program switched off, or no bonus configured for the tier.
    Disabled,
    /// The referrer has used up a cap; the referral still completes.
    Capped(CapKind),
    Award { points: i64, tier: Tier },
}

/// Decide the referrer bonus for one qualifying referral.
///
/// `stats` must not yet include the referral being decided. The lifetime cap
/// is checked first so a referrer who is out for good reports `Lifetime`
/// rather than a monthly limit that would reset.
pub fn referrer_bonus(settings: &ReferralSettings, tier: Tier, stats: &ReferralStats) -> BonusDecision {
    if !settings.enabled {
        return BonusDecision::Disabled;
    }
    if settings.lifetime_cap > 0 && stats.completed_lifetime >= settings.lifetime_cap {
        return BonusDecision::Capped(CapKind::Lifetime);
    }
    if settings.monthly_cap > 0 && stats.completed_this_month >= settings.monthly_cap {
        return BonusDecision::Capped(CapKind::Monthly);
    }
    let points = settings.bonus_for(tier);
    if points <= 0 {
        return BonusDecision::Disabled;
    }
    BonusDecision::Award { points, tier }
}

/// Welcome bonus for the referee of a qualifying referral.
pub fn referee_bonus(settings: &ReferralSettings) -> i64 {
    if settings.enabled {
        settings.referee_bonus.max(0)
    } else {
        0
    }
}

/// Apply a campaign multiplier (in percent) to base points.
///
/// Integer floor, never below the base. `None` when the result overflows.
pub fn apply_multiplier(points: i64, percent: i64) -> Option<i64> {
    let boosted = points.checked_mul(percent.max(BASE_MULTIPLIER))? / BASE_MULTIPLIER;
    Some(boosted.max(points))
}

/// Neutral multiplier used when no campaign is running.
pub const BASE_MULTIPLIER: i64 = 100;
