use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::TextEnum;
use crate::config::TierThresholds;

/// A loyalty program member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub referral_code: String,
    /// Spendable balance.
    pub points: i64,
    /// Everything ever earned; spending does not reduce it.
    pub lifetime_points: i64,
    pub version: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn tier(&self, thresholds: &TierThresholds) -> Tier {
        Tier::for_lifetime_points(self.lifetime_points, thresholds)
    }
}

/// Registration request.
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    /// Referral code of the client who invited this one.
    pub referred_by: Option<String>,
}

/// Loyalty tier, derived from lifetime points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Vip,
}

impl Tier {
    pub fn for_lifetime_points(points: i64, thresholds: &TierThresholds) -> Self {
        if points >= thresholds.vip {
            Tier::Vip
        } else if points >= thresholds.gold {
            Tier::Gold
        } else if points >= thresholds.silver {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }
}

impl TextEnum for Tier {
    const ENTITY: &'static str = "tier";
    const ALL: &'static [Self] = &[Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Vip];

    fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Vip => "vip",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        let t = TierThresholds::default();
        assert_eq!(Tier::for_lifetime_points(0, &t), Tier::Bronze);
        assert_eq!(Tier::for_lifetime_points(499, &t), Tier::Bronze);
        assert_eq!(Tier::for_lifetime_points(500, &t), Tier::Silver);
        assert_eq!(Tier::for_lifetime_points(1999, &t), Tier::Silver);
        assert_eq!(Tier::for_lifetime_points(2000, &t), Tier::Gold);
        assert_eq!(Tier::for_lifetime_points(4999, &t), Tier::Gold);
        assert_eq!(Tier::for_lifetime_points(5000, &t), Tier::Vip);
        assert_eq!(Tier::for_lifetime_points(1_000_000, &t), Tier::Vip);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Bronze < Tier::Silver);
        assert!(Tier::Gold < Tier::Vip);
    }
}
