use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A generated set of scan codes sharing a prefix, value and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBatch {
    pub id: Uuid,
    pub name: String,
    pub prefix: String,
    /// Base points per code, before campaign multipliers.
    pub points: i64,
    pub quantity: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl CodeBatch {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }
}

#[derive(Debug, Clone)]
pub struct NewCodeBatch {
    pub name: String,
    pub prefix: String,
    pub points: i64,
    pub quantity: usize,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A single redeemable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Code {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub code: String,
    pub redeemed_by: Option<Uuid>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub points_awarded: Option<i64>,
}

impl Code {
    pub fn is_redeemed(&self) -> bool {
        self.redeemed_by.is_some()
    }
}

/// Time-boxed points multiplier applied to code scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    /// 100 = no bonus, 150 = one and a half times the base points.
    pub multiplier_percent: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Running at `now`: active, started, and not yet ended.
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.active && self.starts_at <= now && now < self.ends_at
    }
}

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub multiplier_percent: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn campaign(active: bool) -> Campaign {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        Campaign {
            id: Uuid::new_v4(),
            name: "June double".into(),
            multiplier_percent: 200,
            starts_at: start,
            ends_at: start + Duration::days(30),
            active,
            created_at: start,
        }
    }

    #[test]
    fn test_campaign_window_is_half_open() {
        let c = campaign(true);
        assert!(!c.is_running(c.starts_at - Duration::seconds(1)));
        assert!(c.is_running(c.starts_at));
        assert!(c.is_running(c.ends_at - Duration::seconds(1)));
        assert!(!c.is_running(c.ends_at));
    }

    #[test]
    fn test_inactive_campaign_never_runs() {
        let c = campaign(false);
        assert!(!c.is_running(c.starts_at));
    }

    #[test]
    fn test_batch_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let mut batch = CodeBatch {
            id: Uuid::new_v4(),
            name: "Cups".into(),
            prefix: "CUP".into(),
            points: 10,
            quantity: 1,
            expires_at: None,
            active: true,
            created_at: now,
        };
        assert!(!batch.is_expired(now));

        batch.expires_at = Some(now);
        assert!(batch.is_expired(now));
        assert!(!batch.is_expired(now - Duration::seconds(1)));
    }
}
