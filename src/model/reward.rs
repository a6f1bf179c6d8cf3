use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::TextEnum;

/// Something a client can exchange points for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reward {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub cost: i64,
    /// Units left; `None` is unlimited.
    pub stock: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Reward {
    pub fn in_stock(&self) -> bool {
        self.stock.map_or(true, |s| s > 0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewReward {
    pub name: String,
    pub description: String,
    pub cost: i64,
    pub stock: Option<i64>,
}

/// Lifecycle of a redemption request.
///
/// `Pending` is the only state with outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Approved,
    Rejected,
}

impl RedemptionStatus {
    pub fn can_transition_to(&self, next: RedemptionStatus) -> bool {
        matches!(
            (self, next),
            (RedemptionStatus::Pending, RedemptionStatus::Approved)
                | (RedemptionStatus::Pending, RedemptionStatus::Rejected)
        )
    }
}

impl TextEnum for RedemptionStatus {
    const ENTITY: &'static str = "redemption status";
    const ALL: &'static [Self] = &[
        RedemptionStatus::Pending,
        RedemptionStatus::Approved,
        RedemptionStatus::Rejected,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "pending",
            RedemptionStatus::Approved => "approved",
            RedemptionStatus::Rejected => "rejected",
        }
    }
}

/// A client's request to exchange points for a reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub id: Uuid,
    pub client_id: Uuid,
    pub reward_id: Uuid,
    pub points_spent: i64,
    pub status: RedemptionStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_moves() {
        use RedemptionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
    }

    #[test]
    fn test_unlimited_stock() {
        let mut reward = Reward {
            id: Uuid::new_v4(),
            name: "Coffee".into(),
            description: String::new(),
            cost: 100,
            stock: None,
            active: true,
            created_at: Utc::now(),
        };
        assert!(reward.in_stock());
        reward.stock = Some(0);
        assert!(!reward.in_stock());
    }
}
