use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TextEnum;

/// Events published to webhook endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "client.registered")]
    ClientRegistered,
    #[serde(rename = "code.redeemed")]
    CodeRedeemed,
    #[serde(rename = "referral.completed")]
    ReferralCompleted,
    #[serde(rename = "redemption.requested")]
    RedemptionRequested,
    #[serde(rename = "redemption.approved")]
    RedemptionApproved,
    #[serde(rename = "redemption.rejected")]
    RedemptionRejected,
    #[serde(rename = "points.adjusted")]
    PointsAdjusted,
    #[serde(rename = "points.transferred")]
    PointsTransferred,
}

impl TextEnum for EventKind {
    const ENTITY: &'static str = "webhook event";
    const ALL: &'static [Self] = &[
        EventKind::ClientRegistered,
        EventKind::CodeRedeemed,
        EventKind::ReferralCompleted,
        EventKind::RedemptionRequested,
        EventKind::RedemptionApproved,
        EventKind::RedemptionRejected,
        EventKind::PointsAdjusted,
        EventKind::PointsTransferred,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            EventKind::ClientRegistered => "client.registered",
            EventKind::CodeRedeemed => "code.redeemed",
            EventKind::ReferralCompleted => "referral.completed",
            EventKind::RedemptionRequested => "redemption.requested",
            EventKind::RedemptionApproved => "redemption.approved",
            EventKind::RedemptionRejected => "redemption.rejected",
            EventKind::PointsAdjusted => "points.adjusted",
            EventKind::PointsTransferred => "points.transferred",
        }
    }
}

/// Subscription token matching every event.
pub const ALL_EVENTS: &str = "*";

/// An administrator-configured delivery target (e.g. an n8n workflow).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub url: String,
    pub secret: String,
    /// Subscribed event names, or `["*"]`.
    pub events: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == ALL_EVENTS || e == event)
    }
}

/// A recorded event waiting for (or done with) delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub attempts: i64,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub dead: bool,
}

impl OutboxEvent {
    pub fn envelope(&self) -> WebhookEnvelope {
        WebhookEnvelope {
            id: self.id,
            event: self.event.clone(),
            occurred_at: self.created_at,
            data: self.payload.clone(),
        }
    }
}

/// JSON body POSTed to endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub id: Uuid,
    pub event: String,
    pub occurred_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(events: &[&str]) -> WebhookEndpoint {
        WebhookEndpoint {
            id: Uuid::new_v4(),
            url: "https://n8n.example.com/hook".into(),
            secret: "s3cret".into(),
            events: events.iter().map(|e| e.to_string()).collect(),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_wildcard_subscription() {
        let ep = endpoint(&["*"]);
        assert!(ep.subscribes_to("code.redeemed"));
        assert!(ep.subscribes_to("points.adjusted"));
    }

    #[test]
    fn test_explicit_subscription() {
        let ep = endpoint(&["redemption.approved", "redemption.rejected"]);
        assert!(ep.subscribes_to("redemption.approved"));
        assert!(!ep.subscribes_to("code.redeemed"));
    }

    #[test]
    fn test_serde_names_match_text() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
