//! Records stored by the loyalty program.
//!
//! Enum columns are stored as their `as_str` text. Parsing a stored value
//! that no variant matches is a [`ZingyError::Corrupt`].

mod client;
mod code;
mod ledger;
mod referral;
mod reward;
mod webhook;

pub use client::{Client, NewClient, Tier};
pub use code::{Campaign, Code, CodeBatch, NewCampaign, NewCodeBatch};
pub use ledger::{EntryKind, LedgerEntry, Notification, NotificationKind};
pub use referral::{Referral, ReferralSettings, ReferralStats, ReferralStatus};
pub use reward::{NewReward, Redemption, RedemptionStatus, Reward};
pub use webhook::{EventKind, OutboxEvent, WebhookEndpoint, WebhookEnvelope, ALL_EVENTS};

use crate::error::{Result, ZingyError};

/// Text encoding of an enum column.
pub trait TextEnum: Sized + Copy + 'static {
    const ENTITY: &'static str;
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(raw: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == raw)
            .ok_or_else(|| ZingyError::Corrupt(format!("unknown {} {:?}", Self::ENTITY, raw)))
    }
}
