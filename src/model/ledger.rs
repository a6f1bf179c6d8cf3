use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::TextEnum;

/// Why a client's balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    CodeScan,
    Redemption,
    RedemptionRefund,
    ReferralBonus,
    ReferralWelcome,
    TransferIn,
    TransferOut,
    Adjustment,
}

impl TextEnum for EntryKind {
    const ENTITY: &'static str = "ledger entry kind";
    const ALL: &'static [Self] = &[
        EntryKind::CodeScan,
        EntryKind::Redemption,
        EntryKind::RedemptionRefund,
        EntryKind::ReferralBonus,
        EntryKind::ReferralWelcome,
        EntryKind::TransferIn,
        EntryKind::TransferOut,
        EntryKind::Adjustment,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            EntryKind::CodeScan => "code_scan",
            EntryKind::Redemption => "redemption",
            EntryKind::RedemptionRefund => "redemption_refund",
            EntryKind::ReferralBonus => "referral_bonus",
            EntryKind::ReferralWelcome => "referral_welcome",
            EntryKind::TransferIn => "transfer_in",
            EntryKind::TransferOut => "transfer_out",
            EntryKind::Adjustment => "adjustment",
        }
    }
}

/// One balance change. The deltas of a client's entries sum to their balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub client_id: Uuid,
    pub delta: i64,
    pub balance_after: i64,
    pub kind: EntryKind,
    /// Id of the code, redemption, referral or counterparty behind the change.
    pub reference: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Welcome,
    PointsEarned,
    ReferralReward,
    RedemptionUpdate,
    Transfer,
    Adjustment,
    Announcement,
}

impl TextEnum for NotificationKind {
    const ENTITY: &'static str = "notification kind";
    const ALL: &'static [Self] = &[
        NotificationKind::Welcome,
        NotificationKind::PointsEarned,
        NotificationKind::ReferralReward,
        NotificationKind::RedemptionUpdate,
        NotificationKind::Transfer,
        NotificationKind::Adjustment,
        NotificationKind::Announcement,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Welcome => "welcome",
            NotificationKind::PointsEarned => "points_earned",
            NotificationKind::ReferralReward => "referral_reward",
            NotificationKind::RedemptionUpdate => "redemption_update",
            NotificationKind::Transfer => "transfer",
            NotificationKind::Adjustment => "adjustment",
            NotificationKind::Announcement => "announcement",
        }
    }
}

/// In-app message for a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub client_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
