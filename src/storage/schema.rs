//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building,
//! plus the DDL applied by [`super::migrate`].

use sea_query::Iden;

#[derive(Iden)]
pub enum Clients {
    Table,
    Id,
    Name,
    Phone,
    Email,
    ReferralCode,
    Points,
    LifetimePoints,
    Version,
    Active,
    CreatedAt,
}

#[derive(Iden)]
pub enum Rewards {
    Table,
    Id,
    Name,
    Description,
    Cost,
    Stock,
    Active,
    CreatedAt,
}

#[derive(Iden)]
pub enum Redemptions {
    Table,
    Id,
    ClientId,
    RewardId,
    PointsSpent,
    Status,
    CreatedAt,
    DecidedAt,
    DecidedBy,
    Note,
}

#[derive(Iden)]
pub enum CodeBatches {
    Table,
    Id,
    Name,
    Prefix,
    Points,
    Quantity,
    ExpiresAt,
    Active,
    CreatedAt,
}

#[derive(Iden)]
pub enum Codes {
    Table,
    Id,
    BatchId,
    Code,
    RedeemedBy,
    RedeemedAt,
    PointsAwarded,
}

#[derive(Iden)]
pub enum Campaigns {
    Table,
    Id,
    Name,
    MultiplierPercent,
    StartsAt,
    EndsAt,
    Active,
    CreatedAt,
}

#[derive(Iden)]
pub enum Referrals {
    Table,
    Id,
    ReferrerId,
    RefereeId,
    Status,
    ReferrerTier,
    ReferrerBonus,
    RefereeBonus,
    CreatedAt,
    CompletedAt,
}

#[derive(Iden)]
pub enum ReferralSettings {
    Table,
    Id,
    Enabled,
    RefereeBonus,
    BronzeBonus,
    SilverBonus,
    GoldBonus,
    VipBonus,
    MonthlyCap,
    LifetimeCap,
    UpdatedAt,
}

#[derive(Iden)]
pub enum LedgerEntries {
    Table,
    Id,
    ClientId,
    Delta,
    BalanceAfter,
    Kind,
    Reference,
    Note,
    CreatedAt,
}

#[derive(Iden)]
pub enum Notifications {
    Table,
    Id,
    ClientId,
    Kind,
    Title,
    Body,
    ReadAt,
    CreatedAt,
}

#[derive(Iden)]
pub enum WebhookEndpoints {
    Table,
    Id,
    Url,
    Secret,
    Events,
    Active,
    CreatedAt,
}

#[derive(Iden)]
pub enum WebhookOutbox {
    Table,
    Id,
    Event,
    Payload,
    CreatedAt,
    Attempts,
    DeliveredAt,
    LastError,
    Dead,
}

/// DDL statements, applied in order. Every statement is idempotent.
pub const MIGRATIONS: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    phone TEXT NOT NULL UNIQUE,
    email TEXT,
    referral_code TEXT NOT NULL UNIQUE,
    points INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
    lifetime_points INTEGER NOT NULL DEFAULT 0 CHECK (lifetime_points >= 0),
    version INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS rewards (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    cost INTEGER NOT NULL CHECK (cost > 0),
    stock INTEGER CHECK (stock IS NULL OR stock >= 0),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS redemptions (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL REFERENCES clients(id),
    reward_id TEXT NOT NULL REFERENCES rewards(id),
    points_spent INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    decided_at TEXT,
    decided_by TEXT,
    note TEXT
)"#,
    "CREATE INDEX IF NOT EXISTS idx_redemptions_client ON redemptions(client_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_redemptions_status ON redemptions(status, created_at)",
    r#"
CREATE TABLE IF NOT EXISTS code_batches (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    prefix TEXT NOT NULL,
    points INTEGER NOT NULL CHECK (points > 0),
    quantity INTEGER NOT NULL,
    expires_at TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS codes (
    id TEXT PRIMARY KEY,
    batch_id TEXT NOT NULL REFERENCES code_batches(id),
    code TEXT NOT NULL UNIQUE,
    redeemed_by TEXT REFERENCES clients(id),
    redeemed_at TEXT,
    points_awarded INTEGER
)"#,
    "CREATE INDEX IF NOT EXISTS idx_codes_batch ON codes(batch_id)",
    r#"
CREATE TABLE IF NOT EXISTS campaigns (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    multiplier_percent INTEGER NOT NULL CHECK (multiplier_percent >= 100),
    starts_at TEXT NOT NULL,
    ends_at TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS referrals (
    id TEXT PRIMARY KEY,
    referrer_id TEXT NOT NULL REFERENCES clients(id),
    referee_id TEXT NOT NULL UNIQUE REFERENCES clients(id),
    status TEXT NOT NULL,
    referrer_tier TEXT,
    referrer_bonus INTEGER NOT NULL DEFAULT 0,
    referee_bonus INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    CHECK (referrer_id <> referee_id)
)"#,
    "CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals(referrer_id, status, completed_at)",
    r#"
CREATE TABLE IF NOT EXISTS referral_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    enabled INTEGER NOT NULL,
    referee_bonus INTEGER NOT NULL,
    bronze_bonus INTEGER NOT NULL,
    silver_bonus INTEGER NOT NULL,
    gold_bonus INTEGER NOT NULL,
    vip_bonus INTEGER NOT NULL,
    monthly_cap INTEGER NOT NULL,
    lifetime_cap INTEGER NOT NULL,
    updated_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL REFERENCES clients(id),
    delta INTEGER NOT NULL,
    balance_after INTEGER NOT NULL,
    kind TEXT NOT NULL,
    reference TEXT,
    note TEXT,
    created_at TEXT NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_ledger_client ON ledger_entries(client_id, created_at)",
    r#"
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL REFERENCES clients(id),
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    read_at TEXT,
    created_at TEXT NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_notifications_client ON notifications(client_id, created_at)",
    r#"
CREATE TABLE IF NOT EXISTS webhook_endpoints (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    secret TEXT NOT NULL,
    events TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS webhook_outbox (
    id TEXT PRIMARY KEY,
    event TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    delivered_at TEXT,
    last_error TEXT,
    dead INTEGER NOT NULL DEFAULT 0
)"#,
    "CREATE INDEX IF NOT EXISTS idx_outbox_pending ON webhook_outbox(delivered_at, dead, created_at)",
];
