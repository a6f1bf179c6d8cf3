//! Error type shared by the ledger, storage and services.

use uuid::Uuid;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ZingyError>;

/// User-facing rejection messages.
pub mod errmsg {
    pub const NAME_REQUIRED: &str = "Client name is required";
    pub const PHONE_INVALID: &str = "Phone number must contain 8 to 15 digits";
    pub const EMAIL_INVALID: &str = "Email address is malformed";
    pub const POINTS_POSITIVE: &str = "Points must be positive";
    pub const POINTS_TOO_LARGE: &str = "Points amount is too large";
    pub const COST_POSITIVE: &str = "Reward cost must be positive";
    pub const STOCK_NON_NEGATIVE: &str = "Reward stock cannot be negative";
    pub const PREFIX_INVALID: &str = "Code prefix must be 2 to 10 uppercase letters or digits";
    pub const QUANTITY_INVALID: &str = "Batch quantity is out of range";
    pub const MULTIPLIER_INVALID: &str = "Campaign multiplier must be between 100 and 1000 percent";
    pub const WINDOW_INVALID: &str = "Campaign must end after it starts";
    pub const SETTINGS_NEGATIVE: &str = "Referral settings cannot be negative";
    pub const SETTINGS_TOO_LARGE: &str = "Referral bonus is too large";
    pub const URL_INVALID: &str = "Webhook URL must start with http:// or https://";
    pub const SECRET_REQUIRED: &str = "Webhook secret is required";
    pub const EVENTS_REQUIRED: &str = "Webhook must subscribe to at least one event";
    pub const CLIENT_INACTIVE: &str = "Client account is inactive";
    pub const REWARD_INACTIVE: &str = "Reward is not available";
    pub const ADJUSTMENT_ZERO: &str = "Adjustment cannot be zero";
    pub const ADMIN_REQUIRED: &str = "Acting administrator is required";
    pub const EXPIRY_PAST: &str = "Batch expiry must be in the future";
    pub const TITLE_REQUIRED: &str = "Notification title is required";
    pub const EVENT_UNKNOWN: &str = "Unknown webhook event";
}

/// Errors raised by loyalty operations.
#[derive(Debug, thiserror::Error)]
pub enum ZingyError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient points: have {available}, need {required}")]
    InsufficientPoints { available: i64, required: i64 },

    #[error("Unknown code: {0}")]
    UnknownCode(String),

    #[error("Code already redeemed: {0}")]
    CodeAlreadyRedeemed(String),

    #[error("Code expired: {0}")]
    CodeExpired(String),

    #[error("Code batch is inactive: {0}")]
    BatchInactive(String),

    #[error("Reward out of stock: {0}")]
    OutOfStock(Uuid),

    #[error("Invalid redemption transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Phone number already registered")]
    DuplicatePhone,

    #[error("Invalid referral code: {0}")]
    InvalidReferralCode(String),

    #[error("Cannot transfer points to the same client")]
    SelfTransfer,

    #[error("Concurrent update on {entity} {id}")]
    ConcurrencyConflict { entity: &'static str, id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Webhook delivery failed: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl ZingyError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ZingyError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn rejected(msg: &str) -> Self {
        ZingyError::Rejected(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        ZingyError::Validation(msg.to_string())
    }

    /// Whether the whole flow may be re-run.
    ///
    /// Version-guard misses and SQLite lock contention are transient; every
    /// business rejection is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            ZingyError::ConcurrencyConflict { .. } => true,
            ZingyError::Database(sqlx::Error::Database(db)) => {
                let message = db.message();
                message.contains("database is locked") || message.contains("database is busy")
            }
            ZingyError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

impl From<config::ConfigError> for ZingyError {
    fn from(err: config::ConfigError) -> Self {
        ZingyError::Config(err.to_string())
    }
}

impl From<uuid::Error> for ZingyError {
    fn from(err: uuid::Error) -> Self {
        ZingyError::Corrupt(format!("invalid uuid: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_retryable() {
        let err = ZingyError::ConcurrencyConflict {
            entity: "client",
            id: Uuid::new_v4(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_business_rejections_are_final() {
        assert!(!ZingyError::DuplicatePhone.is_retryable());
        assert!(!ZingyError::InsufficientPoints {
            available: 1,
            required: 2
        }
        .is_retryable());
        assert!(!ZingyError::CodeAlreadyRedeemed("AB-1".into()).is_retryable());
    }

    #[test]
    fn test_insufficient_points_message() {
        let err = ZingyError::InsufficientPoints {
            available: 40,
            required: 100,
        };
        assert_eq!(err.to_string(), "Insufficient points: have 40, need 100");
    }
}
