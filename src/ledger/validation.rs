//! Validation helpers for precondition checks.
//!
//! Eliminates repeated validation boilerplate across the services.

use chrono::{DateTime, Utc};

use crate::error::{errmsg, Result, ZingyError};
use crate::model::ReferralSettings;

/// Largest number of points a single operation may move.
pub const MAX_POINTS: i64 = 1_000_000_000;

/// Highest campaign multiplier, in percent.
pub const MAX_MULTIPLIER_PERCENT: i64 = 1_000;

/// Require a non-blank string.
pub fn require_not_blank(value: &str, error_msg: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ZingyError::validation(error_msg));
    }
    Ok(())
}

/// Require that a numeric value is positive (> 0).
pub fn require_positive(value: i64, error_msg: &str) -> Result<()> {
    if value <= 0 {
        return Err(ZingyError::validation(error_msg));
    }
    Ok(())
}

/// Require that a numeric value is non-negative (>= 0).
pub fn require_non_negative(value: i64, error_msg: &str) -> Result<()> {
    if value < 0 {
        return Err(ZingyError::validation(error_msg));
    }
    Ok(())
}

/// Require a positive amount no larger than [`MAX_POINTS`].
pub fn require_amount(value: i64, error_msg: &str) -> Result<()> {
    require_positive(value, error_msg)?;
    if value > MAX_POINTS {
        return Err(ZingyError::validation(errmsg::POINTS_TOO_LARGE));
    }
    Ok(())
}

/// Bonuses and caps must be non-negative; bonuses at most [`MAX_POINTS`].
pub fn validate_referral_settings(settings: &ReferralSettings) -> Result<()> {
    let bonuses = [
        settings.referee_bonus,
        settings.bronze_bonus,
        settings.silver_bonus,
        settings.gold_bonus,
        settings.vip_bonus,
    ];
    let caps = [settings.monthly_cap, settings.lifetime_cap];
    if bonuses.iter().chain(caps.iter()).any(|v| *v < 0) {
        return Err(ZingyError::validation(errmsg::SETTINGS_NEGATIVE));
    }
    if bonuses.iter().any(|v| *v > MAX_POINTS) {
        return Err(ZingyError::validation(errmsg::SETTINGS_TOO_LARGE));
    }
    Ok(())
}

/// Canonical phone number: digits only, keeping a leading `+`.
///
/// Spaces, dashes, dots and parentheses are dropped. 8 to 15 digits (E.164).
pub fn normalize_phone(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return Err(ZingyError::validation(errmsg::PHONE_INVALID)),
        }
    }

    if !(8..=15).contains(&digits.len()) {
        return Err(ZingyError::validation(errmsg::PHONE_INVALID));
    }
    Ok(format!("{plus}{digits}"))
}

/// Loose email shape check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(ZingyError::validation(errmsg::EMAIL_INVALID));
    }
    Ok(email)
}

/// Code batch prefix: 2 to 10 ASCII uppercase letters or digits.
pub fn validate_prefix(raw: &str) -> Result<String> {
    let prefix = raw.trim().to_ascii_uppercase();
    let valid = (2..=10).contains(&prefix.len())
        && prefix
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if !valid {
        return Err(ZingyError::validation(errmsg::PREFIX_INVALID));
    }
    Ok(prefix)
}

/// Campaign window must be non-empty.
pub fn require_window(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<()> {
    if ends_at <= starts_at {
        return Err(ZingyError::validation(errmsg::WINDOW_INVALID));
    }
    Ok(())
}

/// Webhook target must be an absolute http(s) URL.
pub fn validate_url(raw: &str) -> Result<String> {
    let url = raw.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(url.to_string()),
        _ => Err(ZingyError::validation(errmsg::URL_INVALID)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_require_not_blank() {
        assert!(require_not_blank("Ana", "err").is_ok());
        let err = require_not_blank("   ", "name required").unwrap_err();
        assert!(err.to_string().contains("name required"));
    }

    #[test]
    fn test_require_positive() {
        assert!(require_positive(1, "err").is_ok());
        assert!(require_positive(0, "err").is_err());
        assert!(require_positive(-5, "err").is_err());
    }

    #[test]
    fn test_require_non_negative() {
        assert!(require_non_negative(0, "err").is_ok());
        assert!(require_non_negative(-1, "err").is_err());
    }

    #[test]
    fn test_require_amount() {
        assert!(require_amount(1, "err").is_ok());
        assert!(require_amount(MAX_POINTS, "err").is_ok());
        assert!(require_amount(0, "err").is_err());
        let err = require_amount(MAX_POINTS + 1, "err").unwrap_err();
        assert!(err.to_string().contains(errmsg::POINTS_TOO_LARGE));
        assert!(require_amount(i64::MAX, "err").is_err());
    }

    #[test]
    fn test_validate_referral_settings() {
        let mut settings = ReferralSettings::default();
        assert!(validate_referral_settings(&settings).is_ok());

        settings.bronze_bonus = -100;
        let err = validate_referral_settings(&settings).unwrap_err();
        assert!(err.to_string().contains(errmsg::SETTINGS_NEGATIVE));

        settings.bronze_bonus = 100;
        settings.lifetime_cap = -1;
        assert!(validate_referral_settings(&settings).is_err());

        settings.lifetime_cap = 0;
        settings.vip_bonus = i64::MAX;
        let err = validate_referral_settings(&settings).unwrap_err();
        assert!(err.to_string().contains(errmsg::SETTINGS_TOO_LARGE));
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+55 (11) 98765-4321").unwrap(), "+5511987654321");
        assert_eq!(normalize_phone("0412.345.678").unwrap(), "0412345678");
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("+1 800 CALL NOW").is_err());
        assert!(normalize_phone("1234567890123456").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" Ana@Example.COM ").unwrap(), "ana@example.com");
        assert!(validate_email("ana.example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ana@localhost").is_err());
        assert!(validate_email("ana@@example.com").is_err());
    }

    #[test]
    fn test_validate_prefix() {
        assert_eq!(validate_prefix("cup").unwrap(), "CUP");
        assert_eq!(validate_prefix("SUMMER26").unwrap(), "SUMMER26");
        assert!(validate_prefix("A").is_err());
        assert!(validate_prefix("TOO-LONG").is_err());
        assert!(validate_prefix("ELEVENCHARS").is_err());
    }

    #[test]
    fn test_require_window() {
        let now = Utc::now();
        assert!(require_window(now, now + Duration::hours(1)).is_ok());
        assert!(require_window(now, now).is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://n8n.example.com/webhook/abc").is_ok());
        assert!(validate_url("http://localhost:5678/hook").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("https://").is_err());
        assert!(validate_url("https:///path").is_err());
    }
}
