//! Ledger rule configuration: tiers, referral defaults, code generation and
//! the retry policy for version-guarded updates.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

use crate::error::{Result, ZingyError};

/// Lifetime-point thresholds at which a client enters each tier.
///
/// Bronze is everything below `silver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub silver: i64,
    pub gold: i64,
    pub vip: i64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            silver: 500,
            gold: 2000,
            vip: 5000,
        }
    }
}

impl TierThresholds {
    /// Thresholds must be positive and strictly increasing.
    pub fn validate(&self) -> Result<()> {
        if self.silver <= 0 || self.silver >= self.gold || self.gold >= self.vip {
            return Err(ZingyError::Config(format!(
                "tier thresholds must be increasing: silver={} gold={} vip={}",
                self.silver, self.gold, self.vip
            )));
        }
        Ok(())
    }
}

/// Referral settings written to the database the first time it is opened.
///
/// Administrators change the live values through the referral service; these
/// only seed an empty database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferralDefaults {
    pub enabled: bool,
    pub referee_bonus: i64,
    pub bronze_bonus: i64,
    pub silver_bonus: i64,
    pub gold_bonus: i64,
    pub vip_bonus: i64,
    /// Bonus-paying referrals per referrer per calendar month (0 = unlimited).
    pub monthly_cap: i64,
    /// Bonus-paying referrals per referrer, ever (0 = unlimited).
    pub lifetime_cap: i64,
}

impl Default for ReferralDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            referee_bonus: 50,
            bronze_bonus: 100,
            silver_bonus: 150,
            gold_bonus: 200,
            vip_bonus: 300,
            monthly_cap: 10,
            lifetime_cap: 100,
        }
    }
}

/// Code batch generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodesConfig {
    /// Random characters after `PREFIX-`.
    pub suffix_length: usize,
    /// Largest batch a single request may generate.
    pub max_batch_size: usize,
}

impl Default for CodesConfig {
    fn default() -> Self {
        Self {
            suffix_length: 8,
            max_batch_size: 10_000,
        }
    }
}

/// Retry policy for flows that lose an optimistic-concurrency race.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = no retries).
    pub max_times: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_times: 5,
            min_delay_ms: 10,
            max_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    /// Backoff builder with jitter, as used by every retried flow.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_times)
            .with_jitter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_are_valid() {
        assert!(TierThresholds::default().validate().is_ok());
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let thresholds = TierThresholds {
            silver: 500,
            gold: 400,
            vip: 5000,
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_zero_silver_rejected() {
        let thresholds = TierThresholds {
            silver: 0,
            ..TierThresholds::default()
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_referral_defaults() {
        let defaults = ReferralDefaults::default();
        assert!(defaults.enabled);
        assert_eq!(defaults.referee_bonus, 50);
        assert_eq!(defaults.vip_bonus, 300);
    }
}
