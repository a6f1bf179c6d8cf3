//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod ledger;
mod storage;
mod webhooks;

pub use ledger::{CodesConfig, ReferralDefaults, RetryConfig, TierThresholds};
pub use storage::StorageConfig;
pub use webhooks::WebhookConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ZINGY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ZINGY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ZINGY_LOG";
/// Environment variable selecting the log output format (`json` or `text`).
pub const LOG_FORMAT_ENV_VAR: &str = "ZINGY_LOG_FORMAT";

use serde::Deserialize;

use crate::error::{Result, ZingyError};
use crate::ledger::validation::validate_referral_settings;
use crate::model::ReferralSettings;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Lifetime-point thresholds for client tiers.
    pub tiers: TierThresholds,
    /// Referral settings used to seed the settings row on first start.
    pub referrals: ReferralDefaults,
    /// Code batch generation.
    pub codes: CodesConfig,
    /// Optimistic-concurrency retry policy.
    pub retry: RetryConfig,
    /// Webhook outbox relay.
    pub webhooks: WebhookConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break ledger invariants.
    pub fn validate(&self) -> Result<()> {
        self.tiers.validate()?;
        if self.codes.suffix_length < 4 {
            return Err(ZingyError::Config(
                "codes.suffix_length must be at least 4".to_string(),
            ));
        }
        if self.webhooks.max_attempts == 0 {
            return Err(ZingyError::Config(
                "webhooks.max_attempts must be at least 1".to_string(),
            ));
        }
        validate_referral_settings(&ReferralSettings::from(&self.referrals))
            .map_err(|e| ZingyError::Config(format!("referrals: {e}")))?;
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig::in_memory(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.path, "data/zingy.db");
        assert_eq!(config.tiers.silver, 500);
        assert_eq!(config.webhooks.max_attempts, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_for_test() {
        let config = Config::for_test();
        assert!(config.storage.is_in_memory());
        assert_eq!(config.storage.max_connections, 1);
    }

    #[test]
    fn test_validate_rejects_short_suffix() {
        let mut config = Config::default();
        config.codes.suffix_length = 2;
        assert!(matches!(config.validate(), Err(ZingyError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_referral_defaults() {
        let mut config = Config::default();
        config.referrals.bronze_bonus = -100;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ZingyError::Config(ref msg) if msg.starts_with("referrals:")));

        let mut config = Config::default();
        config.referrals.vip_bonus = i64::MAX;
        assert!(matches!(config.validate(), Err(ZingyError::Config(_))));
    }

    #[test]
    fn test_load_from_yaml_file() {
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "storage:\n  path: /tmp/zingy-test.db\ntiers:\n  silver: 100\n  gold: 200\n  vip: 300\nreferrals:\n  monthly_cap: 3"
        )
        .expect("write config");

        let path = file.path().to_str().expect("utf-8 path");
        let config = Config::load(Some(path)).expect("config loads");

        assert_eq!(config.storage.path, "/tmp/zingy-test.db");
        assert_eq!(config.tiers.gold, 200);
        assert_eq!(config.referrals.monthly_cap, 3);
        // Untouched sections keep their defaults
        assert_eq!(config.codes.suffix_length, 8);
    }
}
