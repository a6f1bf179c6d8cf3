//! Webhook outbox relay configuration.

use serde::Deserialize;

/// Outbox relay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Seconds between relay passes. Default: 5.
    pub interval_secs: u64,
    /// Events loaded per pass. Default: 50.
    pub batch_size: u32,
    /// Failed passes before an event is marked dead. Default: 8.
    pub max_attempts: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            batch_size: 50,
            max_attempts: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_config_default() {
        let config = WebhookConfig::default();
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_attempts, 8);
    }
}
