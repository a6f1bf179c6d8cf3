//! Shared utilities for integration tests.
//!
//! Builds a [`Loyalty`] over an in-memory database with a manually advanced
//! clock, plus helpers for the usual fixtures (clients, code batches,
//! rewards).

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use zingy::config::{Config, RetryConfig, StorageConfig};
use zingy::model::{Client, Code, NewClient, NewCodeBatch, NewReward, Reward};
use zingy::storage::{migrate, open_in_memory};
use zingy::utils::FixedClock;
use zingy::Loyalty;

/// Program under test with its clock.
pub struct Harness {
    pub loyalty: Loyalty,
    pub clock: Arc<FixedClock>,
    /// Keeps a file-backed database alive for the test.
    _dir: Option<TempDir>,
}

/// Retry quickly; tests race flows on purpose.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_times: 20,
        min_delay_ms: 1,
        max_delay_ms: 20,
    }
}

pub fn test_config() -> Config {
    Config {
        retry: fast_retry(),
        ..Config::for_test()
    }
}

/// In-memory program pinned to 2026-05-10.
pub async fn setup() -> Harness {
    setup_with(test_config()).await
}

pub async fn setup_with(config: Config) -> Harness {
    let pool = open_in_memory().await.expect("open in-memory database");
    migrate(&pool).await.expect("migrate");

    let clock = Arc::new(FixedClock::at_date(2026, 5, 10));
    let loyalty = Loyalty::new(pool, config, clock.clone());
    loyalty.referrals.seed_settings().await.expect("seed settings");

    Harness {
        loyalty,
        clock,
        _dir: None,
    }
}

/// File-backed program with a multi-connection pool, for concurrency tests.
pub async fn setup_file_backed() -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("zingy.db");
    let config = Config {
        storage: StorageConfig {
            path: path.to_string_lossy().into_owned(),
            max_connections: 8,
            busy_timeout_ms: 5000,
        },
        retry: fast_retry(),
        ..Config::default()
    };

    let clock = Arc::new(FixedClock::at_date(2026, 5, 10));
    let loyalty = Loyalty::open_with_clock(config, clock.clone())
        .await
        .expect("open file-backed program");

    Harness {
        loyalty,
        clock,
        _dir: Some(dir),
    }
}

impl Harness {
    pub fn now(&self) -> DateTime<Utc> {
        use zingy::utils::Clock;
        self.clock.now()
    }

    /// Register a client with a phone derived from `n`.
    pub async fn client(&self, name: &str, n: u32) -> Client {
        self.register(name, n, None).await
    }

    /// Register a client referred by `referral_code`.
    pub async fn referred(&self, name: &str, n: u32, referral_code: &str) -> Client {
        self.register(name, n, Some(referral_code)).await
    }

    async fn register(&self, name: &str, n: u32, referred_by: Option<&str>) -> Client {
        self.loyalty
            .clients
            .register(NewClient {
                name: name.to_string(),
                phone: phone(n),
                email: None,
                referred_by: referred_by.map(str::to_string),
            })
            .await
            .expect("register client")
    }

    /// Generate `quantity` codes worth `points` each.
    pub async fn codes(&self, points: i64, quantity: usize) -> Vec<Code> {
        let (_, codes) = self
            .loyalty
            .codes
            .generate_batch(NewCodeBatch {
                name: "Tasting night".to_string(),
                prefix: "TASTE".to_string(),
                points,
                quantity,
                expires_at: Some(self.now() + Duration::days(30)),
            })
            .await
            .expect("generate batch");
        codes
    }

    /// One fresh code worth `points`.
    pub async fn code(&self, points: i64) -> String {
        self.codes(points, 1).await.remove(0).code
    }

    /// Give a client `points` by scanning a fresh code.
    pub async fn earn(&self, client: &Client, points: i64) -> Client {
        let code = self.code(points).await;
        self.loyalty
            .codes
            .redeem(client.id, &code)
            .await
            .expect("redeem code")
            .client
    }

    pub async fn reward(&self, cost: i64, stock: Option<i64>) -> Reward {
        self.loyalty
            .rewards
            .create_reward(NewReward {
                name: "Free espresso".to_string(),
                description: "Any single-origin shot".to_string(),
                cost,
                stock,
            })
            .await
            .expect("create reward")
    }

    /// Balance must equal the sum of the client's ledger deltas.
    pub async fn assert_ledger_consistent(&self, client: &Client) {
        let stored = self.loyalty.clients.get(client.id).await.expect("client");
        let sum = self
            .loyalty
            .clients
            .ledger_balance(client.id)
            .await
            .expect("ledger sum");
        assert_eq!(
            stored.points, sum,
            "balance of {} disagrees with its ledger",
            stored.name
        );
        assert!(stored.points >= 0);
    }
}

/// Valid, distinct phone number for fixture `n`.
pub fn phone(n: u32) -> String {
    format!("+6591{:06}", n)
}
