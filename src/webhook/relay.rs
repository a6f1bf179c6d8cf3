//! Outbox relay: delivers recorded events to subscribed endpoints.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Delivery, WebhookSender};
use crate::config::WebhookConfig;
use crate::error::Result;
use crate::model::{OutboxEvent, WebhookEndpoint};
use crate::storage::sqlite::webhooks;
use crate::utils::Clock;

/// Counts from one relay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    /// Events every subscribed endpoint accepted (or that nobody subscribes to).
    pub delivered: usize,
    /// Events that failed and will be retried.
    pub failed: usize,
    /// Events that failed for the last time.
    pub dead: usize,
}

impl RelayReport {
    pub fn is_empty(&self) -> bool {
        self.delivered == 0 && self.failed == 0 && self.dead == 0
    }
}

/// Moves events from the outbox to webhook endpoints.
pub struct OutboxRelay {
    pool: SqlitePool,
    sender: Arc<dyn WebhookSender>,
    config: WebhookConfig,
    clock: Arc<dyn Clock>,
}

impl OutboxRelay {
    pub fn new(
        pool: SqlitePool,
        sender: Arc<dyn WebhookSender>,
        config: WebhookConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            sender,
            config,
            clock,
        }
    }

    /// Deliver up to `batch_size` pending events, oldest first.
    ///
    /// An event is delivered once every active endpoint subscribed to it has
    /// accepted it. Any failure counts one attempt against the event, and it
    /// is sent again (to all of its endpoints) on a later pass.
    pub async fn relay_once(&self) -> Result<RelayReport> {
        // Connection is released before sending so flows are not blocked
        let (endpoints, events) = {
            let mut conn = self.pool.acquire().await?;
            let endpoints = webhooks::list_endpoints(&mut conn, true).await?;
            let events = webhooks::pending(&mut conn, u64::from(self.config.batch_size)).await?;
            (endpoints, events)
        };

        let mut report = RelayReport::default();
        for event in &events {
            let errors = self.fan_out(event, &endpoints).await;

            let mut conn = self.pool.acquire().await?;
            if errors.is_empty() {
                webhooks::mark_delivered(&mut conn, event.id, self.clock.now()).await?;
                report.delivered += 1;
                continue;
            }

            let attempts = event.attempts + 1;
            let dead = attempts >= i64::from(self.config.max_attempts);
            let last_error = errors.join("; ");
            webhooks::record_failure(&mut conn, event.id, attempts, &last_error, dead).await?;
            if dead {
                error!(
                    id = %event.id,
                    event = %event.event,
                    attempts,
                    error = %last_error,
                    "Webhook event abandoned"
                );
                report.dead += 1;
            } else {
                warn!(
                    id = %event.id,
                    event = %event.event,
                    attempts,
                    error = %last_error,
                    "Webhook delivery failed, will retry"
                );
                report.failed += 1;
            }
        }

        if !report.is_empty() {
            info!(
                delivered = report.delivered,
                failed = report.failed,
                dead = report.dead,
                "Outbox relay pass"
            );
        }
        Ok(report)
    }

    /// Send one event to every subscribed endpoint. Returns the failures.
    async fn fan_out(&self, event: &OutboxEvent, endpoints: &[WebhookEndpoint]) -> Vec<String> {
        let envelope = event.envelope();
        let mut errors = Vec::new();

        for endpoint in endpoints.iter().filter(|e| e.subscribes_to(&event.event)) {
            let outcome = match Delivery::new(&envelope, endpoint) {
                Ok(delivery) => self.sender.send(endpoint, &delivery).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    debug!(id = %event.id, endpoint_id = %endpoint.id, "Webhook delivered");
                }
                Err(e) => errors.push(format!("{}: {}", endpoint.url, e)),
            }
        }
        errors
    }

    /// Relay on an interval until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        info!(
            interval_secs = self.config.interval_secs,
            batch_size = self.config.batch_size,
            "Outbox relay started"
        );

        tokio::pin!(shutdown);
        loop {
            if let Err(e) = self.relay_once().await {
                error!(error = %e, "Outbox relay pass failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => {
                    info!("Outbox relay stopped");
                    break;
                }
            }
        }
    }
}

/// Handle to a relay running in the background.
pub struct RelayTaskHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayTaskHandle {
    /// Signal the relay to stop after its current pass.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    /// Stop the relay and wait for it to finish.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            error!(error = %e, "Outbox relay task panicked");
        }
    }
}

/// Spawn a background task running [`OutboxRelay::run`].
pub fn spawn_relay_task(relay: Arc<OutboxRelay>) -> RelayTaskHandle {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let cancelled = async move {
            loop {
                if *cancel_rx.borrow_and_update() {
                    break;
                }
                if cancel_rx.changed().await.is_err() {
                    break;
                }
            }
        };
        relay.run(cancelled).await;
    });

    RelayTaskHandle {
        cancel: cancel_tx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    use crate::error::ZingyError;
    use crate::storage::open_in_memory;
    use crate::storage::{migrate, sqlite::webhooks as store};
    use crate::utils::FixedClock;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, Delivery)>>,
        fail_urls: Vec<String>,
    }

    #[async_trait]
    impl WebhookSender for RecordingSender {
        async fn send(&self, endpoint: &WebhookEndpoint, delivery: &Delivery) -> Result<()> {
            if self.fail_urls.contains(&endpoint.url) {
                return Err(ZingyError::Delivery("connection refused".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((endpoint.url.clone(), delivery.clone()));
            Ok(())
        }
    }

    async fn pool() -> SqlitePool {
        let pool = open_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();
        pool
    }

    async fn add_endpoint(pool: &SqlitePool, url: &str, events: &[&str]) {
        let mut conn = pool.acquire().await.unwrap();
        store::insert_endpoint(
            &mut conn,
            &WebhookEndpoint {
                id: Uuid::new_v4(),
                url: url.into(),
                secret: "s3cret".into(),
                events: events.iter().map(|e| e.to_string()).collect(),
                active: true,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    }

    async fn add_event(pool: &SqlitePool, event: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut conn = pool.acquire().await.unwrap();
        store::enqueue(
            &mut conn,
            &OutboxEvent {
                id,
                event: event.into(),
                payload: serde_json::json!({"n": 1}),
                created_at: Utc::now(),
                attempts: 0,
                delivered_at: None,
                last_error: None,
                dead: false,
            },
        )
        .await
        .unwrap();
        id
    }

    async fn event(pool: &SqlitePool, id: Uuid) -> OutboxEvent {
        let mut conn = pool.acquire().await.unwrap();
        store::get_event(&mut conn, id).await.unwrap().unwrap()
    }

    fn relay(pool: &SqlitePool, sender: Arc<RecordingSender>, max_attempts: u32) -> OutboxRelay {
        OutboxRelay::new(
            pool.clone(),
            sender,
            WebhookConfig {
                max_attempts,
                ..WebhookConfig::default()
            },
            Arc::new(FixedClock::at_date(2026, 5, 1)),
        )
    }

    #[tokio::test]
    async fn test_delivers_to_subscribed_endpoints_only() {
        let pool = pool().await;
        add_endpoint(&pool, "https://a.example.com", &["*"]).await;
        add_endpoint(&pool, "https://b.example.com", &["redemption.approved"]).await;
        let id = add_event(&pool, "code.redeemed").await;

        let sender = Arc::new(RecordingSender::default());
        let report = relay(&pool, sender.clone(), 3).relay_once().await.unwrap();

        assert_eq!(report.delivered, 1);
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://a.example.com");
        assert!(super::super::verify_signature(
            "s3cret",
            sent[0].1.body.as_bytes(),
            &sent[0].1.signature
        ));
        drop(sent);

        assert!(event(&pool, id).await.delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_unsubscribed_event_is_marked_delivered() {
        let pool = pool().await;
        let id = add_event(&pool, "points.adjusted").await;

        let sender = Arc::new(RecordingSender::default());
        let report = relay(&pool, sender.clone(), 3).relay_once().await.unwrap();

        assert_eq!(report.delivered, 1);
        assert!(sender.sent.lock().unwrap().is_empty());
        assert!(event(&pool, id).await.delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_counts_attempts_then_dies() {
        let pool = pool().await;
        add_endpoint(&pool, "https://down.example.com", &["*"]).await;
        let id = add_event(&pool, "code.redeemed").await;

        let sender = Arc::new(RecordingSender {
            fail_urls: vec!["https://down.example.com".into()],
            ..Default::default()
        });
        let relay = relay(&pool, sender, 2);

        let first = relay.relay_once().await.unwrap();
        assert_eq!(first.failed, 1);
        let stored = event(&pool, id).await;
        assert_eq!(stored.attempts, 1);
        assert!(!stored.dead);
        assert!(stored.last_error.unwrap().contains("connection refused"));

        let second = relay.relay_once().await.unwrap();
        assert_eq!(second.dead, 1);
        assert!(event(&pool, id).await.dead);

        // Dead events are no longer picked up
        assert!(relay.relay_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let pool = pool().await;
        let id = add_event(&pool, "code.redeemed").await;
        let relay = relay(&pool, Arc::new(RecordingSender::default()), 3);

        // Shutdown already resolved: one pass, then exit
        relay.run(async {}).await;
        assert!(event(&pool, id).await.delivered_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawned_relay_delivers_then_shuts_down() {
        let pool = pool().await;
        add_endpoint(&pool, "https://a.example.com", &["*"]).await;
        let id = add_event(&pool, "client.registered").await;

        let sender = Arc::new(RecordingSender::default());
        let handle = spawn_relay_task(Arc::new(relay(&pool, sender.clone(), 3)));

        // First pass runs immediately on spawn
        let mut delivered = false;
        for _ in 0..100 {
            if event(&pool, id).await.delivered_at.is_some() {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("relay task stops on shutdown");
        assert!(delivered);
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }
}
