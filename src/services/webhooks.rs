use tracing::info;
use uuid::Uuid;

use super::ServiceContext;
use crate::error::{errmsg, Result, ZingyError};
use crate::ledger::validation::{require_not_blank, validate_url};
use crate::model::{EventKind, OutboxEvent, TextEnum, WebhookEndpoint, ALL_EVENTS};
use crate::storage::sqlite::{begin_immediate, finish, webhooks};

/// Webhook endpoint administration and outbox inspection.
#[derive(Clone)]
pub struct WebhookService {
    ctx: ServiceContext,
}

impl WebhookService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Register a delivery target.
    ///
    /// `events` lists event names, or `*` for all of them.
    pub async fn register_endpoint(
        &self,
        url: &str,
        secret: &str,
        events: &[&str],
    ) -> Result<WebhookEndpoint> {
        let url = validate_url(url)?;
        require_not_blank(secret, errmsg::SECRET_REQUIRED)?;
        if events.is_empty() {
            return Err(ZingyError::validation(errmsg::EVENTS_REQUIRED));
        }
        let mut subscribed: Vec<String> = Vec::with_capacity(events.len());
        for event in events {
            let event = event.trim();
            if event != ALL_EVENTS {
                EventKind::parse(event).map_err(|_| {
                    ZingyError::Validation(format!("{}: {}", errmsg::EVENT_UNKNOWN, event))
                })?;
            }
            if !subscribed.iter().any(|e| e == event) {
                subscribed.push(event.to_string());
            }
        }

        let endpoint = WebhookEndpoint {
            id: Uuid::new_v4(),
            url,
            secret: secret.to_string(),
            events: subscribed,
            active: true,
            created_at: self.ctx.now(),
        };

        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = webhooks::insert_endpoint(&mut conn, &endpoint).await;
        finish(&mut conn, result).await?;

        info!(
            endpoint_id = %endpoint.id,
            url = %endpoint.url,
            events = ?endpoint.events,
            "Webhook endpoint registered"
        );
        Ok(endpoint)
    }

    pub async fn set_endpoint_active(&self, id: Uuid, active: bool) -> Result<()> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = match webhooks::set_endpoint_active(&mut conn, id, active).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ZingyError::not_found("webhook endpoint", id)),
            Err(e) => Err(e),
        };
        finish(&mut conn, result).await
    }

    pub async fn list_endpoints(&self) -> Result<Vec<WebhookEndpoint>> {
        let mut conn = self.ctx.pool.acquire().await?;
        webhooks::list_endpoints(&mut conn, false).await
    }

    /// Events still waiting for delivery, oldest first.
    pub async fn pending_events(&self, limit: u64) -> Result<Vec<OutboxEvent>> {
        let mut conn = self.ctx.pool.acquire().await?;
        webhooks::pending(&mut conn, limit).await
    }

    /// Every recorded event of one kind, oldest first.
    pub async fn events_of(&self, kind: EventKind) -> Result<Vec<OutboxEvent>> {
        let mut conn = self.ctx.pool.acquire().await?;
        webhooks::list_by_event(&mut conn, kind.as_str()).await
    }

    pub async fn get_event(&self, id: Uuid) -> Result<OutboxEvent> {
        let mut conn = self.ctx.pool.acquire().await?;
        webhooks::get_event(&mut conn, id)
            .await?
            .ok_or_else(|| ZingyError::not_found("outbox event", id))
    }
}
