use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use super::ServiceContext;
use crate::error::{errmsg, Result, ZingyError};
use crate::ledger::validation::require_not_blank;
use crate::model::{Notification, NotificationKind};
use crate::storage::sqlite::{begin_immediate, clients, finish, notifications};

/// Most notifications returned by one listing.
pub const NOTIFICATION_PAGE: u64 = 100;

/// Clients read per page while broadcasting.
const ANNOUNCE_PAGE: u64 = 500;

/// In-app notification inbox.
#[derive(Clone)]
pub struct NotificationService {
    ctx: ServiceContext,
}

impl NotificationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Send one client a notification outside any other flow.
    pub async fn notify(
        &self,
        client_id: Uuid,
        kind: NotificationKind,
        title: &str,
        body: &str,
    ) -> Result<Notification> {
        require_not_blank(title, errmsg::TITLE_REQUIRED)?;
        let now = self.ctx.now();

        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = match clients::require(&mut conn, client_id).await {
            Ok(_) => super::notify(&mut conn, client_id, kind, title, body, now).await,
            Err(e) => Err(e),
        };
        finish(&mut conn, result).await
    }

    /// Broadcast an announcement to every active client.
    ///
    /// Returns how many clients were notified.
    pub async fn announce(&self, title: &str, body: &str) -> Result<usize> {
        require_not_blank(title, errmsg::TITLE_REQUIRED)?;
        let now = self.ctx.now();

        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = Self::announce_tx(&mut conn, title, body, now).await;
        let sent = finish(&mut conn, result).await?;

        info!(recipients = sent, "Announcement sent");
        Ok(sent)
    }

    async fn announce_tx(
        conn: &mut SqliteConnection,
        title: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut sent = 0;
        let mut offset = 0;
        loop {
            let page = clients::list(conn, ANNOUNCE_PAGE, offset).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as u64;
            for client in page.iter().filter(|c| c.active) {
                super::notify(conn, client.id, NotificationKind::Announcement, title, body, now)
                    .await?;
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Newest first.
    pub async fn list(&self, client_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        let mut conn = self.ctx.pool.acquire().await?;
        notifications::list_for_client(&mut conn, client_id, unread_only, NOTIFICATION_PAGE).await
    }

    /// Mark one notification read. Clients can only mark their own.
    pub async fn mark_read(&self, client_id: Uuid, id: Uuid) -> Result<()> {
        let now = self.ctx.now();
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = match notifications::mark_read(&mut conn, client_id, id, now).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ZingyError::not_found("notification", id)),
            Err(e) => Err(e),
        };
        finish(&mut conn, result).await
    }

    /// Returns how many notifications were newly marked.
    pub async fn mark_all_read(&self, client_id: Uuid) -> Result<u64> {
        let now = self.ctx.now();
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = notifications::mark_all_read(&mut conn, client_id, now).await;
        finish(&mut conn, result).await
    }

    pub async fn unread_count(&self, client_id: Uuid) -> Result<i64> {
        let mut conn = self.ctx.pool.acquire().await?;
        notifications::unread_count(&mut conn, client_id).await
    }
}
