use serde_json::json;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use super::{emit, notify, ServiceContext};
use crate::error::{errmsg, Result, ZingyError};
use crate::ledger::validation::{normalize_phone, require_not_blank, validate_email};
use crate::model::{
    Client, EventKind, LedgerEntry, NewClient, NotificationKind, Referral, ReferralStatus, Tier,
};
use crate::storage::sqlite::{begin_immediate, clients, finish, ledger, referrals};
use crate::utils::codes::{normalize_code, random_code, REFERRAL_CODE_LENGTH};
use crate::utils::retry_conflicts;

/// Draws before giving up on finding a free referral code.
const REFERRAL_CODE_ATTEMPTS: usize = 16;

/// Registration input after validation.
struct Registration {
    name: String,
    phone: String,
    email: Option<String>,
    referred_by: Option<String>,
}

/// Client registration and lookup.
#[derive(Clone)]
pub struct ClientService {
    ctx: ServiceContext,
}

impl ClientService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Register a client, optionally referred by another client's code.
    ///
    /// A referral code is honoured only while the referral program is
    /// enabled; otherwise it is ignored. The referral stays pending until the
    /// new client's first code scan.
    pub async fn register(&self, new: NewClient) -> Result<Client> {
        require_not_blank(&new.name, errmsg::NAME_REQUIRED)?;
        let registration = Registration {
            name: new.name.trim().to_string(),
            phone: normalize_phone(&new.phone)?,
            email: match new.email.as_deref().map(str::trim) {
                Some(email) if !email.is_empty() => Some(validate_email(email)?),
                _ => None,
            },
            referred_by: new
                .referred_by
                .as_deref()
                .map(normalize_code)
                .filter(|code| !code.is_empty()),
        };

        let client = retry_conflicts(&self.ctx.config.retry, "register_client", || {
            self.register_once(&registration)
        })
        .await?;

        info!(client_id = %client.id, referral_code = %client.referral_code, "Client registered");
        Ok(client)
    }

    async fn register_once(&self, registration: &Registration) -> Result<Client> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = self.register_tx(&mut conn, registration).await;
        finish(&mut conn, result).await
    }

    async fn register_tx(
        &self,
        conn: &mut SqliteConnection,
        registration: &Registration,
    ) -> Result<Client> {
        let now = self.ctx.now();

        if clients::find_by_phone(conn, &registration.phone).await?.is_some() {
            return Err(ZingyError::DuplicatePhone);
        }

        let settings = super::referrals::load_settings(conn, &self.ctx.config).await?;
        let referrer = match &registration.referred_by {
            Some(code) if settings.enabled => {
                let referrer = clients::find_by_referral_code(conn, code)
                    .await?
                    .filter(|c| c.active)
                    .ok_or_else(|| ZingyError::InvalidReferralCode(code.clone()))?;
                Some(referrer)
            }
            _ => None,
        };

        let client = Client {
            id: Uuid::new_v4(),
            name: registration.name.clone(),
            phone: registration.phone.clone(),
            email: registration.email.clone(),
            referral_code: Self::free_referral_code(conn).await?,
            points: 0,
            lifetime_points: 0,
            version: 0,
            active: true,
            created_at: now,
        };
        clients::insert(conn, &client).await?;

        if let Some(referrer) = &referrer {
            let referral = Referral {
                id: Uuid::new_v4(),
                referrer_id: referrer.id,
                referee_id: client.id,
                status: ReferralStatus::Pending,
                referrer_tier: None,
                referrer_bonus: 0,
                referee_bonus: 0,
                created_at: now,
                completed_at: None,
            };
            referrals::insert(conn, &referral).await?;
        }

        notify(
            conn,
            client.id,
            NotificationKind::Welcome,
            "Welcome to Crew Zingy",
            format!(
                "Hi {}! Scan codes to earn points. Your referral code is {}.",
                client.name, client.referral_code
            ),
            now,
        )
        .await?;

        emit(
            conn,
            EventKind::ClientRegistered,
            json!({
                "client_id": client.id,
                "name": client.name,
                "phone": client.phone,
                "email": client.email,
                "referral_code": client.referral_code,
                "referred_by": referrer.as_ref().map(|r| r.id),
            }),
            now,
        )
        .await?;

        Ok(client)
    }

    async fn free_referral_code(conn: &mut SqliteConnection) -> Result<String> {
        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = random_code(REFERRAL_CODE_LENGTH);
            if clients::find_by_referral_code(conn, &code).await?.is_none() {
                return Ok(code);
            }
        }
        Err(ZingyError::Rejected(
            "could not allocate a unique referral code".to_string(),
        ))
    }

    pub async fn get(&self, id: Uuid) -> Result<Client> {
        let mut conn = self.ctx.pool.acquire().await?;
        clients::require(&mut conn, id).await
    }

    /// Look a client up by phone, in any formatting the registration accepts.
    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<Client>> {
        let phone = normalize_phone(phone)?;
        let mut conn = self.ctx.pool.acquire().await?;
        clients::find_by_phone(&mut conn, &phone).await
    }

    pub async fn find_by_referral_code(&self, code: &str) -> Result<Option<Client>> {
        let mut conn = self.ctx.pool.acquire().await?;
        clients::find_by_referral_code(&mut conn, &normalize_code(code)).await
    }

    pub async fn list(&self, limit: u64, offset: u64) -> Result<Vec<Client>> {
        let mut conn = self.ctx.pool.acquire().await?;
        clients::list(&mut conn, limit, offset).await
    }

    /// Suspend or reinstate a client. Inactive clients cannot earn, spend,
    /// transfer, or refer.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<()> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = match clients::set_active(&mut conn, id, active).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ZingyError::not_found("client", id)),
            Err(e) => Err(e),
        };
        finish(&mut conn, result).await?;
        info!(client_id = %id, active, "Client active flag changed");
        Ok(())
    }

    pub fn tier_of(&self, client: &Client) -> Tier {
        client.tier(&self.ctx.config.tiers)
    }

    /// Most recent ledger entries, newest first.
    pub async fn ledger(&self, id: Uuid, limit: u64) -> Result<Vec<LedgerEntry>> {
        let mut conn = self.ctx.pool.acquire().await?;
        clients::require(&mut conn, id).await?;
        ledger::list_for_client(&mut conn, id, limit).await
    }

    /// Balance recomputed from the ledger. Equal to `points` for every client.
    pub async fn ledger_balance(&self, id: Uuid) -> Result<i64> {
        let mut conn = self.ctx.pool.acquire().await?;
        ledger::balance_of(&mut conn, id).await
    }
}
