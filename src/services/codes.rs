use serde_json::json;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use super::referrals::{self, ReferralOutcome};
use super::{campaigns, emit, notify, post, require_active, Posting, ServiceContext};
use crate::error::{errmsg, Result, ZingyError};
use crate::ledger::apply_multiplier;
use crate::ledger::validation::{require_amount, require_not_blank, validate_prefix};
use crate::model::{
    Client, Code, CodeBatch, EntryKind, EventKind, NewCodeBatch, NotificationKind,
};
use crate::storage::sqlite::{begin_immediate, clients, codes, finish};
use crate::utils::codes::{normalize_code, scan_code};
use crate::utils::retry_conflicts;

/// Draws per code before a batch is abandoned as colliding.
const SUFFIX_ATTEMPTS: usize = 32;

/// Result of a successful code scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// The scanning client after every credit in the scan.
    pub client: Client,
    pub code: Code,
    /// Points credited for the code itself.
    pub points: i64,
    /// Campaign multiplier applied, in percent.
    pub multiplier_percent: i64,
    /// Set when this scan settled the client's referral.
    pub referral: Option<ReferralOutcome>,
}

/// Code batch generation and redemption.
#[derive(Clone)]
pub struct CodeService {
    ctx: ServiceContext,
}

impl CodeService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Generate a batch of unique single-use codes.
    pub async fn generate_batch(&self, new: NewCodeBatch) -> Result<(CodeBatch, Vec<Code>)> {
        require_not_blank(&new.name, errmsg::NAME_REQUIRED)?;
        require_amount(new.points, errmsg::POINTS_POSITIVE)?;
        let prefix = validate_prefix(&new.prefix)?;
        if new.quantity == 0 || new.quantity > self.ctx.config.codes.max_batch_size {
            return Err(ZingyError::validation(errmsg::QUANTITY_INVALID));
        }
        let now = self.ctx.now();
        if new.expires_at.is_some_and(|expiry| expiry <= now) {
            return Err(ZingyError::validation(errmsg::EXPIRY_PAST));
        }

        let batch = CodeBatch {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            prefix,
            points: new.points,
            quantity: new.quantity as i64,
            expires_at: new.expires_at,
            active: true,
            created_at: now,
        };

        let codes = retry_conflicts(&self.ctx.config.retry, "generate_batch", || {
            self.generate_once(&batch)
        })
        .await?;

        info!(
            batch_id = %batch.id,
            prefix = %batch.prefix,
            quantity = codes.len(),
            points = batch.points,
            "Code batch generated"
        );
        Ok((batch, codes))
    }

    async fn generate_once(&self, batch: &CodeBatch) -> Result<Vec<Code>> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = self.generate_tx(&mut conn, batch).await;
        finish(&mut conn, result).await
    }

    async fn generate_tx(&self, conn: &mut SqliteConnection, batch: &CodeBatch) -> Result<Vec<Code>> {
        codes::insert_batch(conn, batch).await?;

        let suffix_length = self.ctx.config.codes.suffix_length;
        let mut generated = Vec::with_capacity(batch.quantity as usize);
        for _ in 0..batch.quantity {
            let mut inserted = None;
            for _ in 0..SUFFIX_ATTEMPTS {
                let code = Code {
                    id: Uuid::new_v4(),
                    batch_id: batch.id,
                    code: scan_code(&batch.prefix, suffix_length),
                    redeemed_by: None,
                    redeemed_at: None,
                    points_awarded: None,
                };
                if codes::try_insert_code(conn, &code).await? {
                    inserted = Some(code);
                    break;
                }
            }
            match inserted {
                Some(code) => generated.push(code),
                None => {
                    warn!(prefix = %batch.prefix, "Code space exhausted");
                    return Err(ZingyError::Rejected(format!(
                        "no free codes left for prefix {}",
                        batch.prefix
                    )));
                }
            }
        }
        Ok(generated)
    }

    pub async fn get_batch(&self, id: Uuid) -> Result<CodeBatch> {
        let mut conn = self.ctx.pool.acquire().await?;
        codes::get_batch(&mut conn, id)
            .await?
            .ok_or_else(|| ZingyError::not_found("code batch", id))
    }

    pub async fn list_batches(&self) -> Result<Vec<CodeBatch>> {
        let mut conn = self.ctx.pool.acquire().await?;
        codes::list_batches(&mut conn).await
    }

    /// Stop a batch from being redeemed. Codes already redeemed keep their
    /// points.
    pub async fn deactivate_batch(&self, id: Uuid) -> Result<()> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = match codes::set_batch_active(&mut conn, id, false).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ZingyError::not_found("code batch", id)),
            Err(e) => Err(e),
        };
        finish(&mut conn, result).await?;
        info!(batch_id = %id, "Code batch deactivated");
        Ok(())
    }

    pub async fn list_codes(&self, batch_id: Uuid) -> Result<Vec<Code>> {
        let mut conn = self.ctx.pool.acquire().await?;
        if codes::get_batch(&mut conn, batch_id).await?.is_none() {
            return Err(ZingyError::not_found("code batch", batch_id));
        }
        codes::list_codes(&mut conn, batch_id).await
    }

    /// Redeemed codes in a batch.
    pub async fn redeemed_count(&self, batch_id: Uuid) -> Result<i64> {
        let mut conn = self.ctx.pool.acquire().await?;
        codes::count_redeemed(&mut conn, batch_id).await
    }

    /// Redeem a scanned code for a client.
    ///
    /// A code pays out once. The first scan of a referred client also settles
    /// their referral in the same transaction.
    pub async fn redeem(&self, client_id: Uuid, raw_code: &str) -> Result<ScanOutcome> {
        let text = normalize_code(raw_code);
        if text.is_empty() {
            return Err(ZingyError::UnknownCode(text));
        }

        let outcome = retry_conflicts(&self.ctx.config.retry, "redeem_code", || {
            self.redeem_once(client_id, &text)
        })
        .await?;

        info!(
            client_id = %client_id,
            code = %outcome.code.code,
            points = outcome.points,
            multiplier = outcome.multiplier_percent,
            balance = outcome.client.points,
            "Code redeemed"
        );
        Ok(outcome)
    }

    async fn redeem_once(&self, client_id: Uuid, text: &str) -> Result<ScanOutcome> {
        let mut conn = begin_immediate(&self.ctx.pool).await?;
        let result = self.redeem_tx(&mut conn, client_id, text).await;
        finish(&mut conn, result).await
    }

    async fn redeem_tx(
        &self,
        conn: &mut SqliteConnection,
        client_id: Uuid,
        text: &str,
    ) -> Result<ScanOutcome> {
        let now = self.ctx.now();

        let code = codes::find_code(conn, text)
            .await?
            .ok_or_else(|| ZingyError::UnknownCode(text.to_string()))?;
        let batch = codes::get_batch(conn, code.batch_id)
            .await?
            .ok_or_else(|| ZingyError::Corrupt(format!("code {} has no batch", code.id)))?;
        if !batch.active {
            return Err(ZingyError::BatchInactive(text.to_string()));
        }
        if batch.is_expired(now) {
            return Err(ZingyError::CodeExpired(text.to_string()));
        }

        let client = clients::require(conn, client_id).await?;
        require_active(&client)?;
        if code.is_redeemed() {
            return Err(ZingyError::CodeAlreadyRedeemed(text.to_string()));
        }

        let multiplier_percent = campaigns::best_multiplier_tx(conn, now).await?;
        let points = apply_multiplier(batch.points, multiplier_percent)
            .ok_or_else(|| ZingyError::validation(errmsg::POINTS_TOO_LARGE))?;

        // Zero rows means a concurrent scan claimed it first
        if !codes::claim_code(conn, code.id, client.id, points, now).await? {
            return Err(ZingyError::CodeAlreadyRedeemed(text.to_string()));
        }

        let client = post(
            conn,
            &client,
            Posting {
                delta: points,
                kind: EntryKind::CodeScan,
                earns: true,
                reference: Some(code.id.to_string()),
                note: Some(text),
            },
            now,
        )
        .await?;

        notify(
            conn,
            client.id,
            NotificationKind::PointsEarned,
            "Points earned",
            format!(
                "You earned {} points from {}. Balance: {}.",
                points, batch.name, client.points
            ),
            now,
        )
        .await?;

        emit(
            conn,
            EventKind::CodeRedeemed,
            json!({
                "client_id": client.id,
                "code": text,
                "batch_id": batch.id,
                "points": points,
                "multiplier_percent": multiplier_percent,
                "balance": client.points,
            }),
            now,
        )
        .await?;

        let referral = referrals::complete_tx(conn, &self.ctx.config, &client, now).await?;
        let client = match &referral {
            Some(outcome) => outcome.referee.clone(),
            None => client,
        };

        let code = Code {
            redeemed_by: Some(client.id),
            redeemed_at: Some(now),
            points_awarded: Some(points),
            ..code
        };

        Ok(ScanOutcome {
            client,
            code,
            points,
            multiplier_percent,
            referral,
        })
    }
}
