//! Outbound webhook events: signing, the delivery seam, and the outbox relay.
//!
//! Flows record events in the outbox inside their own transaction. The
//! [`OutboxRelay`] later wraps each event in a [`WebhookEnvelope`], signs the
//! JSON body once per endpoint, and hands it to a [`WebhookSender`].
//! Delivery is at-least-once: receivers should deduplicate on the envelope id.

mod relay;

pub use relay::{spawn_relay_task, OutboxRelay, RelayReport, RelayTaskHandle};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{WebhookEndpoint, WebhookEnvelope};

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Zingy-Signature";
/// Header carrying the event name.
pub const EVENT_HEADER: &str = "X-Zingy-Event";
/// Signature scheme prefix.
const SIGNATURE_PREFIX: &str = "sha256=";

/// `sha256=<hex>` HMAC of `body` keyed by the endpoint secret.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    // new_from_slice accepts any key length for SHA256
    let mut mac = match <Hmac<Sha256>>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Check a received signature in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_sig) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = <Hmac<Sha256>>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// One signed request, ready to send to one endpoint.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub event_id: Uuid,
    pub event: String,
    /// Serialized [`WebhookEnvelope`].
    pub body: String,
    /// Value for [`SIGNATURE_HEADER`].
    pub signature: String,
}

impl Delivery {
    pub fn new(envelope: &WebhookEnvelope, endpoint: &WebhookEndpoint) -> Result<Self> {
        let body = serde_json::to_string(envelope)?;
        let signature = sign_payload(&endpoint.secret, body.as_bytes());
        Ok(Self {
            event_id: envelope.id,
            event: envelope.event.clone(),
            body,
            signature,
        })
    }
}

/// Transport for signed deliveries (HTTP POST in production).
///
/// An `Err` counts as a failed attempt and the event is retried on a later
/// relay pass.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, endpoint: &WebhookEndpoint, delivery: &Delivery) -> Result<()>;
}

/// Sender that only logs each delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSender;

#[async_trait]
impl WebhookSender for TracingSender {
    async fn send(&self, endpoint: &WebhookEndpoint, delivery: &Delivery) -> Result<()> {
        info!(
            endpoint_id = %endpoint.id,
            url = %endpoint.url,
            event = %delivery.event,
            event_id = %delivery.event_id,
            signature = %delivery.signature,
            bytes = delivery.body.len(),
            "Webhook delivery"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_signature_shape() {
        let sig = sign_payload("s3cret", b"{\"event\":\"code.redeemed\"}");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
    }

    #[test]
    fn test_signature_depends_on_secret_and_body() {
        let body = b"{}";
        assert_eq!(sign_payload("a", body), sign_payload("a", body));
        assert_ne!(sign_payload("a", body), sign_payload("b", body));
        assert_ne!(sign_payload("a", body), sign_payload("a", b"[]"));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let sig = sign_payload("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_signature() {
        let body = br#"{"id":"1"}"#;
        let sig = sign_payload("s3cret", body);
        assert!(verify_signature("s3cret", body, &sig));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("s3cret", b"{}", &sig));
        assert!(!verify_signature("s3cret", body, "md5=abc"));
    }

    #[test]
    fn test_delivery_signs_envelope_body() {
        let endpoint = WebhookEndpoint {
            id: Uuid::new_v4(),
            url: "https://n8n.example.com/hook".into(),
            secret: "s3cret".into(),
            events: vec!["*".into()],
            active: true,
            created_at: Utc::now(),
        };
        let envelope = WebhookEnvelope {
            id: Uuid::new_v4(),
            event: "points.adjusted".into(),
            occurred_at: Utc::now(),
            data: serde_json::json!({"delta": 10}),
        };

        let delivery = Delivery::new(&envelope, &endpoint).unwrap();
        assert!(verify_signature("s3cret", delivery.body.as_bytes(), &delivery.signature));

        let parsed: WebhookEnvelope = serde_json::from_str(&delivery.body).unwrap();
        assert_eq!(parsed, envelope);
    }
}
