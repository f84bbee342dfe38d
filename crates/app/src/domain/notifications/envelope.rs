//! Webhook envelopes and signatures.

use hmac::{Hmac, Mac, digest::InvalidLength};
use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;

use crate::domain::{
    notifications::{events::OrderEvent, records::SigningSecret},
    orders::records::OrderUuid,
};

pub const SIGNATURE_HEADER: &str = "X-Waybill-Signature";
pub const EVENT_HEADER: &str = "X-Waybill-Event";
pub const DELIVERY_HEADER: &str = "X-Waybill-Delivery";

/// JSON body sent to subscribers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<'a> {
    pub event: &'a str,
    pub data: &'a Value,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderUuid>,
}

impl<'a> Envelope<'a> {
    #[must_use]
    pub fn for_event(event: &'a OrderEvent, timestamp: Timestamp) -> Self {
        Self {
            event: event.kind.as_str(),
            data: &event.data,
            timestamp,
            order_id: event.order,
        }
    }
}

/// Signature header value for `body`: `sha256=<hex hmac>`.
///
/// # Errors
///
/// Returns an error if the secret is rejected as an HMAC key.
pub fn sign(secret: &SigningSecret, body: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose().as_bytes())?;

    mac.update(body);

    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::domain::{
        notifications::events::EventKind, tenants::records::TenantUuid,
    };

    use super::*;

    #[test]
    fn signature_matches_known_vector() -> TestResult {
        // RFC 4231 test case 2.
        let secret = SigningSecret::new("Jefe");

        assert_eq!(
            sign(&secret, b"what do ya want for nothing?")?,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );

        Ok(())
    }

    #[test]
    fn envelope_uses_wire_field_names() -> TestResult {
        let order = OrderUuid::new();
        let event = OrderEvent {
            kind: EventKind::Dispatched,
            tenant: TenantUuid::new(),
            order: Some(order),
            data: serde_json::json!({ "order": { "reference": "ORD-1" } }),
        };

        let body = serde_json::to_value(Envelope::for_event(&event, Timestamp::UNIX_EPOCH))?;

        assert_eq!(body["event"], "order.dispatched");
        assert_eq!(body["orderId"], order.to_string());
        assert_eq!(body["timestamp"], "1970-01-01T00:00:00Z");
        assert_eq!(body["data"]["order"]["reference"], "ORD-1");

        Ok(())
    }

    #[test]
    fn order_id_is_omitted_when_absent() -> TestResult {
        let event = OrderEvent {
            kind: EventKind::Failed,
            tenant: TenantUuid::new(),
            order: None,
            data: Value::Null,
        };

        let body = serde_json::to_value(Envelope::for_event(&event, Timestamp::UNIX_EPOCH))?;

        assert!(body.get("orderId").is_none());

        Ok(())
    }
}
