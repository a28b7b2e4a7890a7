//! NowPayments-style IPN verification.
//!
//! The gateway signs each IPN by serializing the payload with its keys sorted recursively, then computing an
//! HMAC-SHA512 over that canonical form with the merchant's IPN secret. The hex digest arrives in the
//! `x-nowpayments-sig` header. Verification must reproduce the canonical form from the raw body; the struct
//! fields below are only read after the signature has checked out.

use hmac::{Hmac, Mac};
use log::warn;
use ppg_common::Money;
use provisioning_engine::db_types::OrderId;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha512;

use crate::{errors::ServerError, providers::PaymentEvent};

pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// The slice of the IPN payload the pipeline cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct IpnPayload {
    pub payment_id: i64,
    pub payment_status: String,
    pub order_id: String,
    pub price_amount: f64,
    pub price_currency: String,
    #[serde(default)]
    pub pay_currency: Option<String>,
}

impl IpnPayload {
    /// Only a `finished` payment covers the order. Everything else is an informational status update.
    pub fn is_paid(&self) -> bool {
        self.payment_status == "finished"
    }

    pub fn into_event(self) -> PaymentEvent {
        PaymentEvent {
            order_id: OrderId(self.order_id),
            external_ref: self.payment_id.to_string(),
            amount: Money::from_major_units(self.price_amount),
            currency: self.price_currency.to_uppercase(),
        }
    }
}

/// Serializes `value` with object keys sorted recursively, reproducing the form the gateway signed.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        },
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        },
        other => other.to_string(),
    }
}

pub fn sign(secret: &str, raw_body: &[u8]) -> Result<String, ServerError> {
    let value: Value = serde_json::from_slice(raw_body)
        .map_err(|e| ServerError::CouldNotDeserializePayload(e.to_string()))?;
    let canonical = canonical_json(&value);
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|e| ServerError::ConfigurationError(format!("Invalid IPN secret: {e}")))?;
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies the signature header against the raw request body. Comparison happens inside the MAC so it is
/// constant-time.
pub fn verify_signature(secret: &str, raw_body: &[u8], signature: &str) -> Result<(), ServerError> {
    let value: Value = serde_json::from_slice(raw_body)
        .map_err(|e| ServerError::CouldNotDeserializePayload(e.to_string()))?;
    let canonical = canonical_json(&value);
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|e| ServerError::ConfigurationError(format!("Invalid IPN secret: {e}")))?;
    mac.update(canonical.as_bytes());
    let provided = hex::decode(signature.trim()).map_err(|_| {
        warn!("🔐️ IPN signature header is not valid hex");
        ServerError::InvalidSignature
    })?;
    mac.verify_slice(&provided).map_err(|_| ServerError::InvalidSignature)
}

pub fn parse_payload(raw_body: &[u8]) -> Result<IpnPayload, ServerError> {
    serde_json::from_slice(raw_body).map_err(|e| ServerError::CouldNotDeserializePayload(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &str = "ipn-secret-key";

    fn sample_body() -> String {
        r#"{
            "payment_id": 5077125931,
            "payment_status": "finished",
            "order_id": "ord-42",
            "price_amount": 19.99,
            "price_currency": "usd",
            "pay_currency": "trx",
            "outcome": {"b": 2, "a": 1}
        }"#
        .to_string()
    }

    #[test]
    fn signature_round_trips() {
        let body = sample_body();
        let sig = sign(SECRET, body.as_bytes()).unwrap();
        verify_signature(SECRET, body.as_bytes(), &sig).unwrap();
    }

    #[test]
    fn signature_is_independent_of_key_order() {
        let a = r#"{"b": 1, "a": {"y": 2, "x": 3}}"#;
        let b = r#"{"a": {"x": 3, "y": 2}, "b": 1}"#;
        assert_eq!(sign(SECRET, a.as_bytes()).unwrap(), sign(SECRET, b.as_bytes()).unwrap());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let body = sample_body();
        let sig = sign(SECRET, body.as_bytes()).unwrap();
        let tampered = body.replace("19.99", "0.01");
        let err = verify_signature(SECRET, tampered.as_bytes(), &sig).unwrap_err();
        assert!(matches!(err, ServerError::InvalidSignature));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let body = sample_body();
        let sig = sign(SECRET, body.as_bytes()).unwrap();
        let err = verify_signature("some-other-secret", body.as_bytes(), &sig).unwrap_err();
        assert!(matches!(err, ServerError::InvalidSignature));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let body = sample_body();
        assert!(matches!(
            verify_signature(SECRET, body.as_bytes(), "not hex at all").unwrap_err(),
            ServerError::InvalidSignature
        ));
    }

    #[test]
    fn canonical_form_sorts_nested_keys() {
        let value: Value = serde_json::from_str(r#"{"b": [1, {"z": 0, "a": null}], "a": "x"}"#).unwrap();
        assert_eq!(canonical_json(&value), r#"{"a":"x","b":[1,{"a":null,"z":0}]}"#);
    }

    #[test]
    fn payload_parses_and_gates_on_status() {
        let payload = parse_payload(sample_body().as_bytes()).unwrap();
        assert!(payload.is_paid());
        let event = payload.into_event();
        assert_eq!(event.order_id.as_str(), "ord-42");
        assert_eq!(event.external_ref, "5077125931");
        assert_eq!(event.amount, Money::from_cents(1_999));
        assert_eq!(event.currency, "USD");

        let waiting = sample_body().replace("finished", "waiting");
        assert!(!parse_payload(waiting.as_bytes()).unwrap().is_paid());
    }
}
