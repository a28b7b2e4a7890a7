//! ZarinPal-style redirect verification.
//!
//! This gateway does not push signed notifications. Instead the customer is redirected back to the
//! storefront with an `Authority` token, and the server must call the gateway's verify endpoint to learn
//! whether the payment actually settled. Code 100 means verified now; code 101 means this authority was
//! already verified earlier, which a replayed callback will produce. Both are treated as proof of payment;
//! the order flow's own idempotency absorbs the replay.

use log::*;
use ppg_common::Money;
use serde_json::{json, Value};

use crate::{config::ZarinpalConfig, errors::ServerError};

pub const CODE_VERIFIED: i64 = 100;
pub const CODE_ALREADY_VERIFIED: i64 = 101;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified { ref_id: i64 },
    AlreadyVerified { ref_id: i64 },
}

impl VerifyOutcome {
    pub fn ref_id(&self) -> i64 {
        match self {
            VerifyOutcome::Verified { ref_id } | VerifyOutcome::AlreadyVerified { ref_id } => *ref_id,
        }
    }
}

#[derive(Clone)]
pub struct ZarinpalClient {
    config: ZarinpalConfig,
    client: reqwest::Client,
}

impl ZarinpalClient {
    pub fn new(config: ZarinpalConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    /// Confirms a payment authority against the gateway. The amount must match what the payment request was
    /// created with, so it comes from the stored order, never from the callback.
    pub async fn verify(&self, authority: &str, amount: Money) -> Result<VerifyOutcome, ServerError> {
        let body = json!({
            "merchant_id": self.config.merchant_id,
            "amount": amount.value(),
            "authority": authority,
        });
        trace!("🔐️ Verifying payment authority {authority}");
        let response = self
            .client
            .post(&self.config.verify_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServerError::PaymentVerification(format!("Verify call failed: {e}")))?;
        let envelope: Value =
            response.json().await.map_err(|e| ServerError::PaymentVerification(format!("Bad verify response: {e}")))?;
        parse_verify_response(&envelope)
    }
}

pub fn parse_verify_response(envelope: &Value) -> Result<VerifyOutcome, ServerError> {
    let code = envelope
        .pointer("/data/code")
        .and_then(Value::as_i64)
        .ok_or_else(|| verification_error(envelope))?;
    let ref_id = envelope.pointer("/data/ref_id").and_then(Value::as_i64).unwrap_or_default();
    match code {
        CODE_VERIFIED => Ok(VerifyOutcome::Verified { ref_id }),
        CODE_ALREADY_VERIFIED => {
            debug!("🔐️ Authority was already verified (ref {ref_id})");
            Ok(VerifyOutcome::AlreadyVerified { ref_id })
        },
        other => Err(ServerError::PaymentVerification(format!("Gateway returned code {other}"))),
    }
}

fn verification_error(envelope: &Value) -> ServerError {
    let detail = envelope
        .pointer("/errors/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| envelope.get("errors").map(Value::to_string).unwrap_or_default());
    ServerError::PaymentVerification(format!("Gateway rejected the authority. {detail}"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn code_100_is_verified() {
        let envelope: Value = serde_json::from_str(
            r#"{"data": {"code": 100, "message": "Paid", "ref_id": 201029392, "fee": 0}, "errors": []}"#,
        )
        .unwrap();
        assert_eq!(parse_verify_response(&envelope).unwrap(), VerifyOutcome::Verified { ref_id: 201029392 });
    }

    #[test]
    fn code_101_is_already_verified() {
        let envelope: Value =
            serde_json::from_str(r#"{"data": {"code": 101, "message": "Verified", "ref_id": 201029392}, "errors": []}"#)
                .unwrap();
        assert_eq!(parse_verify_response(&envelope).unwrap(), VerifyOutcome::AlreadyVerified { ref_id: 201029392 });
    }

    #[test]
    fn error_envelopes_are_rejected() {
        let envelope: Value = serde_json::from_str(
            r#"{"data": [], "errors": {"code": -51, "message": "Session is not in success status"}}"#,
        )
        .unwrap();
        let err = parse_verify_response(&envelope).unwrap_err();
        assert!(err.to_string().contains("Session is not in success status"));
    }

    #[test]
    fn unexpected_codes_are_rejected() {
        let envelope: Value = serde_json::from_str(r#"{"data": {"code": -50, "ref_id": 0}, "errors": []}"#).unwrap();
        assert!(parse_verify_response(&envelope).is_err());
    }
}
