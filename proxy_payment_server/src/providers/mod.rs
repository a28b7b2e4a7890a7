//! Payment gateway integrations.
//!
//! Each provider module turns its gateway's callback format into a verified [`PaymentEvent`]; the routes then
//! drive the order flow with it. Verification always happens before any state is touched: an IPN body is
//! checked against its HMAC signature, a redirect callback is checked against the gateway's verify endpoint.

pub mod nowpayments;
pub mod zarinpal;

use ppg_common::Money;
use provisioning_engine::db_types::OrderId;

/// A gateway-agnostic, verified "this order has been paid" notification.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub order_id: OrderId,
    /// The gateway-side payment identifier, stored on the order as its external reference.
    pub external_ref: String,
    pub amount: Money,
    pub currency: String,
}
