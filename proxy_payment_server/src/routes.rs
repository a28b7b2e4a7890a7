//! Webhook route handlers.
//!
//! Gateway callbacks are verified first (signature or verify-call), and from then on the handlers always
//! answer in the 200 range: a non-2xx response makes the gateway retry, and a replayed notification cannot
//! do any harm once it reaches the idempotent order flow. Failures the gateway can do nothing about (an
//! unknown order id, say) are reported in the JSON body instead.

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use log::*;
use provisioning_engine::{traits::InMemoryKvStore, MarkPaidOutcome, OrderFlowApi, SqliteDatabase};
use serde::Deserialize;

use crate::{
    config::ServerConfig,
    data_objects::JsonResponse,
    errors::ServerError,
    providers::{
        nowpayments::{self, SIGNATURE_HEADER},
        zarinpal::ZarinpalClient,
        PaymentEvent,
    },
};

pub type OrderFlow = OrderFlowApi<SqliteDatabase, InMemoryKvStore>;

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("👍️\n")
}

#[post("/webhook/nowpayments")]
pub async fn nowpayments_webhook(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<OrderFlow>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    trace!("💳️ Received IPN callback: {}", req.uri());
    if config.nowpayments.signature_checks {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ServerError::InvalidSignature)?;
        nowpayments::verify_signature(config.nowpayments.ipn_secret.reveal(), &body, signature).map_err(|e| {
            warn!("🔐️ IPN signature verification failed: {e}");
            e
        })?;
        trace!("🔐️ IPN signature check ✅️");
    } else {
        warn!("🔐️ IPN signature checks are disabled. Accepting callback without verification.");
    }
    let result = match nowpayments::parse_payload(&body) {
        Err(e) => {
            warn!("💳️ Could not parse IPN payload. {e}");
            JsonResponse::failure(e)
        },
        Ok(payload) if !payload.is_paid() => {
            info!("💳️ Order {} payment status is '{}'. Nothing to do yet", payload.order_id, payload.payment_status);
            JsonResponse::success("Status noted.")
        },
        Ok(payload) => settle(&api, payload.into_event()).await,
    };
    Ok(HttpResponse::Ok().json(result))
}

#[derive(Debug, Deserialize)]
pub struct ZarinpalCallback {
    #[serde(rename = "Authority")]
    pub authority: String,
    #[serde(rename = "Status")]
    pub status: String,
    pub order_id: String,
}

#[get("/webhook/zarinpal")]
pub async fn zarinpal_callback(
    query: web::Query<ZarinpalCallback>,
    api: web::Data<OrderFlow>,
    gateway: web::Data<ZarinpalClient>,
) -> Result<HttpResponse, ServerError> {
    let callback = query.into_inner();
    if callback.status != "OK" {
        info!("💳️ Payment for order {} was cancelled at the gateway", callback.order_id);
        return Ok(HttpResponse::Ok().json(JsonResponse::failure("Payment was not completed.")));
    }
    // The amount to verify comes from our own record of the order, never from the redirect.
    let order_id = callback.order_id.clone().into();
    let order = api
        .fetch_order(&order_id)
        .await
        .map_err(|e| ServerError::BackendError(e.to_string()))?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {}", callback.order_id)))?;
    let outcome = gateway.verify(&callback.authority, order.total_price).await?;
    let event = PaymentEvent {
        order_id,
        external_ref: format!("zarinpal:{}", outcome.ref_id()),
        amount: order.total_price,
        currency: order.currency.clone(),
    };
    Ok(HttpResponse::Ok().json(settle(&api, event).await))
}

async fn settle(api: &OrderFlow, event: PaymentEvent) -> JsonResponse {
    match api.mark_paid(&event.order_id, &event.external_ref).await {
        Ok(MarkPaidOutcome::Paid(order)) => {
            info!("💳️ Order {} settled for {} (ref {})", order.order_id, order.total_price, event.external_ref);
            JsonResponse::success("Payment processed.")
        },
        Ok(MarkPaidOutcome::AlreadyPaid(order)) => {
            info!("💳️ Order {} was already settled. Duplicate notification ignored", order.order_id);
            JsonResponse::success("Payment already processed.")
        },
        Err(e) => {
            warn!("💳️ Could not settle order {}. {e}", event.order_id);
            JsonResponse::failure(e)
        },
    }
}
