use std::{future::Future, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use panel_client::AdapterRegistry;
use ppg_common::Protocol;
use provisioning_engine::{
    events::{EventHandlers, EventHooks, EventProducers, OrderProvisionedEvent, PaymentReceivedEvent},
    traits::InMemoryKvStore,
    OrderFlowApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    providers::zarinpal::ZarinpalClient,
    routes::{health, nowpayments_webhook, zarinpal_callback},
    worker::start_provisioning_worker,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    // Every protocol the catalogue can reference must have an adapter; fail at startup, not mid-order.
    AdapterRegistry::with_defaults()
        .validate(Protocol::ALL)
        .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let db = SqliteDatabase::new(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let handlers = EventHandlers::new(100, notification_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    start_provisioning_worker(db.clone(), producers.clone(), config.worker);
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    // One guard store shared by every server worker, so duplicate webhooks are deduped process-wide
    let kv = InMemoryKvStore::new();
    let zarinpal = ZarinpalClient::new(config.zarinpal.clone());
    let srv = HttpServer::new(move || {
        let order_flow = OrderFlowApi::new(db.clone(), kv.clone(), producers.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ppg::access_log"))
            .app_data(web::Data::new(order_flow))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(zarinpal.clone()))
            .service(health)
            .service(nowpayments_webhook)
            .service(zarinpal_callback)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// The notification hooks the server ships with: structured log lines. Swap in real messaging here.
fn notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_payment_received(|ev: PaymentReceivedEvent| {
        Box::pin(async move {
            info!(
                "📬️ Payment received for order {}: {} from customer {}",
                ev.order.order_id, ev.order.total_price, ev.order.customer_id
            );
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks.on_order_provisioned(|ev: OrderProvisionedEvent| {
        Box::pin(async move {
            if ev.is_complete() {
                info!("📬️ Order {} fully provisioned: {} client(s) ready", ev.order.order_id, ev.clients.len());
            } else {
                warn!(
                    "📬️ Order {} partially provisioned: {} ready, {} failed",
                    ev.order.order_id,
                    ev.clients.len(),
                    ev.failed_units
                );
            }
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}
