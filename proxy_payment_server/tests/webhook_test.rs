//! End-to-end webhook tests: a signed IPN against a real (in-memory) database, through the actual route
//! handlers.
use actix_web::{http::StatusCode, test, web, App};
use ppg_common::{Money, Secret};
use proxy_payment_server::{
    config::{NowPaymentsConfig, ServerConfig},
    data_objects::JsonResponse,
    providers::{nowpayments, zarinpal::ZarinpalClient},
    routes::{health, nowpayments_webhook, zarinpal_callback, OrderFlow},
};
use provisioning_engine::{
    db_types::{NewLineItem, NewOrder, OrderId, PaymentStatus},
    events::EventProducers,
    traits::{InMemoryKvStore, JobQueue, PipelineDatabase},
    SqliteDatabase,
};

const IPN_SECRET: &str = "test-ipn-secret";

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::new("127.0.0.1", 0);
    config.nowpayments =
        NowPaymentsConfig { ipn_secret: Secret::new(IPN_SECRET.to_string()), signature_checks: true };
    config
}

async fn seeded_db() -> SqliteDatabase {
    let db = SqliteDatabase::new("sqlite::memory:", 1).await.unwrap();
    db.insert_order(
        NewOrder::new(OrderId("ord-42".to_string()), "alice".to_string(), Money::from_cents(1_999)),
        &[NewLineItem { plan_id: 1, quantity: 1 }],
    )
    .await
    .unwrap();
    db
}

fn ipn_body(status: &str) -> String {
    format!(
        r#"{{"payment_id": 5077125931, "payment_status": "{status}", "order_id": "ord-42", "price_amount": 19.99, "price_currency": "usd"}}"#
    )
}

macro_rules! test_app {
    ($db:expr) => {{
        let order_flow = OrderFlow::new($db.clone(), InMemoryKvStore::new(), EventProducers::default());
        test::init_service(
            App::new()
                .app_data(web::Data::new(order_flow))
                .app_data(web::Data::new(test_config()))
                .app_data(web::Data::new(ZarinpalClient::new(test_config().zarinpal)))
                .service(health)
                .service(nowpayments_webhook)
                .service(zarinpal_callback),
        )
        .await
    }};
}

#[actix_web::test]
async fn signed_ipn_settles_the_order() {
    let db = seeded_db().await;
    let app = test_app!(&db);
    let body = ipn_body("finished");
    let sig = nowpayments::sign(IPN_SECRET, body.as_bytes()).unwrap();

    let req = test::TestRequest::post()
        .uri("/webhook/nowpayments")
        .insert_header(("x-nowpayments-sig", sig.clone()))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let result: JsonResponse = test::read_body_json(resp).await;
    assert!(result.success);

    let order = db.fetch_order_by_order_id(&OrderId("ord-42".into())).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.external_ref.as_deref(), Some("5077125931"));

    // A replayed delivery still answers 200 and leaves exactly one job behind
    let req = test::TestRequest::post()
        .uri("/webhook/nowpayments")
        .insert_header(("x-nowpayments-sig", sig))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(db.claim_next_job().await.unwrap().is_some());
    assert!(db.claim_next_job().await.unwrap().is_none());
}

#[actix_web::test]
async fn unsigned_ipn_is_forbidden() {
    let db = seeded_db().await;
    let app = test_app!(&db);
    let req = test::TestRequest::post().uri("/webhook/nowpayments").set_payload(ipn_body("finished")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let order = db.fetch_order_by_order_id(&OrderId("ord-42".into())).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[actix_web::test]
async fn badly_signed_ipn_is_forbidden() {
    let db = seeded_db().await;
    let app = test_app!(&db);
    let body = ipn_body("finished");
    let sig = nowpayments::sign("wrong-secret", body.as_bytes()).unwrap();
    let req = test::TestRequest::post()
        .uri("/webhook/nowpayments")
        .insert_header(("x-nowpayments-sig", sig))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn non_final_statuses_do_not_settle() {
    let db = seeded_db().await;
    let app = test_app!(&db);
    let body = ipn_body("waiting");
    let sig = nowpayments::sign(IPN_SECRET, body.as_bytes()).unwrap();
    let req = test::TestRequest::post()
        .uri("/webhook/nowpayments")
        .insert_header(("x-nowpayments-sig", sig))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let order = db.fetch_order_by_order_id(&OrderId("ord-42".into())).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(db.claim_next_job().await.unwrap().is_none());
}

#[actix_web::test]
async fn cancelled_zarinpal_redirects_do_not_settle() {
    let db = seeded_db().await;
    let app = test_app!(&db);
    let req = test::TestRequest::get()
        .uri("/webhook/zarinpal?Authority=A000123&Status=NOK&order_id=ord-42")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let result: JsonResponse = test::read_body_json(resp).await;
    assert!(!result.success);
    let order = db.fetch_order_by_order_id(&OrderId("ord-42".into())).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[actix_web::test]
async fn health_endpoint_responds() {
    let db = seeded_db().await;
    let app = test_app!(&db);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
