mod common;

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use common::FakeDatabase;
use ppg_common::Money;
use provisioning_engine::{
    db_types::{NewLineItem, NewOrder, OrderId},
    events::{EventHooks, EventProducers},
    traits::InMemoryKvStore,
    MarkPaidOutcome,
    OrderFlowApi,
};

fn new_order(order_id: &str, customer: &str, cents: i64) -> NewOrder {
    NewOrder::new(OrderId(order_id.to_string()), customer.to_string(), Money::from_cents(cents))
}

#[tokio::test]
async fn duplicate_confirmations_settle_exactly_once() {
    let db = FakeDatabase::new();
    db.add_customer("bob", None);
    db.add_customer("alice", Some("bob"));
    let api = OrderFlowApi::new(db.clone(), InMemoryKvStore::new(), EventProducers::default());
    let order =
        api.insert_order(new_order("ord-1", "alice", 10_000), &[NewLineItem { plan_id: 1, quantity: 2 }]).await.unwrap();

    let first = api.mark_paid(&order.order_id, "pay-77").await.unwrap();
    assert!(matches!(first, MarkPaidOutcome::Paid(_)));
    let second = api.mark_paid(&order.order_id, "pay-77").await.unwrap();
    assert!(matches!(second, MarkPaidOutcome::AlreadyPaid(_)));
    let third = api.mark_paid(&order.order_id, "pay-78").await.unwrap();
    assert!(matches!(third, MarkPaidOutcome::AlreadyPaid(_)));

    // One job, one referral credit, no matter how many times the gateway repeats itself
    assert_eq!(db.active_jobs(), 1);
    let credits = db.referral_credits();
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].customer_id, "bob");
    // bob has 1 referral: base tier, 100bp of $100.00
    assert_eq!(credits[0].amount, Money::from_cents(100));
}

#[tokio::test]
async fn orders_without_a_referrer_earn_no_commission() {
    let db = FakeDatabase::new();
    db.add_customer("carol", None);
    let api = OrderFlowApi::new(db.clone(), InMemoryKvStore::new(), EventProducers::default());
    let order = api.insert_order(new_order("ord-2", "carol", 5_000), &[]).await.unwrap();
    api.mark_paid(&order.order_id, "pay-1").await.unwrap();
    assert!(db.referral_credits().is_empty());
}

#[tokio::test]
async fn signups_that_never_paid_do_not_raise_the_tier() {
    let db = FakeDatabase::new();
    db.add_customer("bob", None);
    // Five referred signups with no paid orders: they must not count towards the tier
    for n in 0..5 {
        db.add_customer(&format!("lurker-{n}"), Some("bob"));
    }
    db.add_customer("alice", Some("bob"));
    let api = OrderFlowApi::new(db.clone(), InMemoryKvStore::new(), EventProducers::default());
    let order = api.insert_order(new_order("ord-tier", "alice", 10_000), &[]).await.unwrap();
    api.mark_paid(&order.order_id, "pay-9").await.unwrap();

    // Only alice qualifies, so bob stays on the base tier: 100bp of $100.00
    let credits = db.referral_credits();
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].amount, Money::from_cents(100));
}

#[tokio::test]
async fn self_referral_earns_nothing() {
    let db = FakeDatabase::new();
    db.add_customer("eve", Some("eve"));
    let api = OrderFlowApi::new(db.clone(), InMemoryKvStore::new(), EventProducers::default());
    let order = api.insert_order(new_order("ord-self", "eve", 10_000), &[]).await.unwrap();
    api.mark_paid(&order.order_id, "pay-10").await.unwrap();
    assert!(db.referral_credits().is_empty());
}

#[tokio::test]
async fn unknown_orders_are_rejected() {
    let db = FakeDatabase::new();
    let api = OrderFlowApi::new(db, InMemoryKvStore::new(), EventProducers::default());
    let err = api.mark_paid(&OrderId("ghost".into()), "pay-1").await.unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn payment_event_is_published_once() {
    let db = FakeDatabase::new();
    db.add_customer("alice", None);
    let count = Arc::new(AtomicUsize::new(0));
    let c2 = count.clone();
    let mut hooks = EventHooks::default();
    hooks.on_payment_received(move |ev| {
        let count = c2.clone();
        Box::pin(async move {
            assert_eq!(ev.order.order_id.as_str(), "ord-3");
            count.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = provisioning_engine::events::EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    let handler = handlers.on_payment_received.unwrap();

    let api = OrderFlowApi::new(db, InMemoryKvStore::new(), producers);
    let order = api.insert_order(new_order("ord-3", "alice", 999), &[]).await.unwrap();
    api.mark_paid(&order.order_id, "pay-1").await.unwrap();
    api.mark_paid(&order.order_id, "pay-1").await.unwrap();
    drop(api);

    handler.start_handler().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
