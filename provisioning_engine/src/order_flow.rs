//! The order state machine and the side effects that hang off the paid transition.
//!
//! `OrderFlowApi` is the write path the payment webhooks drive. Its central guarantee: no matter how many
//! times a gateway delivers "order X is paid", the order flips from `Pending` to `Paid` exactly once, one
//! provisioning job is enqueued, one referral commission is credited, and one payment event is published.
//!
//! The transition itself is an atomic conditional update in the database. Each downstream side effect is
//! then independently idempotent (KV guard + active-job index for dispatch, partial unique index for the
//! referral credit), so a crash between the transition and a side effect is repaired by the next replayed
//! webhook or the job retry loop, never compounded by it.

use std::time::Duration;

use log::*;

use crate::{
    db_types::{NewLineItem, NewOrder, Order, OrderId, OrderStatus, PaymentStatus},
    events::{EventProducers, PaymentReceivedEvent},
    referral::ReferralApi,
    traits::{JobQueue, KeyValueStore, PipelineDatabase, PipelineError, WalletLedger},
};

/// How long a dispatch guard key lives. Long enough to absorb a webhook retry burst; short enough that a
/// lost job (crash after guard, before enqueue) is re-dispatchable within minutes.
pub const DISPATCH_GUARD_TTL: Duration = Duration::from_secs(600);

pub fn dispatch_key(order_id: &OrderId) -> String {
    format!("provisioning_dispatched:{}", order_id.as_str())
}

#[derive(Debug, Clone)]
pub enum MarkPaidOutcome {
    /// This call won the transition. Side effects were dispatched.
    Paid(Order),
    /// The order had already left `Pending`. Nothing was done.
    AlreadyPaid(Order),
}

pub struct OrderFlowApi<B, K> {
    db: B,
    kv: K,
    referrals: ReferralApi<B>,
    producers: EventProducers,
}

impl<B, K> OrderFlowApi<B, K>
where
    B: PipelineDatabase + WalletLedger + JobQueue,
    K: KeyValueStore,
{
    pub fn new(db: B, kv: K, producers: EventProducers) -> Self {
        let referrals = ReferralApi::new(db.clone());
        Self { db, kv, referrals, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Creates a new order in `Pending`/`New`.
    pub async fn insert_order(&self, order: NewOrder, items: &[NewLineItem]) -> Result<Order, PipelineError> {
        let order = self.db.insert_order(order, items).await?;
        info!("💳️ Order {} created for customer {} ({})", order.order_id, order.customer_id, order.total_price);
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    /// Marks the order paid in response to a verified gateway confirmation.
    ///
    /// The database performs the Pending→Paid flip as one conditional update; only the winning call runs the
    /// side effects. Side-effect failures are logged, not propagated: the payment is already recorded, and
    /// each effect repairs itself on the next delivery or retry.
    pub async fn mark_paid(&self, order_id: &OrderId, external_ref: &str) -> Result<MarkPaidOutcome, PipelineError> {
        match self.db.mark_order_paid(order_id, external_ref).await? {
            Some(order) => {
                info!("💳️ Order {} marked as paid (ref {external_ref})", order.order_id);
                let order = self.db.update_order_status(order_id, OrderStatus::Processing).await?;
                self.dispatch_provisioning(&order).await;
                self.credit_referrer(&order).await;
                self.publish_payment_received(order.clone()).await;
                Ok(MarkPaidOutcome::Paid(order))
            },
            None => {
                let order = self
                    .db
                    .fetch_order_by_order_id(order_id)
                    .await?
                    .ok_or_else(|| PipelineError::OrderNotFound(order_id.clone()))?;
                debug!(
                    "💳️ Order {} is already {} ({}). Duplicate confirmation ignored",
                    order.order_id, order.payment_status, order.status
                );
                debug_assert_ne!(order.payment_status, PaymentStatus::Pending);
                Ok(MarkPaidOutcome::AlreadyPaid(order))
            },
        }
    }

    /// Enqueues the provisioning job, behind a short-TTL KV guard. Both layers are idempotent, so the worst
    /// a duplicate delivery costs is one extra KV round trip.
    async fn dispatch_provisioning(&self, order: &Order) {
        let key = dispatch_key(&order.order_id);
        match self.kv.set_if_absent(&key, "dispatched", DISPATCH_GUARD_TTL).await {
            Ok(false) => {
                debug!("💳️ Provisioning for order {} was already dispatched. Skipping", order.order_id);
                return;
            },
            Ok(true) => {},
            Err(e) => {
                // The guard is an optimization. The active-job index below still dedupes.
                warn!("💳️ Dispatch guard unavailable for order {}: {e}", order.order_id);
            },
        }
        match self.db.enqueue(&order.order_id).await {
            Ok(Some(job)) => info!("🕰️ Provisioning job {} queued for order {}", job.id, order.order_id),
            Ok(None) => debug!("🕰️ An active provisioning job already exists for order {}", order.order_id),
            Err(e) => error!("🕰️ Could not enqueue provisioning for order {}: {e}", order.order_id),
        }
    }

    async fn credit_referrer(&self, order: &Order) {
        match self.referrals.credit_for_order(order).await {
            Ok(Some(amount)) => trace!("🤝️ Referral commission of {amount} posted for order {}", order.order_id),
            Ok(None) => {},
            Err(e) => error!("🤝️ Referral commission for order {} could not be posted: {e}", order.order_id),
        }
    }

    async fn publish_payment_received(&self, order: Order) {
        let event = PaymentReceivedEvent::new(order);
        for producer in &self.producers.payment_received_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}
