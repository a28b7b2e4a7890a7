use log::*;
use panel_client::AdapterRegistry;

use crate::{
    db_types::{Order, OrderId, OrderStatus, PaymentStatus, ProvisionedClient},
    events::{EventProducers, OrderProvisionedEvent},
    provisioning::{ClientProvisioner, ClientRequest, PanelConnector, ProvisioningError, UnitFailure},
    traits::{PipelineDatabase, PipelineError},
};

/// The aggregate result of one provisioning run over an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    /// Every unit is provisioned. The order is `Completed`.
    Completed,
    /// Some units are provisioned, some failed. The order is `PartiallyFailed`; succeeded units stay live.
    PartiallyFailed,
    /// No unit succeeded in this run. The order stays in `Processing` so a retried job re-attempts everything.
    Deferred,
}

#[derive(Debug)]
pub struct OrderOutcome {
    pub order: Order,
    pub outcome: ProvisioningOutcome,
    pub clients: Vec<ProvisionedClient>,
    pub failures: Vec<UnitFailure>,
}

/// Walks a paid order line item by line item, unit by unit, and provisions each unit that does not already
/// have a record. A unit-level failure is recorded and skipped over, never allowed to abort the run: the
/// other units of the order still deserve their credentials.
pub struct ProvisioningOrchestrator<B, C: PanelConnector> {
    db: B,
    connector: C,
    provisioner: ClientProvisioner<B>,
    producers: EventProducers,
}

impl<B, C> ProvisioningOrchestrator<B, C>
where
    B: PipelineDatabase,
    C: PanelConnector,
{
    pub fn new(db: B, connector: C, adapters: AdapterRegistry, producers: EventProducers) -> Self {
        let provisioner = ClientProvisioner::new(db.clone(), adapters);
        Self { db, connector, provisioner, producers }
    }

    pub async fn provision_order(&self, order_id: &OrderId) -> Result<OrderOutcome, ProvisioningError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| PipelineError::OrderNotFound(order_id.clone()))?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(ProvisioningError::OrderNotProvisionable(
                order_id.as_str().to_string(),
                format!("payment status is {}", order.payment_status),
            ));
        }
        info!("🛠️ Provisioning order {} ({})", order.order_id, order.status);

        let mut clients = Vec::new();
        let mut failures = Vec::new();
        let items = self.db.fetch_line_items(&order).await?;
        // An order with no line items is malformed. Failing loudly parks the job after its retry budget
        // instead of marking an empty order Completed.
        if items.is_empty() {
            return Err(ProvisioningError::OrderNotProvisionable(
                order_id.as_str().to_string(),
                "order has no line items".to_string(),
            ));
        }
        for item in &items {
            match self.provision_line_item(item.id, item.plan_id, item.quantity, &mut clients, &mut failures).await
            {
                Ok(()) => {},
                Err(e) => {
                    // Item-level failure (no plan, no server, no inbound, no session). Every unprovisioned
                    // unit of the item gets the same recorded reason.
                    let reason = e.to_string();
                    warn!("🛠️ Line item {} of order {} failed as a whole: {reason}", item.id, order.order_id);
                    for unit_index in 0..item.quantity {
                        if self.db.fetch_provisioned_unit(item.id, unit_index).await?.is_some() {
                            continue;
                        }
                        self.db.record_unit_failure(item.id, unit_index, &reason).await?;
                        failures.push(UnitFailure { line_item_id: item.id, unit_index, reason: reason.clone() });
                    }
                },
            }
        }

        let outcome = match (clients.is_empty(), failures.is_empty()) {
            (_, true) => ProvisioningOutcome::Completed,
            (false, false) => ProvisioningOutcome::PartiallyFailed,
            (true, false) => ProvisioningOutcome::Deferred,
        };
        let order = match outcome {
            ProvisioningOutcome::Completed => {
                self.db.update_order_status(order_id, OrderStatus::Completed).await?
            },
            ProvisioningOutcome::PartiallyFailed => {
                self.db.update_order_status(order_id, OrderStatus::PartiallyFailed).await?
            },
            // Total failure: the order stays in Processing and the job retry loop re-attempts all units.
            ProvisioningOutcome::Deferred => order,
        };
        info!(
            "🛠️ Order {} provisioning finished: {} unit(s) live, {} failed ({:?})",
            order.order_id,
            clients.len(),
            failures.len(),
            outcome
        );
        self.publish_order_provisioned(&order, &clients, failures.len()).await;
        Ok(OrderOutcome { order, outcome, clients, failures })
    }

    /// Provisions every outstanding unit of one line item. Unit failures are recorded and collected; an
    /// error return means the item could not be attempted at all.
    async fn provision_line_item(
        &self,
        line_item_id: i64,
        plan_id: i64,
        quantity: i64,
        clients: &mut Vec<ProvisionedClient>,
        failures: &mut Vec<UnitFailure>,
    ) -> Result<(), ProvisioningError> {
        let plan = self.db.fetch_plan(plan_id).await?;
        let server = self.db.fetch_server(plan.server_id).await?;
        let inbound = self.db.select_inbound(server.id, plan.protocol).await?;
        let api = self.connector.connect(&server)?;
        for unit_index in 0..quantity {
            // Crash-safe resume: a unit that already has a record was completed by a previous run.
            if let Some(existing) = self.db.fetch_provisioned_unit(line_item_id, unit_index).await? {
                debug!("🛠️ Unit {unit_index} of item {line_item_id} already provisioned. Skipping");
                clients.push(existing);
                continue;
            }
            let request = ClientRequest {
                line_item_id,
                unit_index,
                plan: plan.clone(),
                inbound: inbound.clone(),
                sub_host: server.sub_host.clone(),
            };
            match self.provisioner.provision(&api, &request).await {
                Ok(client) => {
                    self.db.clear_unit_failure(line_item_id, unit_index).await?;
                    clients.push(client);
                },
                Err(e) => {
                    let reason = e.to_string();
                    warn!("🛠️ Unit {unit_index} of item {line_item_id} failed: {reason}");
                    self.db.record_unit_failure(line_item_id, unit_index, &reason).await?;
                    failures.push(UnitFailure { line_item_id, unit_index, reason });
                },
            }
        }
        Ok(())
    }

    async fn publish_order_provisioned(&self, order: &Order, clients: &[ProvisionedClient], failed: usize) {
        let event = OrderProvisionedEvent::new(order.clone(), clients.to_vec(), failed);
        for producer in &self.producers.order_provisioned_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}
