use crate::db_types::{Order, ProvisionedClient};

/// Fired exactly once per order, when the order wins its Pending→Paid transition.
#[derive(Debug, Clone)]
pub struct PaymentReceivedEvent {
    pub order: Order,
}

impl PaymentReceivedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired when a provisioning run for an order finishes, whether fully or partially.
#[derive(Debug, Clone)]
pub struct OrderProvisionedEvent {
    pub order: Order,
    pub clients: Vec<ProvisionedClient>,
    pub failed_units: usize,
}

impl OrderProvisionedEvent {
    pub fn new(order: Order, clients: Vec<ProvisionedClient>, failed_units: usize) -> Self {
        Self { order, clients, failed_units }
    }

    pub fn is_complete(&self) -> bool {
        self.failed_units == 0
    }
}
