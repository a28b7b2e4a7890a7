use thiserror::Error;

use crate::db_types::{
    Inbound,
    NewLineItem,
    NewOrder,
    NewProvisionedClient,
    Order,
    OrderId,
    OrderLineItem,
    OrderStatus,
    Plan,
    ProvisionedClient,
    ServerRecord,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not initialize database. {0}")]
    Initialization(String),
    #[error("Order [{0}] does not exist")]
    OrderNotFound(OrderId),
    #[error("Plan {0} does not exist")]
    PlanNotFound(i64),
    #[error("Server {0} does not exist or is inactive")]
    ServerNotFound(i64),
    #[error("No active inbound with capacity for {0} on server {1}")]
    NoInboundAvailable(String, i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::DatabaseError(e.to_string())
    }
}

/// Order, catalog and provisioning-record storage.
///
/// The contract that makes the pipeline safe under at-least-once delivery lives here:
/// [`mark_order_paid`](PipelineDatabase::mark_order_paid) must be a single atomic conditional update, and
/// [`insert_provisioned_client`](PipelineDatabase::insert_provisioned_client) must reject a duplicate
/// `(line_item_id, unit_index)` pair rather than create a second credential.
#[allow(async_fn_in_trait)]
pub trait PipelineDatabase: Clone + Send + Sync + 'static {
    /// Creates a new order with its line items. Payment status starts at `Pending`, order status at `New`.
    async fn insert_order(&self, order: NewOrder, items: &[NewLineItem]) -> Result<Order, PipelineError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError>;

    /// Flips the order from `Pending` to `Paid` in one conditional update, recording the gateway reference.
    /// Returns the updated order if this call won the transition, or `None` if the order was not in `Pending`
    /// (already paid, refunded, or failed). Exactly one concurrent caller sees `Some`.
    async fn mark_order_paid(&self, order_id: &OrderId, external_ref: &str) -> Result<Option<Order>, PipelineError>;

    async fn update_order_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<Order, PipelineError>;

    async fn fetch_line_items(&self, order: &Order) -> Result<Vec<OrderLineItem>, PipelineError>;

    async fn fetch_plan(&self, plan_id: i64) -> Result<Plan, PipelineError>;

    async fn fetch_server(&self, server_id: i64) -> Result<ServerRecord, PipelineError>;

    /// Picks an active inbound for the protocol on the server, preferring the least-loaded one with spare
    /// capacity.
    async fn select_inbound(&self, server_id: i64, protocol: ppg_common::Protocol) -> Result<Inbound, PipelineError>;

    async fn increment_inbound_clients(&self, inbound_id: i64) -> Result<(), PipelineError>;

    /// Returns the provisioned record for a unit, if a previous (possibly crashed) run already completed it.
    async fn fetch_provisioned_unit(
        &self,
        line_item_id: i64,
        unit_index: i64,
    ) -> Result<Option<ProvisionedClient>, PipelineError>;

    async fn insert_provisioned_client(&self, client: NewProvisionedClient) -> Result<ProvisionedClient, PipelineError>;

    async fn fetch_clients_for_order(&self, order: &Order) -> Result<Vec<ProvisionedClient>, PipelineError>;

    /// Records a unit-level failure reason. Upserts, so a retried run overwrites the stale reason.
    async fn record_unit_failure(&self, line_item_id: i64, unit_index: i64, reason: &str) -> Result<(), PipelineError>;

    async fn clear_unit_failure(&self, line_item_id: i64, unit_index: i64) -> Result<(), PipelineError>;

    /// The customer who referred this one, if any.
    async fn fetch_referrer(&self, customer_id: &str) -> Result<Option<String>, PipelineError>;

    /// How many distinct referred customers have paid at least one order. Drives the commission tier.
    async fn count_referrals(&self, customer_id: &str) -> Result<i64, PipelineError>;
}
