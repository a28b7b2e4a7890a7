//! Proxy Provisioning Engine
//!
//! The engine owns everything that happens between "a payment gateway says this order is paid" and "the customer
//! holds working proxy credentials":
//!
//! 1. The order state machine ([`OrderFlowApi`]): the Pending→Paid transition fires exactly once, and every side
//!    effect hanging off it (provisioning dispatch, referral commission, notification event) is itself idempotent,
//!    so at-least-once webhook delivery is safe without distributed transactions.
//! 2. The provisioning pipeline ([`provisioning`]): a durable job queue feeds the orchestrator, which walks an
//!    order's line items unit by unit, resolves a matching inbound, and has the [`provisioning::ClientProvisioner`]
//!    issue credentials on the remote panel.
//! 3. The referral commission calculator ([`referral`]): a tiered percentage of the paid amount, credited to the
//!    referrer's wallet at most once per order.
//!
//! Backends implement the traits in [`traits`]; SQLite is the shipped implementation.

pub mod db_types;
pub mod events;
pub mod order_flow;
pub mod provisioning;
pub mod referral;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use order_flow::{dispatch_key, MarkPaidOutcome, OrderFlowApi, DISPATCH_GUARD_TTL};
pub use provisioning::{
    ClientProvisioner,
    ClientRequest,
    HttpPanelConnector,
    OrderOutcome,
    PanelConnector,
    ProvisioningError,
    ProvisioningOrchestrator,
    ProvisioningOutcome,
    UnitFailure,
};
pub use referral::ReferralApi;
