//! The provisioning pipeline: from a paid order to live credentials on the panels.
//!
//! [`ClientProvisioner`] handles one unit (one client on one inbound); [`ProvisioningOrchestrator`] walks a
//! whole order, skipping units a previous run already completed, and decides the order's final status from
//! the per-unit results.

mod orchestrator;
mod provisioner;

use panel_client::PanelClientError;
use thiserror::Error;

use crate::traits::PipelineError;

pub use orchestrator::{OrderOutcome, ProvisioningOrchestrator, ProvisioningOutcome};
pub use provisioner::{ClientProvisioner, ClientRequest, HttpPanelConnector, PanelConnector};

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Panel error: {0}")]
    Panel(#[from] PanelClientError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Order {0} cannot be provisioned: {1}")]
    OrderNotProvisionable(String, String),
}

/// One unit that could not be provisioned in this run, with the reason that was persisted for it.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub line_item_id: i64,
    pub unit_index: i64,
    pub reason: String,
}
