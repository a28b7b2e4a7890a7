//! Client library for remote proxy panel servers.
//!
//! A panel server hosts the actual proxy inbounds and exposes an authenticated HTTP API for managing the clients
//! attached to them. This crate wraps that API ([`PanelClient`]), translates generic provisioning requests into the
//! protocol-specific settings each panel expects ([`protocol::ProtocolAdapter`]), and renders the subscription
//! artifacts (links and QR codes) handed to customers.

pub mod adapters;
mod api;
mod config;
mod data_objects;
mod error;
pub mod protocol;
mod qr;

pub use api::{PanelApi, PanelClient};
pub use config::PanelConfig;
pub use data_objects::{ClientTraffic, InboundSpec, PanelResponse};
pub use error::PanelClientError;
pub use protocol::{AdapterRegistry, Credential, InboundProfile, ProtocolAdapter, ProvisionRequest, RemoteClient};
pub use qr::render_qr_svg;
