//! Payment webhook server for the proxy storefront.
//!
//! Receives payment gateway callbacks (NowPayments-style IPNs and ZarinPal-style redirect verifications),
//! verifies their authenticity, and hands confirmed payments to the provisioning engine's order flow. A
//! background worker drains the provisioning job queue against the remote panels.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod providers;
pub mod routes;
pub mod server;
pub mod worker;
