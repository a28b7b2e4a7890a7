//! The traits a storage backend must implement to drive the pipeline.
//!
//! [`PipelineDatabase`] covers orders, catalog lookups and provisioning records; [`WalletLedger`] is the
//! append-only wallet; [`JobQueue`] is the durable provisioning queue; [`KeyValueStore`] is the short-TTL
//! guard used to dedupe dispatches. The SQLite backend implements the first three on one pool; the KV guard
//! ships with an in-memory implementation since it only needs to outlive a webhook retry burst.

mod job_queue;
mod kv_store;
mod pipeline_database;
mod wallet_ledger;

pub use job_queue::{JobQueue, JobStatus, ProvisioningJob};
pub use kv_store::{InMemoryKvStore, KeyValueStore, KvError};
pub use pipeline_database::{PipelineDatabase, PipelineError};
pub use wallet_ledger::{WalletError, WalletLedger};
