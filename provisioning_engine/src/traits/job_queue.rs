use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::db_types::{OrderId, StatusConversionError};

use super::pipeline_database::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Done => write!(f, "Done"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(Self::Queued),
            "Running" => Ok(Self::Running),
            "Done" => Ok(Self::Done),
            "Failed" => Ok(Self::Failed),
            s => Err(StatusConversionError::new(s)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProvisioningJob {
    pub id: i64,
    pub order_id: OrderId,
    pub status: JobStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The durable queue that survives a process restart between "payment confirmed" and "clients provisioned".
///
/// At most one job per order may be `Queued` or `Running` at a time; `enqueue` returning `None` is how a
/// duplicate webhook delivery gets absorbed when the KV dispatch guard has already expired.
#[allow(async_fn_in_trait)]
pub trait JobQueue: Clone + Send + Sync + 'static {
    /// Enqueues a provisioning job for the order. Returns `None` if an active job already exists.
    async fn enqueue(&self, order_id: &OrderId) -> Result<Option<ProvisioningJob>, PipelineError>;

    /// Atomically claims the oldest queued job, flipping it to `Running` and bumping its attempt count.
    /// Only one worker can claim a given job.
    async fn claim_next_job(&self) -> Result<Option<ProvisioningJob>, PipelineError>;

    async fn complete_job(&self, job_id: i64) -> Result<(), PipelineError>;

    /// Records the failure. The job goes back to `Queued` for another attempt, or to `Failed` once
    /// `max_attempts` is reached.
    async fn fail_job(&self, job_id: i64, error: &str, max_attempts: i64) -> Result<(), PipelineError>;
}
