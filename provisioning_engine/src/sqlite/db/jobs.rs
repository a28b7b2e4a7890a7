use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::OrderId,
    traits::{PipelineError, ProvisioningJob},
};

/// Enqueues a job unless an active (`Queued` or `Running`) one already exists for the order. A conditional
/// insert backed by the partial unique index, so concurrent dispatchers cannot double-queue.
pub async fn enqueue(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<ProvisioningJob>, PipelineError> {
    let job = sqlx::query_as(
        r#"
            INSERT INTO provisioning_jobs (order_id)
            SELECT $1
            WHERE NOT EXISTS (
                SELECT 1 FROM provisioning_jobs WHERE order_id = $1 AND status IN ('Queued', 'Running')
            )
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(job)
}

/// Claims the oldest queued job, flipping it to `Running` in the same statement. The single UPDATE makes the
/// claim exclusive without explicit locking.
pub async fn claim_next_job(conn: &mut SqliteConnection) -> Result<Option<ProvisioningJob>, PipelineError> {
    let job: Option<ProvisioningJob> = sqlx::query_as(
        r#"
            UPDATE provisioning_jobs
            SET status = 'Running', attempts = attempts + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = (
                SELECT id FROM provisioning_jobs WHERE status = 'Queued' ORDER BY created_at ASC, id ASC LIMIT 1
            )
            RETURNING *;
        "#,
    )
    .fetch_optional(conn)
    .await?;
    if let Some(job) = &job {
        debug!("📝️ Claimed provisioning job {} for order [{}] (attempt {})", job.id, job.order_id, job.attempts);
    }
    Ok(job)
}

pub async fn complete_job(job_id: i64, conn: &mut SqliteConnection) -> Result<(), PipelineError> {
    sqlx::query("UPDATE provisioning_jobs SET status = 'Done', updated_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(job_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Returns the job to the queue for another attempt, or parks it in `Failed` once the attempt budget is spent.
pub async fn fail_job(
    job_id: i64,
    error: &str,
    max_attempts: i64,
    conn: &mut SqliteConnection,
) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
            UPDATE provisioning_jobs
            SET status = CASE WHEN attempts >= $3 THEN 'Failed' ELSE 'Queued' END,
                last_error = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1;
        "#,
    )
    .bind(job_id)
    .bind(error)
    .bind(max_attempts)
    .execute(conn)
    .await?;
    Ok(())
}
