use std::time::Duration;

use log::*;
use panel_client::AdapterRegistry;
use provisioning_engine::{
    events::EventProducers,
    traits::{JobQueue, ProvisioningJob},
    HttpPanelConnector,
    ProvisioningOrchestrator,
    ProvisioningOutcome,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

use crate::config::WorkerConfig;

/// Starts the provisioning worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The worker drains the durable job queue: each claimed job runs the orchestrator over its order. A run that
/// provisioned nothing sends the job back to the queue (up to the attempt budget); any run that produced at
/// least one live unit completes the job, since the remaining units are recorded as unit failures on the
/// order itself.
pub fn start_provisioning_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    config: WorkerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let orchestrator =
            ProvisioningOrchestrator::new(db.clone(), HttpPanelConnector, AdapterRegistry::with_defaults(), producers);
        let mut timer = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
        info!("🕰️ Provisioning worker started (poll every {}s)", config.poll_interval_secs);
        loop {
            timer.tick().await;
            loop {
                let job = match db.claim_next_job().await {
                    Ok(Some(job)) => job,
                    Ok(None) => break,
                    Err(e) => {
                        error!("🕰️ Could not poll the job queue: {e}");
                        break;
                    },
                };
                run_job(&db, &orchestrator, job, config.max_attempts).await;
            }
        }
    })
}

async fn run_job(
    db: &SqliteDatabase,
    orchestrator: &ProvisioningOrchestrator<SqliteDatabase, HttpPanelConnector>,
    job: ProvisioningJob,
    max_attempts: i64,
) {
    info!("🕰️ Running provisioning job {} for order [{}] (attempt {})", job.id, job.order_id, job.attempts);
    let result = match orchestrator.provision_order(&job.order_id).await {
        Ok(outcome) if outcome.outcome == ProvisioningOutcome::Deferred => {
            warn!("🕰️ No units could be provisioned for order [{}]. Requeueing", job.order_id);
            db.fail_job(job.id, "no units could be provisioned", max_attempts).await
        },
        Ok(outcome) => {
            info!(
                "🕰️ Job {} finished: {} unit(s) live, {} failed",
                job.id,
                outcome.clients.len(),
                outcome.failures.len()
            );
            db.complete_job(job.id).await
        },
        Err(e) => {
            error!("🕰️ Provisioning job {} failed: {e}", job.id);
            db.fail_job(job.id, &e.to_string(), max_attempts).await
        },
    };
    if let Err(e) = result {
        error!("🕰️ Could not update job {} after its run: {e}", job.id);
    }
}
