//! Tix ESB Integration Service
//!
//! Runs the topic workers and the outbound case-sync reconciler. Exits with
//! an error when a topic worker gives up so the supervisor can restart it.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tix_case_workflow::sync::MettriqClient;
use tix_case_workflow::{CaseServices, Stores};
use tix_database::initialize_databases;
use tix_utils::{init_logging, AppConfig, TixResult};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        AppConfig::default()
    });

    init_logging(&config.logging, "tix-esb-integration")?;
    info!(instance_id = %config.server.instance_id, "Starting Tix ESB Integration Service");

    let (postgres_pool, redis_pool) = initialize_databases(&config.database)
        .await
        .context("database initialization")?;

    let client = MettriqClient::new(
        config.integration.mettriq_server.clone(),
        std::time::Duration::from_secs(config.integration.request_timeout_seconds),
    )?;
    let services = CaseServices::new(&config, Stores::postgres(postgres_pool, redis_pool), Arc::new(client));

    let cancel = CancellationToken::new();
    let sync_job = services.spawn_sync_job(&cancel);

    let mut workers: JoinSet<TixResult<()>> = JoinSet::new();
    #[cfg(feature = "kafka")]
    {
        let connector = Arc::new(tix_esb_integration::kafka::KafkaConnector::new(&config.kafka));
        tix_esb_integration::spawn_consumers(&mut workers, &services, connector, &cancel);
    }
    #[cfg(not(feature = "kafka"))]
    warn!("Built without the `kafka` feature; only the sync reconciler runs");

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            Ok(())
        }
        Some(joined) = workers.join_next() => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("topic worker failed")),
            Err(e) => Err(anyhow::Error::new(e).context("topic worker panicked")),
        },
    };

    cancel.cancel();
    while workers.join_next().await.is_some() {}
    if let Some(job) = sync_job {
        let _ = job.await;
    }
    info!("ESB integration service stopped");
    outcome
}
