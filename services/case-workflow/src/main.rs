//! Tix Case Workflow Service
//!
//! HTTP API for case intake and stage transitions, plus the leased SLA
//! monitor and dashboard reporter loops.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tix_case_workflow::api::{create_app, AppState, HealthBackends};
use tix_case_workflow::sync::MettriqClient;
use tix_case_workflow::{CaseServices, Stores};
use tix_database::initialize_databases;
use tix_utils::{init_logging, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        AppConfig::default()
    });

    init_logging(&config.logging, "tix-case-workflow")?;
    info!(instance_id = %config.server.instance_id, "Starting Tix Case Workflow Service");

    let (postgres_pool, redis_pool) = initialize_databases(&config.database)
        .await
        .context("database initialization")?;
    info!("Database connections established");

    let client = MettriqClient::new(
        config.integration.mettriq_server.clone(),
        Duration::from_secs(config.integration.request_timeout_seconds),
    )?;
    let services = CaseServices::new(
        &config,
        Stores::postgres(postgres_pool.clone(), redis_pool.clone()),
        Arc::new(client),
    );

    let cancel = CancellationToken::new();
    let jobs = services.spawn_workflow_jobs(&cancel);

    let app = create_app(AppState {
        services,
        backends: Some(HealthBackends { postgres: postgres_pool, redis: redis_pool }),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("server address")?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Case workflow service listening on {}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    for job in jobs {
        let _ = job.await;
    }
    info!("Case workflow service stopped");
    Ok(())
}
