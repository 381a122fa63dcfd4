//! GatePass server binary.
//!
//! Runs the ledger event indexer in the background and serves the admission
//! API.
//!
//! ```bash
//! LEDGER_CONTRACT_ADDRESS=0x… DATABASE_URL=postgres://… cargo run --bin gatepass
//! ```

use gatepass_admission::AdmissionController;
use gatepass_core::environment::{Clock, SystemClock};
use gatepass_core::ledger::Ledger;
use gatepass_indexer::Indexer;
use gatepass_ledger::JsonRpcLedger;
use gatepass_postgres::PostgresStore;
use gatepass_server::{AppState, Config, build_router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gatepass=debug,sqlx=warn".into()),
        )
        .with(fmt::layer())
        .init();

    info!("Starting GatePass server...");

    let config = Config::from_env()?;
    info!(
        ledger = %config.ledger.rpc_url,
        contract = %config.ledger.contract_address,
        gatekeepers = config.gatekeepers.len(),
        "Configuration loaded"
    );
    if config.gatekeepers.is_empty() {
        warn!("No gatekeepers configured; every scan will be rejected");
    }

    let metrics_addr: SocketAddr = config.metrics_address().parse()?;
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .with_http_listener(metrics_addr)
        .install()?;
    gatepass_indexer::metrics::register_metrics();
    gatepass_admission::metrics::register_metrics();
    info!(addr = %metrics_addr, "Metrics exporter listening");

    let store = Arc::new(
        PostgresStore::connect(&config.database.url, config.database.max_connections).await?,
    );
    store.migrate().await?;
    info!("Database migrations applied");

    let ledger: Arc<dyn Ledger> = Arc::new(JsonRpcLedger::new(
        &config.ledger.rpc_url,
        config.ledger.contract_address.clone(),
        config.ledger.rpc_timeout,
    )?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let indexer = Arc::new(Indexer::new(
        ledger,
        Arc::clone(&store),
        Arc::clone(&clock),
        config.indexer.clone(),
    ));
    indexer.start().await?;

    let admission = Arc::new(AdmissionController::new(
        Arc::clone(&store),
        Arc::new(config.gatekeepers.clone()),
        clock,
        config.admission.clone(),
    ));

    let state = AppState::new(admission, Arc::clone(&indexer), store);
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping indexer...");
    indexer.stop().await?;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
///
/// A signal handler that cannot be installed never resolves, leaving the
/// other one in charge.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
