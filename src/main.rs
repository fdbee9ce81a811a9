use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bulk_uploader::{
    api,
    auth::Authenticator,
    catalog,
    config::Config,
    storage::Database,
    transfer::{FileTransfer, SimulatedTransfer},
    upload::{RunSchedule, UploadOrchestrator},
    AppState,
};

const RUN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "bulk-uploader starting");

    // Load configuration
    let config = Config::load()?;

    // Open the store and seed the workspace catalog
    let db = Database::in_memory()?;
    let workspaces = match config.workspaces_file.as_deref() {
        Some(path) => {
            let workspaces = catalog::load_catalog(path)?;
            info!(path, count = workspaces.len(), "Loaded workspace catalog");
            workspaces
        }
        None => catalog::default_workspaces(),
    };
    db.put_workspaces(&workspaces)?;
    info!(workspaces = workspaces.len(), "Store ready");

    let transfer: Arc<dyn FileTransfer> = Arc::new(SimulatedTransfer::new(
        config.transfer.initial_failure_rate,
        config.transfer.retry_failure_rate,
        config.transfer.seed,
    ));
    info!(
        initial_failure_rate = config.transfer.initial_failure_rate,
        retry_failure_rate = config.transfer.retry_failure_rate,
        "Using simulated transfer"
    );

    let uploads = Arc::new(UploadOrchestrator::new(
        db.clone(),
        transfer,
        RunSchedule {
            initial: config.upload.initial,
            retry: config.upload.retry,
        },
    ));

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        auth: Authenticator::new(db.clone()),
        db,
        uploads: Arc::clone(&uploads),
        started_at: Instant::now(),
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on: {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup: cancel background upload runs and let them record it
    info!("Shutting down upload runs");
    uploads.shutdown(RUN_DRAIN_TIMEOUT).await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
