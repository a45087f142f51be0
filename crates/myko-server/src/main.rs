//! Myko Service Binary

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use myko_server::{build_service, connect_backend, router, MykoConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Starting Myko v{}", myko_common::VERSION);

    let config = MykoConfig::load()?;
    info!(
        backend = ?config.data.backend,
        buffer_size = config.flush.buffer_size,
        interval_ms = config.flush.interval_ms,
        mode = ?config.flush.mode,
        escape = config.ingest.escape,
        "Loaded configuration"
    );

    let backend = Arc::new(connect_backend(&config.data).await?);
    let service = Arc::new(build_service(&config, backend));
    let app = router(service.clone());

    let addr: SocketAddr = config.listen.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Myko listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Flushing buffered events");
    if let Err(e) = service.flush().await {
        error!(error = %e, "Final flush failed, buffered events are lost");
    }

    info!("Shutting down Myko");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
