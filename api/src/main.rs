use anyhow::Result;
use std::net::{IpAddr, SocketAddr};

use api::{create_router, AppState};
use common::{bootstrap, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (.env, config files, environment)
    let settings = bootstrap::load_settings()?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.log_file.as_deref(),
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    tracing::info!(
        host = %settings.server.host,
        port = %settings.server.port,
        root_path = %settings.root_path(),
        "Starting reports API server"
    );

    let metrics_handle = telemetry::init_metrics()?;

    // Initialize database connection pool and the lifecycle connection
    let db_pool = bootstrap::init_database_pool(&settings);
    let mut lifecycle_db = bootstrap::database(db_pool.clone(), &settings);
    bootstrap::connect_to_db(&mut lifecycle_db).await?;

    let state = AppState::new(db_pool.clone(), settings.clone(), Some(metrics_handle));
    let app = create_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<IpAddr>()?,
        settings.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let served = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };

    // Shutdown hooks run whether serving ended cleanly or not
    bootstrap::disconnect_from_db(&mut lifecycle_db);
    db_pool.close().await;
    if settings.observability.tracing_endpoint.is_some() {
        telemetry::shutdown_tracer();
    }

    served?;
    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
