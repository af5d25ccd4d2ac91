//! Tunestream service process.
//!
//! Runs the role named by `TUNESTREAM_SERVICE` until Ctrl+C or SIGTERM.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunestream_runtime::MetricsServer;
use tunestream_server::{Config, bootstrap};
use tunestream_web::MetricsState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal outside development
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tunestream=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        role = %config.role,
        address = %config.bind_address(),
        metrics = config.metrics_enabled,
        "Configuration loaded"
    );

    let metrics = if config.metrics_enabled {
        let mut server = MetricsServer::new();
        server.start().context("metrics recorder")?;
        Some(MetricsState {
            server: Arc::new(server),
        })
    } else {
        None
    };

    let service = bootstrap::build(&config, metrics)?;
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("bind {}", config.bind_address()))?;
    info!(role = %service.role, address = %config.bind_address(), "Server listening");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let app = service
        .router
        .into_make_service_with_connect_info::<SocketAddr>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            joined.context("server task")?.context("server")?;
            return Ok(());
        }
        () = shutdown_signal() => {}
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(config.shutdown_timeout, server).await {
        Ok(joined) => joined.context("server task")?.context("server")?,
        Err(_) => warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "Connections still open after shutdown timeout, dropping them"
        ),
    }

    for task in service.background {
        task.abort();
    }
    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or, on Unix, SIGTERM.
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
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
