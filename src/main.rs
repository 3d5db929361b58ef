use anyhow::Context;
use snapkeep::config::AppConfig;
use snapkeep::routes;
use snapkeep::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    tracing::info!("Starting snapkeep v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(config.repos_dir()).context("Failed to create repos dir")?;
    std::fs::create_dir_all(config.uploads_dir()).context("Failed to create uploads dir")?;
    clear_stale_uploads(&config);

    let state = AppState::new(config.clone());
    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(data_dir = %config.data_dir, "Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Uploads interrupted by a previous shutdown are never registered.
fn clear_stale_uploads(config: &AppConfig) {
    let Ok(entries) = std::fs::read_dir(config.uploads_dir()) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::warn!(path = %path.display(), "Removed stale upload"),
                Err(e) => tracing::error!(path = %path.display(), error = %e, "Cannot remove stale upload"),
            }
        }
    }
}

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
                tracing::error!(error = %e, "Failed to install signal handler");
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

    tracing::info!("Shutdown signal received");
}
