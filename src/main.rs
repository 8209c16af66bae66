//! Finance Dashboard - data-integration service for configurable API widgets.

mod api;
mod cache;
mod config;
mod connection;
mod dashboard;
mod discovery;
mod error;
mod extraction;
mod persistence;
mod provider;
mod schema;
mod shape;
mod source;
mod store;

use std::sync::Arc;
use std::time::Duration;

use config::DashboardConfig;
use dashboard::Dashboard;
use persistence::StateFile;
use source::HttpSource;
use store::WidgetStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "finance_dashboard=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DashboardConfig::from_env()?;
    info!(
        "Provider host {} (default symbol {}), cache ttl {} ms",
        config.provider.host, config.provider.default_symbol, config.cache_ttl_ms
    );

    let source = HttpSource::new(Duration::from_secs(config.request_timeout_secs))?;

    // Restore persisted widgets; every one is due for a refresh.
    let state_file = StateFile::new(&config.state_path);
    let mut store = WidgetStore::with_cache_ttl(config.cache_ttl_ms);
    let refreshes = store.restore(state_file.load()?);

    let dashboard = Dashboard::new(store, Arc::new(source), config.provider.clone())
        .with_discovery_depth(config.discovery_max_depth)
        .with_state_file(state_file);
    dashboard.spawn_refreshes(refreshes);

    let app = api::router(dashboard.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dashboard.persist().await;
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutting down");
}
