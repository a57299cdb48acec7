// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod error;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::chart_transformer::ChartOptions;
use crate::application::scheduler::{PollScheduler, SourceRegistration};
use crate::application::source_adapter::SourceAdapter;
use crate::domain::source::RetryPolicy;
use crate::infrastructure::config::load_monitor_config;
use crate::infrastructure::fetch::FetchClient;
use crate::infrastructure::http_source::HttpSourceAdapter;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    activate_tab, get_dashboard, health_check, refresh, set_timeframe, set_units,
    stream_dashboard, vm_metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_monitor_config()?;
    let dashboard = config.dashboard.clone();
    let chart = ChartOptions {
        offset: dashboard.display_offset(),
        target_tick_count: dashboard.target_tick_count,
    };

    // Backend client (infrastructure layer)
    let fetch = FetchClient::new(config.backend.base_url.clone(), config.request_timeout())?;
    tracing::info!("Polling backend at {}", config.backend.base_url);

    // Sources and scheduler (application layer)
    let registrations = config
        .source_catalog()
        .into_iter()
        .map(|descriptor| {
            let adapter: Arc<dyn SourceAdapter> =
                Arc::new(HttpSourceAdapter::new(fetch.clone(), descriptor.clone(), chart));
            SourceRegistration::new(descriptor, adapter)
        })
        .collect();
    let (scheduler, handle) = PollScheduler::new(registrations, dashboard.initial_tab, dashboard.timeframe);
    let scheduler_task = tokio::spawn(scheduler.run());

    let (units, _) = watch::channel(dashboard.network_unit);
    let state = Arc::new(AppState {
        scheduler: handle.clone(),
        fetch,
        units,
        chart,
        vm_retry: RetryPolicy::single_attempt(),
    });

    // Build router (presentation layer)
    // Compression is handled in the response builders, so no CompressionLayer.
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/stream", get(stream_dashboard))
        .route("/refresh", post(refresh))
        .route("/tab/:tab", put(activate_tab))
        .route("/timeframe/:timeframe", put(set_timeframe))
        .route("/units/:unit", put(set_units))
        .route("/vms/:vmid/metrics", get(vm_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server.listen.parse()?;
    tracing::info!("Starting host-monitor service on {}", addr);

    let shutdown = handle.clone();
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
            shutdown.shutdown();
        })
        .await?;

    handle.shutdown();
    scheduler_task.await?;
    Ok(())
}
