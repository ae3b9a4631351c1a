mod config;
mod domain;
mod error;
mod handlers;
mod middleware;
mod repositories;
mod routes;
mod scheduler;
mod services;

use config::AppState;
use routes::create_routes;
use scheduler::PaymentSyncScheduler;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Entry point dari Order Service Parfum Store
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Setup logging dengan environment
    setup_logging();

    // Create application state (database + migrations)
    let app_state = AppState::from_env().await?;

    info!(
        "🚀 Order Service starting on {}:{}",
        app_state.config.server_host, app_state.config.server_port
    );
    info!(
        "💳 Mode: {} | Midtrans API: {} | QRIS acquirer: {}",
        if app_state.config.midtrans.is_production { "Production" } else { "Sandbox" },
        app_state.config.midtrans.api_url,
        app_state.config.midtrans.qris_acquirer
    );

    PaymentSyncScheduler::new(
        app_state.store.clone(),
        app_state.pipeline.clone(),
        Duration::from_secs(app_state.config.payment_sync_interval_secs),
    )
    .start(app_state.config.disable_scheduler);

    start_server(app_state).await
}

/// Inisialisasi structured logging berdasarkan environment
fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("order_service=debug,tower_http=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Start server dengan graceful shutdown
async fn start_server(app_state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_routes(app_state.clone())?;

    let address = format!("{}:{}", app_state.config.server_host, app_state.config.server_port);
    let listener = TcpListener::bind(&address).await?;

    info!("🌐 Server running on http://{}", address);
    info!("📚 API Docs: http://{}/docs", address);
    info!("🏥 Health Check: http://{}/health", address);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
        info!("🛑 Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("✅ Order Service shutdown successfully");
    Ok(())
}
