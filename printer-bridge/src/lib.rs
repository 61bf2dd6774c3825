//! # printer-bridge
//!
//! Local HTTP relay that lets a browser-hosted POS reach raw TCP (port 9100)
//! printers. Jobs arrive as base64 over `POST /print` and are written
//! straight to the printer socket.

pub mod config;
pub mod error;
pub mod logger;
pub mod routes;

pub use config::Config;
pub use error::{BridgeError, BridgeResult};
pub use routes::{AppState, build_router};

/// Load `.env`, read the configuration and install logging
pub fn setup_environment() -> anyhow::Result<Config> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    logger::init_logger_with_file(
        &config.log_level,
        config.log_json || config.is_production(),
        config.log_dir.as_deref(),
    )?;

    Ok(config)
}

/// Serve until Ctrl+C
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let app = build_router(AppState::new(config));

    tracing::info!(%addr, "Printer bridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Printer bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
