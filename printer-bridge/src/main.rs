use printer_bridge::{run, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = setup_environment()?;

    tracing::info!("Printer bridge starting...");

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
