use rawhttp::config::Config;
use rawhttp::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
    };

    server::listener::run(&cfg, shutdown).await?;
    tracing::info!("Server gracefully stopped");

    Ok(())
}
