//! Oracle node - price aggregation core
//!
//! Main entry point

use tokio::signal;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use oracle_core::math::format_decimal;
use oracle_node::{NodeSettings, OracleNode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting oracle node v{}", env!("CARGO_PKG_VERSION"));

    let settings = NodeSettings::from_env()?;
    let node = OracleNode::from_settings(&settings)?;

    // Setup shutdown channel
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install signal handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C");
            }
            _ = terminate => {
                info!("Received termination signal");
            }
        }

        let _ = shutdown_tx.send(());
    });

    let outcomes = node
        .run(settings.cycles, settings.interval(), shutdown_rx)
        .await;

    if let Some(last) = outcomes.last() {
        for (ticker, price) in &last.published {
            info!("{} = {}", ticker, format_decimal(*price, ticker.decimals()));
        }
    }

    info!("Node shutdown complete after {} cycles", outcomes.len());
    Ok(())
}
