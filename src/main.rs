use log::error;
use tokio_util::sync::CancellationToken;

use sunspec_gateway::options::Options;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::new();
    let shutdown = CancellationToken::new();

    // Handle Ctrl+C
    let token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        token.cancel();
    });

    sunspec_gateway::app(options, shutdown).await
}
