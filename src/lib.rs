// Module declarations for the application's core components
pub mod cache;     // Latest decoded snapshot per model
pub mod config;    // Configuration management
pub mod device;    // Modbus transport, discovery and the device session
pub mod error;     // Error handling and types
pub mod gateway;   // Operations exposed to the HTTP layer
pub mod options;   // Command line options parsing
pub mod prelude;   // Common imports and types
pub mod scheduler; // Background polling
pub mod sunspec;   // Model catalog, decoder and encoder

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::error::{Error, Result};

use crate::gateway::Gateway;
use crate::options::Options;
use crate::prelude::*;

use std::io::Write;
use tokio_util::sync::CancellationToken;

/// Installs the logger. Without RUST_LOG the filter is left open and the level
/// is controlled through `log::set_max_level`, starting at info.
fn init_logging() {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();

    match result {
        Ok(()) if std::env::var_os("RUST_LOG").is_none() => log::set_max_level(log::LevelFilter::Info),
        Ok(()) => {}
        Err(e) => eprintln!("logger already initialised: {}", e),
    }
}

/// Switches to the configured level unless RUST_LOG overrides it.
fn apply_loglevel(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    match level.parse::<log::LevelFilter>() {
        Ok(filter) => log::set_max_level(filter),
        Err(_) => warn!("unknown loglevel {}, keeping default", level),
    }
}

/// Main application entry point
///
/// Loads configuration, connects to the device, starts polling and the
/// reconnect supervisor, then waits for `shutdown` (or the runtime limit).
pub async fn app(options: Options, shutdown: CancellationToken) -> anyhow::Result<()> {
    init_logging();

    info!(
        "sunspec-gateway {} starting with config file: {}",
        CARGO_PKG_VERSION, options.config_file
    );

    let config = ConfigWrapper::new(options.config_file.clone())?;
    apply_loglevel(&config.loglevel());

    if let Some(runtime) = options.runtime {
        let token = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(runtime)).await;
            info!("runtime of {}s reached", runtime);
            token.cancel();
        });
    }

    let gateway = Arc::new(Gateway::new(config.clone()));

    // the supervisor retries a failed first attempt
    if let Err(e) = gateway.connect().await {
        error!("initial connection failed: {}", e);
    }

    gateway.start_polling(None, None).await?;

    let supervisor = {
        let gateway = gateway.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { gateway.supervise(token).await })
    };

    info!("Waiting for shutdown signal...");
    shutdown.cancelled().await;

    info!("Shutdown signal received, stopping components...");
    gateway.shutdown().await;

    if let Err(e) = supervisor.await {
        error!("Error waiting for supervisor task: {}", e);
    }

    info!("Application shutdown complete");
    Ok(())
}
