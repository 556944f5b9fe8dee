//! WebCTP gateway session client - Entry Point
//!
//! Logs in to the trade and market-data fronts through the relay, polls the
//! trading account, and logs out on Ctrl-C.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use wctp_client::{AppConfig, AppError, Application};
use zeroize::Zeroizing;

/// WebCTP gateway session client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via WCTP_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Environment variable holding the gateway password
    #[arg(long, default_value = "WCTP_PASSWORD")]
    password_env: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    wctp_ws::init_crypto();

    let args = Args::parse();

    // Determine config path: CLI arg > WCTP_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("WCTP_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = AppConfig::from_file(&config_path)?;
    wctp_telemetry::init_logging(&config.telemetry.logging())?;

    info!("Starting WebCTP client v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, "Configuration loaded");

    let password = Zeroizing::new(
        std::env::var(&args.password_env)
            .map_err(|_| AppError::MissingPassword(args.password_env.clone()))?,
    );

    let app = Application::start(config);
    app.run(&password).await?;

    Ok(())
}
