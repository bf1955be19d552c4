use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use review_rota::config::Config;
use review_rota::db;
use review_rota::services::{self, ReviewService};
use review_rota::store::SqliteStore;

/// Pull request reviewer assignment service.
#[derive(Debug, Parser)]
#[command(name = "review-rota", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "REVIEW_ROTA_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

fn init_logging(args: &Args) {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", default_level)));

    // Also installs the `log` bridge, so library records reach this subscriber
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = Config::load(&args.config)?;
    log::info!("[main] Starting review-rota {}", env!("CARGO_PKG_VERSION"));

    let pool = db::initialize(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| {
            format!(
                "Failed to open database at {}",
                config.database.path.display()
            )
        })?;
    let service = ReviewService::new(Arc::new(SqliteStore::new(pool.clone())));

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[main] Failed to listen for shutdown signal: {}", e);
            return;
        }
        log::info!("[main] Received shutdown signal");
        signal_token.cancel();
    });

    services::serve(listener, service, shutdown, config.shutdown_timeout())
        .await
        .context("Server error")?;

    pool.close().await;
    Ok(())
}
