use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quotagate::config::AppConfig;
use quotagate::http::{cors_headers, HttpServer, RateLimitService};
use quotagate::ratelimit::{PolicyTable, RateLimiter};

/// Fixed-window rate limiting service.
#[derive(Parser, Debug)]
#[command(name = "quotagate", version, about)]
struct Args {
    /// Path to a configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Path to a YAML policy table, overriding the configuration file
    #[arg(short, long)]
    policies: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Quotagate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(args.config.as_deref())?;
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let policies = match args.policies.or(config.rate_limiting.policies_path.clone()) {
        Some(path) => PolicyTable::from_file(path)?,
        None => PolicyTable::builtin(),
    };
    info!(
        policies = ?policies.names().collect::<Vec<_>>(),
        default_limit = policies.default.limit,
        "Policy table loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::with_policies(policies));
    let sweeper = rate_limiter.spawn_sweeper(config.rate_limiting.sweep_interval());
    info!("Rate limiter initialized");

    let service = RateLimitService::new(rate_limiter, cors_headers(&config.server.cors));
    let server = HttpServer::new(config.server.http_addr, service.router());

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.stop().await;
    info!("Quotagate Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
