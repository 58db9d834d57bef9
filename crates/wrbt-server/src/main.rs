//! # WRBT Server
//!
//! Serves the bot pairing and authentication API. Storage backends are picked
//! from configuration: PostgreSQL when a database URL is set (in-memory
//! otherwise), Redis for rate-limit counters when a Redis URL is set.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;

use wrbt_api::rate_limit::RateLimiter;
use wrbt_api::{build_router, ApiSettings, AppState};
use wrbt_common::config::{AppConfig, Environment};
use wrbt_common::crypto::{HashingPolicy, MAX_PAIRING_CODE_LEN, MIN_PAIRING_CODE_LEN};
use wrbt_db::Stores;

/// How often stale in-process rate-limit windows are dropped.
const COUNTER_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "wrbt", version, about = "WRBT bot pairing and authentication server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Mint an admin JWT signed with the configured secret.
    AdminToken {
        /// Admin identifier, recorded as `approved_by` on approvals.
        #[arg(long)]
        subject: String,
        /// Token lifetime in seconds.
        #[arg(long, default_value_t = 3_600)]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = wrbt_common::config::init()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::AdminToken { subject, ttl_secs } => {
            anyhow::ensure!(!config.auth.jwt_secret.is_empty(), "WRBT__AUTH__JWT_SECRET is not set");
            let token = wrbt_api::auth::generate_admin_token(&subject, &config.auth.jwt_secret, ttl_secs)?;
            println!("{token}");
            Ok(())
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wrbt=debug,tower_http=debug".into());

    if config.log.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}

async fn serve(config: &'static AppConfig) -> anyhow::Result<()> {
    // Initialize tracing (structured logging)
    init_tracing(config);

    tracing::info!("Starting WRBT v{} ({:?})", env!("CARGO_PKG_VERSION"), config.environment);

    anyhow::ensure!(
        (MIN_PAIRING_CODE_LEN..=MAX_PAIRING_CODE_LEN).contains(&config.auth.pairing_code_length),
        "auth.pairing_code_length must be between {MIN_PAIRING_CODE_LEN} and {MAX_PAIRING_CODE_LEN}"
    );
    anyhow::ensure!(config.auth.pairing_ttl_secs > 0, "auth.pairing_ttl_secs must be positive");

    let hashing = HashingPolicy::from_config(&config.auth.hashing, config.environment)?;
    if config.auth.jwt_secret.is_empty() {
        tracing::warn!("No admin JWT secret configured; admin routes will refuse every request");
    } else if config.environment == Environment::Production && config.auth.jwt_secret.len() < 32 {
        tracing::warn!("Admin JWT secret is shorter than 32 bytes");
    }

    // Connect to storage backends
    let stores = Stores::connect(config).await?;

    if let Some(counters) = stores.memory_counters.clone() {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(COUNTER_PURGE_INTERVAL);
            loop {
                tick.tick().await;
                let purged = counters.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired rate-limit windows");
                }
            }
        });
    }

    let limiter = RateLimiter::from_config(stores.counters.clone(), &config.rate_limits);
    let state = AppState::new(stores, hashing, limiter, ApiSettings::from_config(config));
    let router = build_router(state);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
