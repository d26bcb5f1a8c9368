//! Main binary for the storefront notification engine
//!
//! Serves the admin API (campaigns, notifications, delivery records,
//! schedules), the health and metrics endpoints, and runs the background
//! scheduler until a shutdown signal arrives.

use notification_engine::{routes::create_router, EngineConfig, NotificationEngine};
use notify_database::InMemoryStore;
use notify_shared::UserProfile;

use anyhow::{Context, Result};
use axum::serve;
use clap::{Arg, Command};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing()?;

    let matches = create_cli().get_matches();

    let config = load_config(&matches)?;

    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    info!("Starting notification engine");
    info!(
        "Configuration: Server {}:{}",
        config.server.host, config.server.port
    );
    info!(
        "Enabled channels: InApp={}, Email={}, WhatsApp={}, Push={}",
        config.in_app.enabled, config.email.enabled, config.whatsapp.enabled, config.push.enabled
    );

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid host address '{}'", config.server.host))?,
        config.server.port,
    );
    let metrics_endpoint = config.metrics.endpoint.clone();

    let engine = NotificationEngine::new(config, Arc::new(InMemoryStore::new())).map_err(|e| {
        error!("Failed to initialize notification engine: {}", e);
        e
    })?;

    if let Some(path) = matches.get_one::<String>("seed-users") {
        let seeded = seed_users(&engine, path).await?;
        info!("Seeded {} users from {}", seeded, path);
    }

    if engine.start_scheduler() {
        info!("Schedule runner started");
    }

    let app = create_router(Arc::new(engine.clone()));

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!("Notification engine listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Metrics: http://{}{}", addr, metrics_endpoint);
    info!("API: http://{}/api/v1", addr);

    let cancellation_token = CancellationToken::new();

    let server_task = tokio::spawn({
        let cancellation_token = cancellation_token.clone();
        async move {
            let result = serve(listener, app)
                .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
    });

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    cancellation_token.cancel();

    engine.stop_scheduler().await;

    if let Err(e) = server_task.await {
        error!("Server task error during shutdown: {}", e);
    }

    info!("Notification engine stopped gracefully");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notification_engine=info,tower_http=info,axum=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}

/// Create CLI argument parser
fn create_cli() -> Command {
    Command::new("notification-engine")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Storefront notification engine - campaigns, transactional notifications and schedules")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Server host address"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port"),
        )
        .arg(
            Arg::new("seed-users")
                .long("seed-users")
                .value_name("FILE")
                .help("JSON file with an array of user profiles to load at startup"),
        )
}

/// Load configuration from defaults, environment and file, then apply CLI overrides
fn load_config(matches: &clap::ArgMatches) -> Result<EngineConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(config_file) => {
            info!("Loading configuration from file: {}", config_file);
            EngineConfig::load(Some(config_file))
                .with_context(|| format!("Failed to load configuration from {}", config_file))?
        }
        None => EngineConfig::from_env().unwrap_or_else(|e| {
            warn!(
                "Failed to load configuration from environment: {}, using defaults",
                e
            );
            EngineConfig::default()
        }),
    };

    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.clone();
    }

    if let Some(port_str) = matches.get_one::<String>("port") {
        config.server.port = port_str
            .parse()
            .with_context(|| format!("Invalid port number '{}'", port_str))?;
    }

    Ok(config)
}

async fn seed_users(engine: &NotificationEngine, path: &str) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path))?;
    let profiles: Vec<UserProfile> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid seed file {}", path))?;
    Ok(engine.register_users(&profiles).await?)
}

/// Wait for shutdown signals
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
