// ABOUTME: CLI entry point for change-exporter
// ABOUTME: Parses flags, initialises logging, probes the database, and serves HTTP

use anyhow::Context;
use change_exporter::config::{AuthConfig, DatabaseConfig, ServerConfig};
use change_exporter::server::{self, AppState};
use change_exporter::store::{MySqlStore, Store, StoreConnection};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "change-exporter")]
#[command(
    about = "Standalone web server that outputs changes that occurred on a table since a specific date",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0")]
    listen_address: IpAddr,
    /// HTTP server port
    #[arg(long, default_value_t = 8888)]
    listen_port: u16,
    /// HTTP basic auth username (required for all connecting clients)
    #[arg(long, env = "CHANGE_EXPORTER_LISTEN_USERNAME")]
    listen_username: Option<String>,
    /// HTTP basic auth password (required for all connecting clients)
    #[arg(long, env = "CHANGE_EXPORTER_LISTEN_PASSWORD", hide_env_values = true)]
    listen_password: Option<String>,
    /// Database server host
    #[arg(long, env = "CHANGE_EXPORTER_DB_HOST")]
    db_host: String,
    /// Database server port
    #[arg(long, default_value_t = 3306)]
    db_port: u16,
    /// Database user
    #[arg(long, env = "CHANGE_EXPORTER_DB_USERNAME", default_value = "root")]
    db_username: String,
    /// Database password
    #[arg(
        long,
        env = "CHANGE_EXPORTER_DB_PASSWORD",
        default_value = "",
        hide_env_values = true
    )]
    db_password: String,
    /// Enable debug logging
    #[arg(long)]
    debug: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> anyhow::Result<Self> {
        Ok(Self {
            listen: SocketAddr::new(cli.listen_address, cli.listen_port),
            auth: AuthConfig::from_parts(cli.listen_username, cli.listen_password)?,
            database: DatabaseConfig {
                host: cli.db_host,
                port: cli.db_port,
                username: cli.db_username,
                password: cli.db_password,
            },
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --debug forces debug, otherwise --log is used
    let level = if cli.debug {
        "debug".to_string()
    } else {
        cli.log.clone()
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ServerConfig::try_from(cli)?;
    tracing::debug!("Configuration: {:?}", config);

    let store = MySqlStore::new(&config.database);

    tracing::debug!("Testing database connection...");
    let conn = store.connect().await.with_context(|| {
        format!(
            "Failed to connect to MySQL at {}:{}",
            config.database.host, config.database.port
        )
    })?;
    conn.close().await;

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    tracing::info!("Starting server on http://{}", config.listen);

    let state = Arc::new(AppState::new(store, config.auth.clone()));
    server::serve(listener, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Received shutdown signal");
}
