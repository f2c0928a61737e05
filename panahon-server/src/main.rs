//! # Panahon Server
//!
//! HTTP API for the Panahon weather-station network.
//!
//! Serves login and session renewal, role-gated administration and the
//! Globe Labs opt-in webhook on top of PostgreSQL.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use panahon_core::database::PostgresStore;
use panahon_server::{
    AppState,
    infra::config::{Config, ConfigArgs},
    routes,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "panahon-server")]
#[command(about = "Weather-station telemetry API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file_loaded = dotenvy::dotenv().is_ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if env_file_loaded {
        info!("loaded .env file");
    }

    match cli.command {
        Some(Command::Db(DbCommand::Migrate)) => run_db_migrate(&cli.config).await,
        None => {
            let config = cli
                .config
                .into_config()
                .context("invalid configuration")?;
            run_server(Arc::new(config)).await
        }
    }
}

async fn connect(url: Option<&str>, max_connections: u32) -> anyhow::Result<PostgresStore> {
    let url = url.context("DATABASE_URL is required")?;
    PostgresStore::connect(url, max_connections)
        .await
        .context("failed to connect to PostgreSQL")
}

/// Migrations only need the database settings.
async fn run_db_migrate(args: &ConfigArgs) -> anyhow::Result<()> {
    let store = connect(args.database_url.as_deref(), args.db_max_connections).await?;
    store.migrate().await.context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let store = Arc::new(
        connect(
            config.database.url.as_deref(),
            config.database.max_connections,
        )
        .await?,
    );
    let state = AppState::new(config.clone(), store)?;
    let router = routes::create_app(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        base_path = %config.server.api_base_path,
        "server listening"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
