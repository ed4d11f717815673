//! Scrypo Indexer - ProfileRegistry event projection
//!
//! This binary provides:
//! - Block sync from a Starknet node
//! - Profile and message projection into SQLite
//! - Status reporting and database initialization

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use scrypo_indexer::config::{Config, LoggingConfig};
use scrypo_indexer::storage::Storage;

#[derive(Parser)]
#[command(name = "scrypo-indexer")]
#[command(version, about = "Scrypo indexer for ProfileRegistry events", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexer service
    Run,

    /// Show indexer status and sync progress
    Status,

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://scrypo.db")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    // The run command honours the logging section; other commands
    // fall back to defaults when no config is present.
    let logging = match &command {
        Commands::Run => Config::from_file(&cli.config)
            .map(|c| c.logging)
            .unwrap_or_default(),
        _ => LoggingConfig::default(),
    };
    init_logging(cli.debug, &logging)?;

    info!("Scrypo Indexer starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match command {
        Commands::Run => run_indexer(&cli.config).await?,
        Commands::Status => show_status(&cli.config).await?,
        Commands::InitDb { database_url } => init_database(&database_url).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("scrypo_indexer=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("scrypo_indexer={},sqlx=warn", logging.level))
        })
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_line_number(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }

    Ok(())
}

/// Main indexer service - runs the sync engine until Ctrl+C
async fn run_indexer(config_path: &str) -> Result<()> {
    use scrypo_indexer::listener::{RpcProvider, SyncEngine};

    info!("Starting indexer service with config: {}", config_path);

    let config = Config::from_file(config_path).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  RPC URL: {}", config.network.rpc_url);
    info!("  ProfileRegistry: {}", config.contracts.profile_registry);
    info!("  Database: {}", config.database.url);
    info!("  Start block: {}", config.sync.start_block);
    info!("  Finality: {}", config.sync.finality);

    let storage = Storage::with_busy_timeout(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
        config.database.busy_timeout(),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    info!("Database initialized");

    match storage.load_cursor().await? {
        Some(cursor) => info!(
            "Resuming after block {} ({})",
            cursor.block_number, cursor.finality
        ),
        None => info!(
            "Fresh database, syncing from block {}",
            config.sync.start_block
        ),
    }

    let provider = RpcProvider::new(
        &config.network.rpc_url,
        config.contracts.profile_registry,
        config.sync.events_chunk_size,
    )
    .context("Failed to create RPC provider")?;

    info!("RPC provider initialized");

    let mut sync_engine = SyncEngine::new(
        provider,
        storage.clone(),
        config.sync.clone(),
        config.retry.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sync_handle = tokio::spawn(async move { sync_engine.run(shutdown_rx).await });

    info!("Indexer is running. Press Ctrl+C to stop.");

    let result = tokio::select! {
        result = &mut sync_handle => {
            warn!("Sync engine exited");
            result
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            let _ = shutdown_tx.send(true);
            sync_handle.await
        }
    };

    storage.close().await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("Sync engine failed"),
        Err(e) => Err(anyhow::anyhow!("Sync task panicked: {}", e)),
    }
}

/// Show indexer status and sync progress
async fn show_status(config_path: &str) -> Result<()> {
    info!("Checking indexer status");

    // Fall back to the default database only if the config file doesn't exist
    let (database_url, max_conn, min_conn) = match Config::from_file(config_path) {
        Ok(config) => {
            info!("Using database from config: {}", config.database.url);
            (
                config.database.url,
                Some(config.database.max_connections),
                Some(config.database.min_connections),
            )
        }
        Err(e) => {
            let is_not_found = e.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
            });

            if is_not_found {
                info!("Config file not found, using default database: sqlite://scrypo.db");
                ("sqlite://scrypo.db".to_string(), None, None)
            } else {
                return Err(e).context("Failed to load config file");
            }
        }
    };

    let storage = Storage::new(&database_url, max_conn, min_conn)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let cursor = storage.load_cursor().await?;
    let stats = storage.stats().await?;

    println!("\n=== Scrypo Indexer Status ===\n");
    println!("Sync Progress:");
    match cursor {
        Some(cursor) => {
            println!("  Last Block: {}", cursor.block_number);
            println!("  Last Block Hash: {}", cursor.block_hash);
            println!("  Finality: {}", cursor.finality);
            println!(
                "  Last Updated: {}",
                chrono::DateTime::from_timestamp(cursor.updated_at, 0)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string())
            );
        }
        None => println!("  No blocks projected yet."),
    }

    println!("\nDatabase Statistics:");
    println!("  Profiles: {}", stats.profile_count);
    println!("  Messages: {}", stats.message_count);

    println!();

    storage.close().await;

    Ok(())
}

/// Initialize the database
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Profiles: {}", stats.profile_count);
    info!("  Messages: {}", stats.message_count);
    match stats.last_block_number {
        Some(block) => info!("  Last block: {}", block),
        None => info!("  Last block: none"),
    }

    storage.close().await;

    Ok(())
}
