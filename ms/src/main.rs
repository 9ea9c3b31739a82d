//! ms - shared update counter and comment scoring
//!
//! CLI entry point for inspecting and bumping the counter, watching for
//! changes made by other processes, and submitting comments for scoring.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use modsync::cli::{Cli, Command};
use modsync::config::Config;
use modsync::coordinator::{UpdateCoordinator, UpdateListener};
use modsync::domain::DomainId;
use modsync::scoring::{ScoreData, ScoreSink, create_shim};
use modsync::store::{ContentStore, SqliteStore};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modsync")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("modsync.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let store = open_store(&config)?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Counter => cmd_counter(&store).await,
        Command::Bump { item } => cmd_bump(&config, store, item).await,
        Command::Watch => cmd_watch(&config, store).await,
        Command::Score {
            comment,
            service_user,
            correlator,
        } => cmd_score(&config, store, comment, service_user, correlator).await,
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = &config.storage.database_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
    }
    SqliteStore::open(path).context(format!("Failed to open database {}", path.display()))
}

async fn cmd_counter(store: &SqliteStore) -> Result<()> {
    debug!("cmd_counter: called");
    let record = store.counter_record().await?;
    println!("{} (updated {})", record.value, record.updated_at.to_rfc3339());
    Ok(())
}

async fn cmd_bump(config: &Config, store: SqliteStore, item: Option<DomainId>) -> Result<()> {
    debug!(?item, "cmd_bump: called");
    let coordinator = UpdateCoordinator::new(Arc::new(store), config.coordinator.clone());
    match item {
        Some(item_id) => coordinator.partial_update_happened(item_id).await?,
        None => coordinator.update_happened().await?,
    }
    println!("{}", coordinator.cached_counter());
    Ok(())
}

/// Prints every notice it receives
struct PrintListener;

#[async_trait]
impl UpdateListener for PrintListener {
    async fn update_happened(&self) -> Result<()> {
        println!("{} update happened", chrono::Local::now().format("%H:%M:%S"));
        Ok(())
    }

    async fn partial_update_happened(&self, item_id: DomainId) -> Result<()> {
        println!("{} item {} updated", chrono::Local::now().format("%H:%M:%S"), item_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "print"
    }
}

async fn cmd_watch(config: &Config, store: SqliteStore) -> Result<()> {
    debug!("cmd_watch: called");
    let coordinator = UpdateCoordinator::new(Arc::new(store), config.coordinator.clone());

    // Prime the cache so only changes made from now on are reported
    coordinator.poll_step().await?;
    println!(
        "Watching counter (currently {}), polling every {:?}. Ctrl-C to stop.",
        coordinator.cached_counter(),
        config.coordinator.poll_interval()
    );

    coordinator.register_interest(Arc::new(PrintListener), false)?;
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    let metrics = coordinator.metrics();
    coordinator.clear_interested();
    info!(?metrics, "Watch stopped");
    println!("Stopped after {} polls ({} changes)", metrics.polls, metrics.polls_with_changes);
    Ok(())
}

/// Prints the score as JSON
struct PrintSink;

#[async_trait]
impl ScoreSink for PrintSink {
    async fn process_machine_score(&self, comment_id: DomainId, service_user_id: DomainId, score: ScoreData) -> Result<()> {
        let output = serde_json::json!({
            "commentId": comment_id,
            "serviceUserId": service_user_id,
            "score": score,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

async fn cmd_score(
    config: &Config,
    store: SqliteStore,
    comment_id: DomainId,
    service_user_id: DomainId,
    correlator: Option<String>,
) -> Result<()> {
    debug!(%comment_id, %service_user_id, ?correlator, "cmd_score: called");
    config.validate()?;

    let comment = store
        .find_comment(comment_id)
        .await?
        .ok_or_else(|| eyre::eyre!("Comment {} not found", comment_id))?;
    let service_user = store
        .find_service_user(service_user_id)
        .await?
        .ok_or_else(|| eyre::eyre!("Service user {} not found or has no endpoint", service_user_id))?;
    let correlator = correlator.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    let dispatcher = create_shim(config, Arc::new(store), Arc::new(PrintSink))?;
    dispatcher
        .send_to_scorer(&comment, &service_user, &correlator)
        .await
        .wrap_err_with(|| format!("Failed to score comment {}", comment_id))?;
    Ok(())
}
