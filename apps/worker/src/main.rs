//! Tagsync worker runtime applying queued tag updates.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tagsync_application::{InvalidTypeRegistry, TagUpdateDispatcher};
use tagsync_core::{AppError, AppResult};
use tagsync_infrastructure::{
    ManagementSettings, PostgresTagSyncRepository, TagQueueSettings,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    worker_id: String,
    concurrency: usize,
    claim_limit: usize,
    lease_seconds: u32,
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let lookup = |name: &str| env::var(name).ok();
    let queue_settings = TagQueueSettings::from_lookup(&lookup)?;
    let management_settings = ManagementSettings::from_lookup(&lookup)?;

    let pool = connect_pool(config.database_url.as_str(), config.concurrency).await?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let resource_graph = Arc::new(management_settings.resource_graph(http_client)?);
    let dispatcher = TagUpdateDispatcher::new(
        resource_graph,
        InvalidTypeRegistry::new(Arc::new(PostgresTagSyncRepository::new(pool.clone()))),
        queue_settings.build(pool)?,
    );

    info!(
        worker_id = %config.worker_id,
        concurrency = config.concurrency,
        claim_limit = config.claim_limit,
        lease_seconds = config.lease_seconds,
        poll_interval_ms = config.poll_interval_ms,
        "tagsync-worker started"
    );

    let handles: Vec<_> = (0..config.concurrency)
        .map(|slot| {
            let dispatcher = dispatcher.clone();
            let config = config.clone();
            tokio::spawn(async move { run_dispatch_loop(dispatcher, config, slot).await })
        })
        .collect();

    for handle in handles {
        if let Err(error) = handle.await {
            error!(error = %error, "dispatcher task terminated");
        }
    }

    Ok(())
}

async fn run_dispatch_loop(dispatcher: TagUpdateDispatcher, config: WorkerConfig, slot: usize) {
    let worker_id = format!("{}-{slot}", config.worker_id);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);

    loop {
        match dispatcher
            .process_batch(worker_id.as_str(), config.claim_limit, config.lease_seconds)
            .await
        {
            Ok(report) if report.received == 0 => {
                tokio::time::sleep(poll_interval).await;
            }
            Ok(report) => {
                info!(
                    worker_id = %worker_id,
                    received = report.received,
                    applied = report.applied,
                    skipped = report.skipped,
                    failed = report.failed,
                    deferred = report.deferred,
                    "tag update batch processed"
                );
            }
            Err(error) => {
                warn!(
                    worker_id = %worker_id,
                    error = %error,
                    "failed to receive tag updates"
                );
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

async fn connect_pool(database_url: &str, concurrency: usize) -> AppResult<PgPool> {
    let max_connections = u32::try_from(concurrency.saturating_add(1)).unwrap_or(u32::MAX);

    PgPoolOptions::new()
        .max_connections(max_connections.max(5))
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("tagsync-worker-{}", std::process::id()));
        let concurrency = parse_env_usize("WORKER_CONCURRENCY", 4)?;
        let claim_limit = parse_env_usize("WORKER_CLAIM_LIMIT", 10)?;
        let lease_seconds = parse_env_u32("WORKER_LEASE_SECONDS", 60)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 1500)?;

        if concurrency == 0 {
            return Err(AppError::Validation(
                "WORKER_CONCURRENCY must be greater than zero".to_owned(),
            ));
        }

        if claim_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "WORKER_LEASE_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            worker_id,
            concurrency,
            claim_limit,
            lease_seconds,
            poll_interval_ms,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
