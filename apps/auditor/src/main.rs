//! Tagsync auditor composition root.

#![forbid(unsafe_code)]

mod auditor_config;
mod error;
mod handlers;
mod middleware;
mod scheduler;
mod state;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use sqlx::postgres::PgPoolOptions;
use tagsync_application::{
    ApiVersionResolver, AuditStatsRecorder, InvalidTypeRegistry, TagAuditService,
};
use tagsync_core::AppError;
use tagsync_infrastructure::{
    ManagementSettings, PostgresTagSyncRepository, TagQueueSettings,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auditor_config::{AuditorConfig, init_tracing};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AuditorConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let lookup = |name: &str| env::var(name).ok();
    let queue_settings = TagQueueSettings::from_lookup(&lookup)?;
    let management_settings = ManagementSettings::from_lookup(&lookup)?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let resource_graph = Arc::new(management_settings.resource_graph(http_client)?);

    let repository = Arc::new(PostgresTagSyncRepository::new(pool.clone()));
    let stats_recorder = AuditStatsRecorder::new(repository.clone());
    let audit_service = TagAuditService::new(
        repository.clone(),
        resource_graph.clone(),
        Arc::new(ApiVersionResolver::new(resource_graph)),
        InvalidTypeRegistry::new(repository),
        queue_settings.build(pool)?,
        stats_recorder.clone(),
    )
    .with_version_failure_policy(config.version_failure_policy);

    tokio::spawn(scheduler::run_audit_timer(
        audit_service.clone(),
        config.audit_interval,
        config.run_on_start,
    ));

    let app_state = AppState {
        audit_service,
        stats_recorder,
        trigger_token: config.trigger_token.as_deref().map(Arc::from),
    };

    let protected_routes = Router::new()
        .route("/api/audit/run", post(handlers::audit::run_audit_handler))
        .route(
            "/api/audit/stats/{subscription_id}",
            get(handlers::audit::list_audit_stats_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_trigger_token,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(
        %address,
        audit_interval_seconds = config.audit_interval.as_secs(),
        run_on_start = config.run_on_start,
        version_failure_policy = config.version_failure_policy.as_str(),
        "tagsync-auditor listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("auditor server error: {error}")))
}
