use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tagsync_application::{
    AuditConfigRepository, AuditStatsRepository, InvalidResourceTypeRepository,
};
use tagsync_core::{AppError, AppResult, SubscriptionId};
use tagsync_domain::{AuditConfig, AuditRunStats, InvalidResourceTypeRecord};
use tracing::warn;

mod configs;
mod invalid_types;
mod stats;

/// PostgreSQL-backed record store for audit configuration, invalid types and run stats.
#[derive(Clone)]
pub struct PostgresTagSyncRepository {
    pool: PgPool,
}

impl PostgresTagSyncRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditConfigRow {
    partition_key: String,
    subscription_id: String,
    required_tags: String,
}

#[derive(Debug, FromRow)]
struct InvalidResourceTypeRow {
    partition_key: String,
    resource_type: String,
    message: String,
    unique_id: uuid::Uuid,
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct AuditRunStatsRow {
    subscription_id: String,
    run_id: uuid::Uuid,
    job_start: DateTime<Utc>,
    job_end: Option<DateTime<Utc>>,
    resource_groups_total: i32,
    resource_groups_skipped: i32,
    resource_items_total: i32,
    resource_items_with_updates: i32,
    resource_items_skipped: i32,
}

fn counter_to_column(name: &str, value: u32) -> AppResult<i32> {
    i32::try_from(value)
        .map_err(|error| AppError::Internal(format!("audit counter '{name}' overflows: {error}")))
}

fn counter_from_column(name: &str, value: i32) -> AppResult<u32> {
    u32::try_from(value).map_err(|error| {
        AppError::Internal(format!("stored audit counter '{name}' is negative: {error}"))
    })
}
