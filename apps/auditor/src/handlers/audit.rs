use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tagsync_application::AuditRunSummary;
use tagsync_core::SubscriptionId;
use tagsync_domain::AuditRunStats;
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

const DEFAULT_STATS_LIMIT: usize = 20;

#[derive(Debug, Default, Deserialize)]
pub struct AuditStatsQuery {
    pub limit: Option<usize>,
}

/// Runs one audit pass; waits for a pass already in progress to finish first.
pub async fn run_audit_handler(State(state): State<AppState>) -> ApiResult<Json<AuditRunSummary>> {
    info!("audit pass requested over http");
    let summary = state.audit_service.run_audit().await?;
    Ok(Json(summary))
}

pub async fn list_audit_stats_handler(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
    Query(query): Query<AuditStatsQuery>,
) -> ApiResult<Json<Vec<AuditRunStats>>> {
    let subscription_id = SubscriptionId::new(subscription_id)?;
    let runs = state
        .stats_recorder
        .recent_runs(
            &subscription_id,
            query.limit.unwrap_or(DEFAULT_STATS_LIMIT),
        )
        .await?;
    Ok(Json(runs))
}
