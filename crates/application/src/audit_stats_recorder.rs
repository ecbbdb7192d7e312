use std::sync::Arc;

use tagsync_core::{AppError, AppResult, SubscriptionId};
use tagsync_domain::AuditRunStats;
use tracing::info;

use crate::tag_sync_ports::AuditStatsRepository;

const MAX_RECENT_RUNS: usize = 100;

/// Persists one summary per finished subscription audit pass.
#[derive(Clone)]
pub struct AuditStatsRecorder {
    repository: Arc<dyn AuditStatsRepository>,
}

impl AuditStatsRecorder {
    /// Creates a recorder over the provided repository.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditStatsRepository>) -> Self {
        Self { repository }
    }

    /// Stores finalized stats under their subscription and run id.
    pub async fn record(&self, stats: &AuditRunStats) -> AppResult<()> {
        if !stats.is_finished() {
            return Err(AppError::Validation(format!(
                "audit run '{}' for subscription '{}' is not finished",
                stats.run_id, stats.subscription_id
            )));
        }

        self.repository.upsert_run_stats(stats).await?;

        info!(
            subscription_id = %stats.subscription_id,
            run_id = %stats.run_id,
            resource_groups_total = stats.resource_groups_total,
            resource_groups_skipped = stats.resource_groups_skipped,
            resource_items_total = stats.resource_items_total,
            resource_items_with_updates = stats.resource_items_with_updates,
            resource_items_skipped = stats.resource_items_skipped,
            "audit run stats recorded"
        );

        Ok(())
    }

    /// Returns recent runs for one subscription, newest first.
    pub async fn recent_runs(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
    ) -> AppResult<Vec<AuditRunStats>> {
        self.repository
            .list_recent_runs(subscription_id, limit.clamp(1, MAX_RECENT_RUNS))
            .await
    }
}
