use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tagsync_application::{
    AuditConfigRepository, AuditStatsRepository, InvalidResourceTypeRepository,
};
use tagsync_core::{AppResult, SubscriptionId};
use tagsync_domain::{AuditConfig, AuditRunStats, InvalidResourceTypeRecord};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory record store for audit configuration, invalid types and run stats.
#[derive(Debug, Default)]
pub struct InMemoryTagSyncRepository {
    configs: RwLock<BTreeMap<(String, SubscriptionId), AuditConfig>>,
    invalid_types: RwLock<HashMap<(SubscriptionId, String), InvalidResourceTypeRecord>>,
    run_stats: RwLock<HashMap<(SubscriptionId, Uuid), AuditRunStats>>,
}

impl InMemoryTagSyncRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditConfigRepository for InMemoryTagSyncRepository {
    async fn list_configs(&self) -> AppResult<Vec<AuditConfig>> {
        Ok(self.configs.read().await.values().cloned().collect())
    }

    async fn upsert_config(&self, partition: &str, config: AuditConfig) -> AppResult<()> {
        self.configs.write().await.insert(
            (partition.to_owned(), config.subscription_id().clone()),
            config,
        );
        Ok(())
    }
}

#[async_trait]
impl InvalidResourceTypeRepository for InMemoryTagSyncRepository {
    async fn list_invalid_types(&self) -> AppResult<Vec<InvalidResourceTypeRecord>> {
        let mut records: Vec<InvalidResourceTypeRecord> =
            self.invalid_types.read().await.values().cloned().collect();
        records.sort_by(|left, right| left.recorded_at.cmp(&right.recorded_at));
        Ok(records)
    }

    async fn find_invalid_type(
        &self,
        resource_type: &str,
    ) -> AppResult<Option<InvalidResourceTypeRecord>> {
        Ok(self
            .invalid_types
            .read()
            .await
            .values()
            .find(|record| record.resource_type.eq_ignore_ascii_case(resource_type))
            .cloned())
    }

    async fn upsert_invalid_type(&self, record: InvalidResourceTypeRecord) -> AppResult<()> {
        self.invalid_types.write().await.insert(
            (record.subscription_id.clone(), record.resource_type.clone()),
            record,
        );
        Ok(())
    }
}

#[async_trait]
impl AuditStatsRepository for InMemoryTagSyncRepository {
    async fn upsert_run_stats(&self, stats: &AuditRunStats) -> AppResult<()> {
        self.run_stats
            .write()
            .await
            .insert((stats.subscription_id.clone(), stats.run_id), stats.clone());
        Ok(())
    }

    async fn list_recent_runs(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
    ) -> AppResult<Vec<AuditRunStats>> {
        let mut runs: Vec<AuditRunStats> = self
            .run_stats
            .read()
            .await
            .values()
            .filter(|stats| &stats.subscription_id == subscription_id)
            .cloned()
            .collect();
        runs.sort_by(|left, right| right.job_start.cmp(&left.job_start));
        runs.truncate(limit);
        Ok(runs)
    }
}
