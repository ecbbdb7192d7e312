use async_trait::async_trait;
use tagsync_core::{AppResult, SubscriptionId};
use tagsync_domain::{AuditConfig, AuditRunStats, InvalidResourceTypeRecord};

/// Repository port for per-subscription audit configuration.
#[async_trait]
pub trait AuditConfigRepository: Send + Sync {
    /// Lists every stored configuration.
    async fn list_configs(&self) -> AppResult<Vec<AuditConfig>>;

    /// Inserts or replaces one configuration under a partition.
    async fn upsert_config(&self, partition: &str, config: AuditConfig) -> AppResult<()>;
}

/// Repository port for resource types that rejected tag writes.
#[async_trait]
pub trait InvalidResourceTypeRepository: Send + Sync {
    /// Lists every registered type across partitions.
    async fn list_invalid_types(&self) -> AppResult<Vec<InvalidResourceTypeRecord>>;

    /// Returns one record for the type from any partition.
    async fn find_invalid_type(
        &self,
        resource_type: &str,
    ) -> AppResult<Option<InvalidResourceTypeRecord>>;

    /// Inserts or replaces the record keyed by partition and resource type.
    ///
    /// Concurrent calls for the same key must converge on one row.
    async fn upsert_invalid_type(&self, record: InvalidResourceTypeRecord) -> AppResult<()>;
}

/// Repository port for audit pass statistics.
#[async_trait]
pub trait AuditStatsRepository: Send + Sync {
    /// Inserts or replaces stats keyed by subscription and run id.
    async fn upsert_run_stats(&self, stats: &AuditRunStats) -> AppResult<()>;

    /// Lists the most recent runs for one subscription, newest first.
    async fn list_recent_runs(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
    ) -> AppResult<Vec<AuditRunStats>>;
}
