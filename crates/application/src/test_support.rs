use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tagsync_core::{AppError, AppResult, SubscriptionId};
use tagsync_domain::{
    AuditConfig, AuditRunStats, InvalidResourceTypeRecord, ResourceGroupView, ResourceView,
    TagMap, TagUpdateRequest,
};
use tokio::sync::Mutex;

use crate::tag_sync_ports::{
    AuditConfigRepository, AuditStatsRepository, InvalidResourceTypeRepository,
    ProviderResourceType, QueuedTagUpdate, ResourceGraphProvider, ResourceTagPatch,
    TagUpdateQueue,
};

pub(crate) fn tags(pairs: &[(&str, &str)]) -> TagMap {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect()
}

#[derive(Default)]
pub(crate) struct FakeResourceGraph {
    groups: Mutex<HashMap<String, Vec<ResourceGroupView>>>,
    resources: Mutex<HashMap<(String, String), Vec<ResourceView>>>,
    providers: Mutex<HashMap<String, Vec<ProviderResourceType>>>,
    failing_subscriptions: Mutex<HashSet<String>>,
    rejected_types: Mutex<HashSet<String>>,
    provider_lookups: Mutex<usize>,
    updates: Mutex<Vec<(String, String, ResourceTagPatch)>>,
}

impl FakeResourceGraph {
    pub(crate) async fn add_group(&self, subscription_id: &str, name: &str, group_tags: TagMap) {
        self.groups
            .lock()
            .await
            .entry(subscription_id.to_owned())
            .or_default()
            .push(ResourceGroupView {
                name: name.to_owned(),
                tags: Some(group_tags),
            });
    }

    pub(crate) async fn add_resource(
        &self,
        subscription_id: &str,
        group: &str,
        name: &str,
        resource_type: &str,
        resource_tags: Option<TagMap>,
    ) -> String {
        let id = format!(
            "/subscriptions/{subscription_id}/resourceGroups/{group}/providers/{resource_type}/{name}"
        );
        self.resources
            .lock()
            .await
            .entry((subscription_id.to_owned(), group.to_owned()))
            .or_default()
            .push(ResourceView {
                id: id.clone(),
                resource_type: resource_type.to_owned(),
                location: "westeurope".to_owned(),
                tags: resource_tags,
            });
        id
    }

    pub(crate) async fn add_provider(&self, namespace: &str, types: Vec<ProviderResourceType>) {
        self.providers
            .lock()
            .await
            .insert(namespace.to_owned(), types);
    }

    pub(crate) async fn add_type(&self, namespace: &str, short_name: &str, api_version: &str) {
        self.providers
            .lock()
            .await
            .entry(namespace.to_owned())
            .or_default()
            .push(ProviderResourceType {
                resource_type: short_name.to_owned(),
                api_versions: vec![api_version.to_owned()],
            });
    }

    pub(crate) async fn fail_subscription(&self, subscription_id: &str) {
        self.failing_subscriptions
            .lock()
            .await
            .insert(subscription_id.to_owned());
    }

    pub(crate) async fn reject_writes_for(&self, resource_type: &str) {
        self.rejected_types
            .lock()
            .await
            .insert(resource_type.to_owned());
    }

    pub(crate) async fn provider_lookups(&self) -> usize {
        *self.provider_lookups.lock().await
    }

    pub(crate) async fn updates(&self) -> Vec<(String, String, ResourceTagPatch)> {
        self.updates.lock().await.clone()
    }

    async fn find_resource(&self, resource_id: &str) -> Option<ResourceView> {
        self.resources
            .lock()
            .await
            .values()
            .flatten()
            .find(|resource| resource.id == resource_id)
            .cloned()
    }
}

#[async_trait]
impl ResourceGraphProvider for FakeResourceGraph {
    async fn list_resource_groups(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<Vec<ResourceGroupView>> {
        if self
            .failing_subscriptions
            .lock()
            .await
            .contains(subscription_id.as_str())
        {
            return Err(AppError::ResourceGraph(format!(
                "simulated listing failure for '{subscription_id}'"
            )));
        }

        Ok(self
            .groups
            .lock()
            .await
            .get(subscription_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn list_resources(
        &self,
        subscription_id: &SubscriptionId,
        resource_group: &str,
    ) -> AppResult<Vec<ResourceView>> {
        Ok(self
            .resources
            .lock()
            .await
            .get(&(subscription_id.as_str().to_owned(), resource_group.to_owned()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_provider_resource_types(
        &self,
        _subscription_id: &SubscriptionId,
        provider_namespace: &str,
    ) -> AppResult<Vec<ProviderResourceType>> {
        *self.provider_lookups.lock().await += 1;
        self.providers
            .lock()
            .await
            .get(provider_namespace)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("provider '{provider_namespace}'")))
    }

    async fn get_resource(
        &self,
        resource_id: &str,
        _api_version: &str,
    ) -> AppResult<ResourceView> {
        self.find_resource(resource_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}'")))
    }

    async fn update_resource_tags(
        &self,
        resource_id: &str,
        api_version: &str,
        patch: ResourceTagPatch,
    ) -> AppResult<()> {
        let Some(resource) = self.find_resource(resource_id).await else {
            return Err(AppError::NotFound(format!("resource '{resource_id}'")));
        };

        if self
            .rejected_types
            .lock()
            .await
            .contains(resource.resource_type.as_str())
        {
            return Err(AppError::TagWrite(format!(
                "resource type '{}' does not support tags",
                resource.resource_type
            )));
        }

        {
            let mut resources = self.resources.lock().await;
            if let Some(stored) = resources
                .values_mut()
                .flatten()
                .find(|stored| stored.id == resource_id)
            {
                stored.tags = Some(patch.tags.clone());
            }
        }

        self.updates
            .lock()
            .await
            .push((resource_id.to_owned(), api_version.to_owned(), patch));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditConfigRepository {
    configs: Mutex<Vec<(String, AuditConfig)>>,
}

impl FakeAuditConfigRepository {
    pub(crate) async fn with_configs(configs: Vec<AuditConfig>) -> Self {
        let repository = Self::default();
        for config in configs {
            let partition = config.subscription_id().as_str().to_owned();
            repository.configs.lock().await.push((partition, config));
        }
        repository
    }

    pub(crate) async fn partitions(&self) -> Vec<String> {
        self.configs
            .lock()
            .await
            .iter()
            .map(|(partition, _)| partition.clone())
            .collect()
    }
}

#[async_trait]
impl AuditConfigRepository for FakeAuditConfigRepository {
    async fn list_configs(&self) -> AppResult<Vec<AuditConfig>> {
        Ok(self
            .configs
            .lock()
            .await
            .iter()
            .map(|(_, config)| config.clone())
            .collect())
    }

    async fn upsert_config(&self, partition: &str, config: AuditConfig) -> AppResult<()> {
        let mut configs = self.configs.lock().await;
        configs.retain(|(stored_partition, stored)| {
            stored_partition != partition || stored.subscription_id() != config.subscription_id()
        });
        configs.push((partition.to_owned(), config));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeInvalidTypeRepository {
    records: Mutex<HashMap<(SubscriptionId, String), InvalidResourceTypeRecord>>,
    fail_writes: Mutex<bool>,
}

impl FakeInvalidTypeRepository {
    pub(crate) async fn record_count(&self) -> usize {
        self.records.lock().await.len()
    }

    pub(crate) async fn fail_writes(&self) {
        *self.fail_writes.lock().await = true;
    }
}

#[async_trait]
impl InvalidResourceTypeRepository for FakeInvalidTypeRepository {
    async fn list_invalid_types(&self) -> AppResult<Vec<InvalidResourceTypeRecord>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn find_invalid_type(
        &self,
        resource_type: &str,
    ) -> AppResult<Option<InvalidResourceTypeRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .find(|record| record.resource_type == resource_type)
            .cloned())
    }

    async fn upsert_invalid_type(&self, record: InvalidResourceTypeRecord) -> AppResult<()> {
        if *self.fail_writes.lock().await {
            return Err(AppError::Internal(
                "simulated registry write failure".to_owned(),
            ));
        }

        self.records.lock().await.insert(
            (record.subscription_id.clone(), record.resource_type.clone()),
            record,
        );
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditStatsRepository {
    runs: Mutex<Vec<AuditRunStats>>,
}

impl FakeAuditStatsRepository {
    pub(crate) async fn all(&self) -> Vec<AuditRunStats> {
        self.runs.lock().await.clone()
    }
}

#[async_trait]
impl AuditStatsRepository for FakeAuditStatsRepository {
    async fn upsert_run_stats(&self, stats: &AuditRunStats) -> AppResult<()> {
        let mut runs = self.runs.lock().await;
        runs.retain(|stored| {
            stored.subscription_id != stats.subscription_id || stored.run_id != stats.run_id
        });
        runs.push(stats.clone());
        Ok(())
    }

    async fn list_recent_runs(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
    ) -> AppResult<Vec<AuditRunStats>> {
        let mut runs: Vec<AuditRunStats> = self
            .runs
            .lock()
            .await
            .iter()
            .filter(|stats| &stats.subscription_id == subscription_id)
            .cloned()
            .collect();
        runs.sort_by(|left, right| right.job_start.cmp(&left.job_start));
        runs.truncate(limit);
        Ok(runs)
    }
}

#[derive(Default)]
pub(crate) struct FakeTagUpdateQueue {
    pending: Mutex<Vec<QueuedTagUpdate>>,
    acknowledged: Mutex<Vec<String>>,
    next_delivery: Mutex<u64>,
}

impl FakeTagUpdateQueue {
    pub(crate) async fn pending_requests(&self) -> Vec<TagUpdateRequest> {
        self.pending
            .lock()
            .await
            .iter()
            .map(|delivery| delivery.request.clone())
            .collect()
    }

    pub(crate) async fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().await.clone()
    }

    pub(crate) async fn clear(&self) {
        self.pending.lock().await.clear();
    }
}

#[async_trait]
impl TagUpdateQueue for FakeTagUpdateQueue {
    async fn enqueue(&self, request: &TagUpdateRequest) -> AppResult<()> {
        let mut next_delivery = self.next_delivery.lock().await;
        *next_delivery += 1;
        self.pending.lock().await.push(QueuedTagUpdate {
            delivery_id: format!("delivery-{next_delivery}"),
            request: request.clone(),
            delivery_count: 0,
        });
        Ok(())
    }

    async fn receive(
        &self,
        _worker_id: &str,
        limit: usize,
        _lease_seconds: u32,
    ) -> AppResult<Vec<QueuedTagUpdate>> {
        let acknowledged = self.acknowledged.lock().await.clone();
        let mut pending = self.pending.lock().await;
        Ok(pending
            .iter_mut()
            .filter(|delivery| !acknowledged.contains(&delivery.delivery_id))
            .take(limit)
            .map(|delivery| {
                delivery.delivery_count += 1;
                delivery.clone()
            })
            .collect())
    }

    async fn acknowledge(&self, delivery: &QueuedTagUpdate) -> AppResult<()> {
        self.acknowledged
            .lock()
            .await
            .push(delivery.delivery_id.clone());
        self.pending
            .lock()
            .await
            .retain(|pending| pending.delivery_id != delivery.delivery_id);
        Ok(())
    }
}
