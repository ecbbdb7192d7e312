use async_trait::async_trait;
use tagsync_core::{AppResult, SubscriptionId};
use tagsync_domain::{ResourceGroupView, ResourceView, TagMap};

/// Resource type entry from provider metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResourceType {
    /// Type name below the provider namespace, e.g. `storageAccounts`.
    pub resource_type: String,
    /// Supported API versions in provider listing order.
    pub api_versions: Vec<String>,
}

/// Tag-only update body.
///
/// Carries nothing besides location and tags because several resource types
/// reject updates that echo back their other properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTagPatch {
    /// Resource region, required by the management API on writes.
    pub location: String,
    /// Complete tag mapping to store on the resource.
    pub tags: TagMap,
}

/// Port for resource listing and tag writes against the management API.
#[async_trait]
pub trait ResourceGraphProvider: Send + Sync {
    /// Lists every resource group in a subscription.
    async fn list_resource_groups(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<Vec<ResourceGroupView>>;

    /// Lists resources inside one resource group.
    async fn list_resources(
        &self,
        subscription_id: &SubscriptionId,
        resource_group: &str,
    ) -> AppResult<Vec<ResourceView>>;

    /// Lists resource types and API versions published by one provider namespace.
    async fn list_provider_resource_types(
        &self,
        subscription_id: &SubscriptionId,
        provider_namespace: &str,
    ) -> AppResult<Vec<ProviderResourceType>>;

    /// Fetches one resource by identifier.
    async fn get_resource(&self, resource_id: &str, api_version: &str)
    -> AppResult<ResourceView>;

    /// Writes tags to one resource.
    async fn update_resource_tags(
        &self,
        resource_id: &str,
        api_version: &str,
        patch: ResourceTagPatch,
    ) -> AppResult<()>;
}
