use std::collections::HashMap;
use std::sync::Arc;

use tagsync_core::{AppError, AppResult, SubscriptionId};
use tagsync_domain::ResourceType;
use tokio::sync::RwLock;
use tracing::debug;

use crate::tag_sync_ports::ResourceGraphProvider;

/// Resolves the API version used to address resources of a given type.
///
/// Provider metadata is fetched once per type and kept for the lifetime of
/// the resolver instance.
pub struct ApiVersionResolver {
    resource_graph: Arc<dyn ResourceGraphProvider>,
    cache: RwLock<HashMap<String, String>>,
}

impl ApiVersionResolver {
    /// Creates a resolver with an empty cache.
    #[must_use]
    pub fn new(resource_graph: Arc<dyn ResourceGraphProvider>) -> Self {
        Self {
            resource_graph,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the first API version the provider lists for the type.
    pub async fn resolve(
        &self,
        subscription_id: &SubscriptionId,
        resource_type: &str,
    ) -> AppResult<String> {
        let parsed = ResourceType::parse(resource_type)
            .map_err(|error| AppError::ProviderLookup(error.to_string()))?;
        let cache_key = cache_key(&parsed);

        if let Some(api_version) = self.cache.read().await.get(cache_key.as_str()) {
            return Ok(api_version.clone());
        }

        let provider_types = self
            .resource_graph
            .list_provider_resource_types(subscription_id, parsed.namespace())
            .await
            .map_err(|error| {
                AppError::ProviderLookup(format!(
                    "failed to load provider '{}': {error}",
                    parsed.namespace()
                ))
            })?;

        let api_version = provider_types
            .iter()
            .find(|entry| entry.resource_type.eq_ignore_ascii_case(parsed.short_name()))
            .ok_or_else(|| {
                AppError::ProviderLookup(format!(
                    "provider '{}' does not publish resource type '{}'",
                    parsed.namespace(),
                    parsed.short_name()
                ))
            })?
            .api_versions
            .first()
            .cloned()
            .ok_or_else(|| {
                AppError::ProviderLookup(format!(
                    "resource type '{parsed}' has no published api versions"
                ))
            })?;

        debug!(
            resource_type = %parsed,
            api_version = %api_version,
            "resolved resource type api version"
        );

        self.cache
            .write()
            .await
            .entry(cache_key)
            .or_insert_with(|| api_version.clone());

        Ok(api_version)
    }

    /// Returns the number of cached type entries.
    pub async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }
}

fn cache_key(resource_type: &ResourceType) -> String {
    format!(
        "{}/{}",
        resource_type.namespace().to_ascii_lowercase(),
        resource_type.short_name().to_ascii_lowercase()
    )
}
