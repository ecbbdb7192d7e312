use std::collections::HashSet;
use std::sync::Arc;

use tagsync_core::{AppResult, SubscriptionId};
use tagsync_domain::InvalidResourceTypeRecord;
use tracing::warn;

use crate::tag_sync_ports::InvalidResourceTypeRepository;

/// Registry of resource types that rejected tag writes.
///
/// Types are never expired automatically; removing a record is a manual
/// operation on the backing store.
#[derive(Clone)]
pub struct InvalidTypeRegistry {
    repository: Arc<dyn InvalidResourceTypeRepository>,
}

impl InvalidTypeRegistry {
    /// Creates a registry over the provided repository.
    #[must_use]
    pub fn new(repository: Arc<dyn InvalidResourceTypeRepository>) -> Self {
        Self { repository }
    }

    /// Returns true when the type has a registered failure.
    pub async fn is_invalid(&self, resource_type: &str) -> AppResult<bool> {
        Ok(self
            .repository
            .find_invalid_type(resource_type)
            .await?
            .is_some())
    }

    /// Registers the type as invalid, replacing any prior record for the key.
    pub async fn mark_invalid(
        &self,
        resource_type: &str,
        message: &str,
        subscription_id: &SubscriptionId,
    ) -> AppResult<()> {
        self.repository
            .upsert_invalid_type(InvalidResourceTypeRecord::new(
                resource_type,
                message,
                subscription_id.clone(),
            ))
            .await?;

        warn!(
            resource_type = %resource_type,
            subscription_id = %subscription_id,
            message = %message,
            "resource type registered as invalid for tagging"
        );

        Ok(())
    }

    /// Loads the registered types once for a full audit pass.
    pub async fn snapshot(&self) -> AppResult<InvalidTypeSnapshot> {
        let records = self.repository.list_invalid_types().await?;
        Ok(InvalidTypeSnapshot::from_types(
            records.iter().map(|record| record.resource_type.as_str()),
        ))
    }
}

/// Point-in-time view of the registry used during one audit pass.
#[derive(Debug, Clone, Default)]
pub struct InvalidTypeSnapshot {
    types: HashSet<String>,
}

impl InvalidTypeSnapshot {
    /// Builds a snapshot from resource type names.
    pub fn from_types<'a>(types: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            types: types
                .into_iter()
                .map(str::to_ascii_lowercase)
                .collect(),
        }
    }

    /// Returns true when the type was registered at snapshot time.
    #[must_use]
    pub fn is_invalid(&self, resource_type: &str) -> bool {
        self.types.contains(&resource_type.to_ascii_lowercase())
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true when no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
