use std::sync::Arc;

use tagsync_core::{AppError, AppResult};
use tagsync_domain::{TagUpdateRequest, apply_tag_updates};
use tracing::{info, warn};

use crate::invalid_type_registry::InvalidTypeRegistry;
use crate::tag_sync_ports::{ResourceGraphProvider, ResourceTagPatch, TagUpdateQueue};

mod batch;

pub use batch::DispatchBatchReport;

/// Terminal result of applying one tag update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagUpdateOutcome {
    /// Tags were written to the resource.
    Applied,
    /// The resource type was already registered invalid, nothing was written.
    SkippedInvalidType,
    /// The write was rejected and the type is now registered invalid.
    Failed {
        /// Failure message kept in the registry.
        message: String,
    },
}

/// Apply stage: writes requested tags and memoizes rejected resource types.
#[derive(Clone)]
pub struct TagUpdateDispatcher {
    resource_graph: Arc<dyn ResourceGraphProvider>,
    invalid_types: InvalidTypeRegistry,
    queue: Arc<dyn TagUpdateQueue>,
}

impl TagUpdateDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        resource_graph: Arc<dyn ResourceGraphProvider>,
        invalid_types: InvalidTypeRegistry,
        queue: Arc<dyn TagUpdateQueue>,
    ) -> Self {
        Self {
            resource_graph,
            invalid_types,
            queue,
        }
    }

    /// Applies one request.
    ///
    /// A rejected write is a terminal outcome, not an error. Errors are
    /// returned only when the outcome could not be settled: the credential
    /// was refused or the registry could not be read or written.
    pub async fn apply(&self, request: &TagUpdateRequest) -> AppResult<TagUpdateOutcome> {
        let resource_type = request.resource_type.as_str();
        if self.invalid_types.is_invalid(resource_type).await? {
            info!(
                resource_id = %request.resource_id,
                resource_type = %resource_type,
                "skipping tag update for resource type registered invalid"
            );
            return Ok(TagUpdateOutcome::SkippedInvalidType);
        }

        match self.write_tags(request).await {
            Ok(()) => {
                info!(
                    resource_id = %request.resource_id,
                    tags = request.tags.len(),
                    "tags applied to resource"
                );
                Ok(TagUpdateOutcome::Applied)
            }
            Err(error @ AppError::Unauthorized(_)) => Err(error),
            Err(error) => {
                let message = error.to_string();
                warn!(
                    resource_id = %request.resource_id,
                    resource_type = %resource_type,
                    error = %message,
                    "failed to apply tags to resource"
                );

                if !self.invalid_types.is_invalid(resource_type).await? {
                    self.invalid_types
                        .mark_invalid(resource_type, message.as_str(), &request.subscription_id)
                        .await?;
                }

                Ok(TagUpdateOutcome::Failed { message })
            }
        }
    }

    async fn write_tags(&self, request: &TagUpdateRequest) -> AppResult<()> {
        let current = self
            .resource_graph
            .get_resource(request.resource_id.as_str(), request.api_version.as_str())
            .await?;

        let location = if current.location.trim().is_empty() {
            request.location.clone()
        } else {
            current.location
        };

        self.resource_graph
            .update_resource_tags(
                request.resource_id.as_str(),
                request.api_version.as_str(),
                ResourceTagPatch {
                    location,
                    tags: apply_tag_updates(current.tags.as_ref(), &request.tags),
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests;
