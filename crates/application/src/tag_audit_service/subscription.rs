use tagsync_domain::{
    RequiredTagSet, ResourceGroupView, TagUpdateRequest, apply_tag_updates, compute_required_tags,
    compute_tag_updates,
};
use tracing::debug;

use super::*;

impl TagAuditService {
    pub(super) async fn walk_resource_groups(
        &self,
        config: &AuditConfig,
        invalid_types: &InvalidTypeSnapshot,
        stats: &mut AuditRunStats,
    ) -> AppResult<()> {
        let subscription_id = config.subscription_id();
        let resource_groups = self
            .resource_graph
            .list_resource_groups(subscription_id)
            .await?;
        stats.resource_groups_total = u32::try_from(resource_groups.len()).unwrap_or(u32::MAX);

        for resource_group in resource_groups {
            debug!(
                subscription_id = %subscription_id,
                resource_group = %resource_group.name,
                "auditing resource group"
            );

            let required = compute_required_tags(
                resource_group.tags.as_ref(),
                config.required_tag_names(),
            );
            if !required.qualifies_for(config.required_tag_names()) {
                warn!(
                    subscription_id = %subscription_id,
                    resource_group = %resource_group.name,
                    present = required.len(),
                    required = config.required_tag_names().len(),
                    "resource group does not have required tags"
                );
                stats.record_group_skipped();
                continue;
            }

            self.audit_resource_group(
                subscription_id,
                &resource_group,
                &required,
                invalid_types,
                stats,
            )
            .await?;
        }

        Ok(())
    }

    async fn audit_resource_group(
        &self,
        subscription_id: &SubscriptionId,
        resource_group: &ResourceGroupView,
        required: &RequiredTagSet,
        invalid_types: &InvalidTypeSnapshot,
        stats: &mut AuditRunStats,
    ) -> AppResult<()> {
        let resources = self
            .resource_graph
            .list_resources(subscription_id, resource_group.name.as_str())
            .await?;
        stats.record_items_listed(resources.len());

        for resource in resources {
            if invalid_types.is_invalid(resource.resource_type.as_str()) {
                warn!(
                    resource_id = %resource.id,
                    resource_type = %resource.resource_type,
                    "resource type does not support tagging"
                );
                stats.record_item_skipped();
                continue;
            }

            let api_version = match self
                .api_versions
                .resolve(subscription_id, resource.resource_type.as_str())
                .await
            {
                Ok(api_version) => api_version,
                Err(error) => {
                    error!(
                        subscription_id = %subscription_id,
                        resource_group = %resource_group.name,
                        resource_id = %resource.id,
                        resource_type = %resource.resource_type,
                        policy = self.version_failure_policy.as_str(),
                        error = %error,
                        "failed to resolve api version"
                    );
                    match self.version_failure_policy {
                        VersionLookupFailurePolicy::AbortGroup => break,
                        VersionLookupFailurePolicy::SkipResource => continue,
                    }
                }
            };

            let updates = compute_tag_updates(resource.tags.as_ref(), required);
            if updates.is_empty() {
                stats.record_item_skipped();
                continue;
            }

            let request = TagUpdateRequest {
                tags: apply_tag_updates(resource.tags.as_ref(), &updates),
                resource_id: resource.id,
                api_version,
                location: resource.location,
                resource_type: resource.resource_type,
                subscription_id: subscription_id.clone(),
            };

            match self.queue.enqueue(&request).await {
                Ok(()) => {
                    stats.record_item_updated();
                    info!(
                        resource_id = %request.resource_id,
                        changed_tags = updates.len(),
                        "requesting tags for resource"
                    );
                }
                Err(error) => {
                    error!(
                        resource_id = %request.resource_id,
                        error = %error,
                        "failed to enqueue tag update request"
                    );
                }
            }
        }

        Ok(())
    }
}
