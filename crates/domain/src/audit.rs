use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tagsync_core::{AppError, AppResult, SubscriptionId};
use uuid::Uuid;

use crate::tags::TagMap;

/// Subscription id written into the seeded placeholder configuration.
pub const PLACEHOLDER_SUBSCRIPTION_ID: &str = "enter_valid_subscription_id";

/// Required tag list written into the seeded placeholder configuration.
pub const PLACEHOLDER_REQUIRED_TAGS: &str = "comma,separated,tag,list,here";

/// Partition key of the seeded placeholder configuration.
pub const PLACEHOLDER_PARTITION: &str = "init";

/// Audit configuration for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    subscription_id: SubscriptionId,
    required_tag_names: Vec<String>,
}

impl AuditConfig {
    /// Creates a validated configuration.
    ///
    /// Tag names are trimmed, empty names dropped and duplicates removed while
    /// keeping the first occurrence.
    pub fn new(
        subscription_id: SubscriptionId,
        required_tag_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> AppResult<Self> {
        let mut names: Vec<String> = Vec::new();
        for name in required_tag_names {
            let name = name.into().trim().to_owned();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }

        if names.is_empty() {
            return Err(AppError::Validation(format!(
                "audit config for subscription '{subscription_id}' requires at least one tag name"
            )));
        }

        Ok(Self {
            subscription_id,
            required_tag_names: names,
        })
    }

    /// Creates a configuration from the stored comma-separated tag list.
    pub fn from_csv(subscription_id: &str, required_tags: &str) -> AppResult<Self> {
        Self::new(
            SubscriptionId::new(subscription_id)?,
            required_tags.split(','),
        )
    }

    /// Returns the first-run placeholder operators are expected to replace.
    pub fn placeholder() -> AppResult<Self> {
        Self::from_csv(PLACEHOLDER_SUBSCRIPTION_ID, PLACEHOLDER_REQUIRED_TAGS)
    }

    /// Returns true when the config still carries the placeholder subscription.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.subscription_id.as_str() == PLACEHOLDER_SUBSCRIPTION_ID
    }

    /// Returns the audited subscription.
    #[must_use]
    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription_id
    }

    /// Returns required tag names in configured order.
    #[must_use]
    pub fn required_tag_names(&self) -> &[String] {
        self.required_tag_names.as_slice()
    }

    /// Returns the storage form of the required tag list.
    #[must_use]
    pub fn required_tags_csv(&self) -> String {
        self.required_tag_names.join(",")
    }
}

/// Tag write handed from the audit stage to the apply stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagUpdateRequest {
    /// Fully qualified resource identifier.
    pub resource_id: String,
    /// API version resolved for the resource type.
    pub api_version: String,
    /// Resource region.
    pub location: String,
    /// Complete tag mapping to write, existing tags merged with the delta.
    pub tags: TagMap,
    /// Fully qualified resource type.
    pub resource_type: String,
    /// Subscription the resource belongs to.
    pub subscription_id: SubscriptionId,
}

/// Resource type known to reject tag writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidResourceTypeRecord {
    /// Fully qualified resource type.
    pub resource_type: String,
    /// Failure message captured from the rejected write.
    pub message: String,
    /// Partition the record was written under.
    pub subscription_id: SubscriptionId,
    /// Row identifier kept for manual cleanup.
    pub unique_id: Uuid,
    /// Time the failure was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl InvalidResourceTypeRecord {
    /// Creates a record for a freshly observed write failure.
    #[must_use]
    pub fn new(
        resource_type: impl Into<String>,
        message: impl Into<String>,
        subscription_id: SubscriptionId,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            message: message.into(),
            subscription_id,
            unique_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
        }
    }
}

/// Counters collected during one subscription audit pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRunStats {
    /// Audited subscription.
    pub subscription_id: SubscriptionId,
    /// Run identifier, unique per pass.
    pub run_id: Uuid,
    /// Pass start time.
    pub job_start: DateTime<Utc>,
    /// Pass end time, set when the pass is finalized.
    pub job_end: Option<DateTime<Utc>>,
    /// Resource groups listed for the subscription.
    pub resource_groups_total: u32,
    /// Groups skipped for missing required tags.
    pub resource_groups_skipped: u32,
    /// Resources listed across qualifying groups.
    pub resource_items_total: u32,
    /// Resources for which an update request was emitted.
    pub resource_items_with_updates: u32,
    /// Resources needing no update or of an invalid type.
    pub resource_items_skipped: u32,
}

impl AuditRunStats {
    /// Starts counters for a new pass.
    #[must_use]
    pub fn start(subscription_id: SubscriptionId, job_start: DateTime<Utc>) -> Self {
        Self {
            subscription_id,
            run_id: Uuid::new_v4(),
            job_start,
            job_end: None,
            resource_groups_total: 0,
            resource_groups_skipped: 0,
            resource_items_total: 0,
            resource_items_with_updates: 0,
            resource_items_skipped: 0,
        }
    }

    /// Adds listed resources of one qualifying group.
    pub fn record_items_listed(&mut self, count: usize) {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        self.resource_items_total = self.resource_items_total.saturating_add(count);
    }

    /// Counts one group skipped for missing tags.
    pub fn record_group_skipped(&mut self) {
        self.resource_groups_skipped = self.resource_groups_skipped.saturating_add(1);
    }

    /// Counts one emitted update request.
    pub fn record_item_updated(&mut self) {
        self.resource_items_with_updates = self.resource_items_with_updates.saturating_add(1);
    }

    /// Counts one resource left untouched.
    pub fn record_item_skipped(&mut self) {
        self.resource_items_skipped = self.resource_items_skipped.saturating_add(1);
    }

    /// Marks the pass finished.
    pub fn finish(&mut self, job_end: DateTime<Utc>) {
        self.job_end = Some(job_end);
    }

    /// Returns true once the pass has been finalized.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.job_end.is_some()
    }
}
