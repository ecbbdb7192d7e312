//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod audit;
mod resource;
mod tags;

pub use audit::{
    AuditConfig, AuditRunStats, InvalidResourceTypeRecord, PLACEHOLDER_PARTITION,
    PLACEHOLDER_REQUIRED_TAGS, PLACEHOLDER_SUBSCRIPTION_ID, TagUpdateRequest,
};
pub use resource::{ResourceGroupView, ResourceType, ResourceView};
pub use tags::{
    RequiredTagSet, TagMap, apply_tag_updates, compute_required_tags, compute_tag_updates,
};
