//! Application services and ports.

#![forbid(unsafe_code)]

mod api_version_resolver;
mod audit_stats_recorder;
mod invalid_type_registry;
mod tag_audit_service;
mod tag_sync_ports;
mod tag_update_dispatcher;

#[cfg(test)]
mod test_support;

pub use api_version_resolver::ApiVersionResolver;
pub use audit_stats_recorder::AuditStatsRecorder;
pub use invalid_type_registry::{InvalidTypeRegistry, InvalidTypeSnapshot};
pub use tag_audit_service::{AuditRunSummary, TagAuditService, VersionLookupFailurePolicy};
pub use tag_sync_ports::{
    AuditConfigRepository, AuditStatsRepository, InvalidResourceTypeRepository,
    ProviderResourceType, QueuedTagUpdate, ResourceGraphProvider, ResourceTagPatch,
    TagUpdateQueue, TokenSource,
};
pub use tag_update_dispatcher::{DispatchBatchReport, TagUpdateDispatcher, TagUpdateOutcome};
