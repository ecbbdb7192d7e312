use std::sync::Arc;

use tagsync_application::{AuditStatsRecorder, TagAuditService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub audit_service: TagAuditService,
    pub stats_recorder: AuditStatsRecorder,
    pub trigger_token: Option<Arc<str>>,
}
