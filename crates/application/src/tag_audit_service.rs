use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tagsync_core::{AppError, AppResult, SubscriptionId};
use tagsync_domain::{AuditConfig, AuditRunStats, PLACEHOLDER_PARTITION};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::api_version_resolver::ApiVersionResolver;
use crate::audit_stats_recorder::AuditStatsRecorder;
use crate::invalid_type_registry::{InvalidTypeRegistry, InvalidTypeSnapshot};
use crate::tag_sync_ports::{AuditConfigRepository, ResourceGraphProvider, TagUpdateQueue};

mod subscription;

/// Reaction to an API version lookup failure while walking a resource group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionLookupFailurePolicy {
    /// Stop visiting the remaining resources of the current group.
    #[default]
    AbortGroup,
    /// Skip only the failing resource and continue with the group.
    SkipResource,
}

impl VersionLookupFailurePolicy {
    /// Returns stable configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AbortGroup => "abort_group",
            Self::SkipResource => "skip_resource",
        }
    }

    /// Parses configuration value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "abort_group" => Ok(Self::AbortGroup),
            "skip_resource" => Ok(Self::SkipResource),
            _ => Err(AppError::Validation(format!(
                "unknown version lookup failure policy '{value}'"
            ))),
        }
    }
}

/// Result of one full audit invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditRunSummary {
    /// True when the configuration store was empty and a placeholder was seeded.
    pub bootstrapped: bool,
    /// Finalized stats, one per audited subscription.
    pub runs: Vec<AuditRunStats>,
    /// Subscriptions whose pass stopped early on a listing failure.
    pub failed_subscriptions: Vec<SubscriptionId>,
}

/// Audits resource groups against required tags and emits tag update requests.
#[derive(Clone)]
pub struct TagAuditService {
    config_repository: Arc<dyn AuditConfigRepository>,
    resource_graph: Arc<dyn ResourceGraphProvider>,
    api_versions: Arc<ApiVersionResolver>,
    invalid_types: InvalidTypeRegistry,
    queue: Arc<dyn TagUpdateQueue>,
    stats_recorder: AuditStatsRecorder,
    version_failure_policy: VersionLookupFailurePolicy,
    run_lock: Arc<Mutex<()>>,
}

impl TagAuditService {
    /// Creates an audit service.
    #[must_use]
    pub fn new(
        config_repository: Arc<dyn AuditConfigRepository>,
        resource_graph: Arc<dyn ResourceGraphProvider>,
        api_versions: Arc<ApiVersionResolver>,
        invalid_types: InvalidTypeRegistry,
        queue: Arc<dyn TagUpdateQueue>,
        stats_recorder: AuditStatsRecorder,
    ) -> Self {
        Self {
            config_repository,
            resource_graph,
            api_versions,
            invalid_types,
            queue,
            stats_recorder,
            version_failure_policy: VersionLookupFailurePolicy::default(),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Overrides the reaction to API version lookup failures.
    #[must_use]
    pub fn with_version_failure_policy(mut self, policy: VersionLookupFailurePolicy) -> Self {
        self.version_failure_policy = policy;
        self
    }

    /// Runs one audit pass over every configured subscription.
    ///
    /// Passes are serialized; a call made while another pass runs waits for it.
    pub async fn run_audit(&self) -> AppResult<AuditRunSummary> {
        let _guard = self.run_lock.lock().await;

        let configs = self.config_repository.list_configs().await?;
        if configs.is_empty() {
            self.seed_placeholder_config().await?;
            return Ok(AuditRunSummary {
                bootstrapped: true,
                ..AuditRunSummary::default()
            });
        }

        let invalid_types = self.invalid_types.snapshot().await?;
        info!(
            subscriptions = configs.len(),
            invalid_types = invalid_types.len(),
            version_failure_policy = self.version_failure_policy.as_str(),
            "starting subscription audit"
        );

        let mut summary = AuditRunSummary::default();
        for config in configs {
            if config.is_placeholder() {
                warn!("audit config still holds the placeholder subscription, skipping it");
                continue;
            }

            let (stats, failure) = self.audit_subscription(&config, &invalid_types).await;
            if let Err(error) = self.stats_recorder.record(&stats).await {
                error!(
                    subscription_id = %config.subscription_id(),
                    run_id = %stats.run_id,
                    error = %error,
                    "failed to record audit run stats"
                );
            }

            if failure.is_some() {
                summary
                    .failed_subscriptions
                    .push(config.subscription_id().clone());
            }
            summary.runs.push(stats);
        }

        Ok(summary)
    }

    async fn audit_subscription(
        &self,
        config: &AuditConfig,
        invalid_types: &InvalidTypeSnapshot,
    ) -> (AuditRunStats, Option<AppError>) {
        let subscription_id = config.subscription_id();
        let mut stats = AuditRunStats::start(subscription_id.clone(), Utc::now());

        let failure = match self
            .walk_resource_groups(config, invalid_types, &mut stats)
            .await
        {
            Ok(()) => {
                info!(
                    subscription_id = %subscription_id,
                    resource_groups_total = stats.resource_groups_total,
                    resource_items_with_updates = stats.resource_items_with_updates,
                    "completed audit of subscription"
                );
                None
            }
            Err(error) => {
                error!(
                    subscription_id = %subscription_id,
                    error = %error,
                    "failure processing resource groups for subscription"
                );
                Some(error)
            }
        };

        stats.finish(Utc::now());
        (stats, failure)
    }

    async fn seed_placeholder_config(&self) -> AppResult<()> {
        self.config_repository
            .upsert_config(PLACEHOLDER_PARTITION, AuditConfig::placeholder()?)
            .await?;

        info!("first run for new deployment, populate the audit configuration store");
        Ok(())
    }
}
