use std::time::Duration;

use tagsync_application::TagAuditService;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Runs audit passes on a fixed period until the process exits.
pub async fn run_audit_timer(
    audit_service: TagAuditService,
    audit_interval: Duration,
    run_on_start: bool,
) {
    let mut ticker = tokio::time::interval(audit_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if !run_on_start {
        ticker.tick().await;
    }

    loop {
        ticker.tick().await;

        match audit_service.run_audit().await {
            Ok(summary) if summary.bootstrapped => {
                info!("audit configuration was empty, placeholder seeded");
            }
            Ok(summary) => {
                info!(
                    audited_subscriptions = summary.runs.len(),
                    failed_subscriptions = summary.failed_subscriptions.len(),
                    "scheduled audit pass finished"
                );
            }
            Err(error) => {
                error!(error = %error, "scheduled audit pass failed");
            }
        }
    }
}
