use serde::Serialize;
use tracing::error;

use super::*;

/// Counters for one received batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchBatchReport {
    /// Messages received from the queue.
    pub received: usize,
    /// Requests written to their resource.
    pub applied: usize,
    /// Requests skipped for a type already registered invalid.
    pub skipped: usize,
    /// Requests whose write was rejected.
    pub failed: usize,
    /// Messages left unacknowledged for redelivery.
    pub deferred: usize,
}

impl TagUpdateDispatcher {
    /// Receives up to `limit` messages, applies them and acknowledges settled ones.
    pub async fn process_batch(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<DispatchBatchReport> {
        if worker_id.trim().is_empty() {
            return Err(AppError::Validation(
                "worker_id must not be empty".to_owned(),
            ));
        }

        if limit == 0 {
            return Err(AppError::Validation(
                "limit must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let deliveries = self.queue.receive(worker_id, limit, lease_seconds).await?;
        let mut report = DispatchBatchReport {
            received: deliveries.len(),
            ..DispatchBatchReport::default()
        };

        for delivery in deliveries {
            let outcome = match self.apply(&delivery.request).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    error!(
                        worker_id = %worker_id,
                        delivery_id = %delivery.delivery_id,
                        delivery_count = delivery.delivery_count,
                        resource_id = %delivery.request.resource_id,
                        error = %error,
                        "tag update left for redelivery"
                    );
                    report.deferred += 1;
                    continue;
                }
            };

            match outcome {
                TagUpdateOutcome::Applied => report.applied += 1,
                TagUpdateOutcome::SkippedInvalidType => report.skipped += 1,
                TagUpdateOutcome::Failed { .. } => report.failed += 1,
            }

            if let Err(error) = self.queue.acknowledge(&delivery).await {
                error!(
                    worker_id = %worker_id,
                    delivery_id = %delivery.delivery_id,
                    error = %error,
                    "failed to acknowledge tag update"
                );
            }
        }

        Ok(report)
    }
}
