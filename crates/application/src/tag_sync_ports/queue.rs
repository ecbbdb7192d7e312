use async_trait::async_trait;
use tagsync_core::AppResult;
use tagsync_domain::TagUpdateRequest;

/// One delivered queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTagUpdate {
    /// Transport-specific receipt used for acknowledgment.
    pub delivery_id: String,
    /// Decoded request payload.
    pub request: TagUpdateRequest,
    /// Number of times the message has been delivered, including this one.
    pub delivery_count: u32,
}

/// At-least-once work queue between the audit and apply stages.
#[async_trait]
pub trait TagUpdateQueue: Send + Sync {
    /// Publishes one request.
    async fn enqueue(&self, request: &TagUpdateRequest) -> AppResult<()>;

    /// Receives up to `limit` messages, hidden from other workers for the lease.
    ///
    /// Messages not acknowledged before the lease ends are delivered again.
    async fn receive(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<QueuedTagUpdate>>;

    /// Removes one delivered message permanently.
    async fn acknowledge(&self, delivery: &QueuedTagUpdate) -> AppResult<()>;
}
