use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tagsync_application::{QueuedTagUpdate, TagUpdateQueue};
use tagsync_core::{AppError, AppResult};
use tagsync_domain::TagUpdateRequest;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process tag update queue with lease-based redelivery.
#[derive(Debug, Default)]
pub struct InMemoryTagUpdateQueue {
    messages: Mutex<VecDeque<StoredMessage>>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: Uuid,
    request: TagUpdateRequest,
    delivery_count: u32,
    lease: Option<Lease>,
}

#[derive(Debug, Clone)]
struct Lease {
    token: Uuid,
    expires_at: Instant,
}

impl InMemoryTagUpdateQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored messages, leased or not.
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    /// Returns true when no message is stored.
    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

#[async_trait]
impl TagUpdateQueue for InMemoryTagUpdateQueue {
    async fn enqueue(&self, request: &TagUpdateRequest) -> AppResult<()> {
        self.messages.lock().await.push_back(StoredMessage {
            id: Uuid::new_v4(),
            request: request.clone(),
            delivery_count: 0,
            lease: None,
        });
        Ok(())
    }

    async fn receive(
        &self,
        _worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<QueuedTagUpdate>> {
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(u64::from(lease_seconds));
        let mut messages = self.messages.lock().await;

        Ok(messages
            .iter_mut()
            .filter(|message| {
                message
                    .lease
                    .as_ref()
                    .is_none_or(|lease| lease.expires_at <= now)
            })
            .take(limit)
            .map(|message| {
                let token = Uuid::new_v4();
                message.delivery_count = message.delivery_count.saturating_add(1);
                message.lease = Some(Lease { token, expires_at });
                QueuedTagUpdate {
                    delivery_id: format!("{}:{token}", message.id),
                    request: message.request.clone(),
                    delivery_count: message.delivery_count,
                }
            })
            .collect())
    }

    async fn acknowledge(&self, delivery: &QueuedTagUpdate) -> AppResult<()> {
        let mut messages = self.messages.lock().await;
        let position = messages.iter().position(|message| {
            message
                .lease
                .as_ref()
                .is_some_and(|lease| format!("{}:{}", message.id, lease.token) == delivery.delivery_id)
        });

        match position {
            Some(position) => {
                messages.remove(position);
                Ok(())
            }
            None => Err(AppError::Conflict(format!(
                "tag update delivery '{}' is not leased",
                delivery.delivery_id
            ))),
        }
    }
}
