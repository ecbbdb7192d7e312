//! Redis-backed tag update queue.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use tagsync_application::{QueuedTagUpdate, TagUpdateQueue};
use tagsync_core::{AppError, AppResult};
use tagsync_domain::TagUpdateRequest;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Moves up to `ARGV[2]` payloads from the pending list into the lease set,
/// scored by the lease expiry in `ARGV[1]`. Returns `token, payload, redeliveries`
/// triples.
const CLAIM_SCRIPT: &str = r#"
local claimed = {}
for i = 1, tonumber(ARGV[2]) do
  local raw = redis.call('RPOP', KEYS[1])
  if not raw then
    break
  end
  local token = ARGV[2 + i]
  redis.call('ZADD', KEYS[2], ARGV[1], token .. '\n' .. raw)
  table.insert(claimed, token)
  table.insert(claimed, raw)
  table.insert(claimed, redis.call('HGET', KEYS[3], raw) or '0')
end
return claimed
"#;

/// Returns every lease expired at `ARGV[1]` to the consuming end of the
/// pending list, whichever worker held it.
const REQUEUE_EXPIRED_SCRIPT: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, member in ipairs(expired) do
  local raw = string.sub(member, tonumber(ARGV[2]))
  redis.call('ZREM', KEYS[2], member)
  redis.call('HINCRBY', KEYS[3], raw, 1)
  redis.call('RPUSH', KEYS[1], raw)
end
return #expired
"#;

const ACKNOWLEDGE_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 1 then
  redis.call('HDEL', KEYS[2], ARGV[2])
  return 1
else
  return 0
end
"#;

/// Length of a hyphenated lease token.
const LEASE_TOKEN_LEN: usize = 36;

/// Redis list queue with a shared lease set.
///
/// Receiving atomically pops a payload from the pending list and records it
/// in a sorted set scored by lease expiry. Every `receive`, from any worker,
/// first returns expired leases to the pending list, so messages held by a
/// crashed or retired worker are redelivered without that worker coming back.
#[derive(Clone)]
pub struct RedisTagUpdateQueue {
    client: redis::Client,
    key_prefix: String,
    in_flight: Arc<Mutex<HashMap<String, String>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageEnvelope {
    id: uuid::Uuid,
    request: TagUpdateRequest,
}

impl RedisTagUpdateQueue {
    /// Creates a queue adapter with a configured Redis client and queue name.
    #[must_use]
    pub fn new(client: redis::Client, queue_name: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: queue_name.into(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn pending_key(&self) -> String {
        format!("{}:pending", self.key_prefix)
    }

    fn leases_key(&self) -> String {
        format!("{}:leases", self.key_prefix)
    }

    fn redeliveries_key(&self) -> String {
        format!("{}:redeliveries", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Queue(format!("failed to connect to redis: {error}")))
    }

    async fn requeue_expired(
        &self,
        connection: &mut redis::aio::MultiplexedConnection,
        now: DateTime<Utc>,
    ) -> AppResult<usize> {
        let script = Script::new(REQUEUE_EXPIRED_SCRIPT);
        script
            .key(self.pending_key())
            .key(self.leases_key())
            .key(self.redeliveries_key())
            .arg(now.timestamp_millis())
            .arg(LEASE_TOKEN_LEN + 2)
            .invoke_async::<usize>(connection)
            .await
            .map_err(|error| {
                AppError::Queue(format!("failed to requeue expired tag updates: {error}"))
            })
    }
}

/// Sorted-set member recording one lease on one payload.
fn lease_member(token: &str, raw: &str) -> String {
    format!("{token}\n{raw}")
}

/// Payload part of a lease member, matching the offset the requeue script uses.
fn payload_of_lease_member(member: &str) -> Option<&str> {
    member.get(LEASE_TOKEN_LEN + 1..)
}

fn lease_expiry_millis(now: DateTime<Utc>, lease_seconds: u32) -> i64 {
    (now + Duration::seconds(i64::from(lease_seconds))).timestamp_millis()
}

#[async_trait]
impl TagUpdateQueue for RedisTagUpdateQueue {
    async fn enqueue(&self, request: &TagUpdateRequest) -> AppResult<()> {
        let envelope = MessageEnvelope {
            id: uuid::Uuid::new_v4(),
            request: request.clone(),
        };
        let payload = encode_envelope(&envelope)?;

        let mut connection = self.connection().await?;
        let _: i64 = connection
            .lpush(self.pending_key(), payload)
            .await
            .map_err(|error| {
                AppError::Queue(format!(
                    "failed to enqueue tag update for resource '{}': {error}",
                    request.resource_id
                ))
            })?;

        Ok(())
    }

    async fn receive(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<QueuedTagUpdate>> {
        let now = Utc::now();
        let mut connection = self.connection().await?;
        let requeued = self.requeue_expired(&mut connection, now).await?;
        if requeued > 0 {
            debug!(worker_id = %worker_id, requeued, "expired tag update leases requeued");
        }

        let claim_script = Script::new(CLAIM_SCRIPT);
        let mut claim = claim_script.prepare_invoke();
        claim
            .key(self.pending_key())
            .key(self.leases_key())
            .key(self.redeliveries_key())
            .arg(lease_expiry_millis(now, lease_seconds))
            .arg(limit);
        for _ in 0..limit {
            claim.arg(uuid::Uuid::new_v4().to_string());
        }

        let claimed: Vec<(String, String, u32)> = claim
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Queue(format!(
                    "failed to receive tag updates for worker '{worker_id}': {error}"
                ))
            })?;

        let mut deliveries = Vec::with_capacity(claimed.len());
        let acknowledge_script = Script::new(ACKNOWLEDGE_SCRIPT);
        let mut in_flight = self.in_flight.lock().await;
        for (token, raw, redeliveries) in claimed {
            let member = lease_member(token.as_str(), raw.as_str());
            let envelope = match decode_envelope(raw.as_str()) {
                Ok(envelope) => envelope,
                Err(error) => {
                    warn!(worker_id = %worker_id, error = %error, "dropping undecodable tag update");
                    acknowledge_script
                        .key(self.leases_key())
                        .key(self.redeliveries_key())
                        .arg(member.as_str())
                        .arg(raw.as_str())
                        .invoke_async::<i32>(&mut connection)
                        .await
                        .map_err(|error| {
                            AppError::Queue(format!(
                                "failed to drop undecodable redis message: {error}"
                            ))
                        })?;
                    continue;
                }
            };

            let delivery_id = format!("{}:{token}", envelope.id);
            deliveries.push(QueuedTagUpdate {
                delivery_id: delivery_id.clone(),
                request: envelope.request,
                delivery_count: redeliveries.saturating_add(1),
            });
            in_flight.insert(delivery_id, member);
        }

        Ok(deliveries)
    }

    async fn acknowledge(&self, delivery: &QueuedTagUpdate) -> AppResult<()> {
        let Some(member) = self
            .in_flight
            .lock()
            .await
            .remove(delivery.delivery_id.as_str())
        else {
            return Err(AppError::Conflict(format!(
                "tag update delivery '{}' is not in flight",
                delivery.delivery_id
            )));
        };
        let raw = payload_of_lease_member(member.as_str()).unwrap_or_default();

        let mut connection = self.connection().await?;
        let script = Script::new(ACKNOWLEDGE_SCRIPT);
        let removed = script
            .key(self.leases_key())
            .key(self.redeliveries_key())
            .arg(member.as_str())
            .arg(raw)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Queue(format!(
                    "failed to acknowledge tag update '{}': {error}",
                    delivery.delivery_id
                ))
            })?;

        if removed == 0 {
            return Err(AppError::Conflict(format!(
                "lease on tag update delivery '{}' expired before acknowledgment",
                delivery.delivery_id
            )));
        }

        Ok(())
    }
}

fn encode_envelope(envelope: &MessageEnvelope) -> AppResult<String> {
    serde_json::to_string(envelope).map_err(|error| {
        AppError::Queue(format!(
            "failed to encode tag update for resource '{}': {error}",
            envelope.request.resource_id
        ))
    })
}

fn decode_envelope(raw: &str) -> AppResult<MessageEnvelope> {
    serde_json::from_str(raw)
        .map_err(|error| AppError::Queue(format!("invalid tag update payload: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tagsync_core::SubscriptionId;
    use tagsync_domain::TagUpdateRequest;

    use super::{
        LEASE_TOKEN_LEN, MessageEnvelope, REQUEUE_EXPIRED_SCRIPT, RedisTagUpdateQueue,
        decode_envelope, encode_envelope, lease_expiry_millis, lease_member,
        payload_of_lease_member,
    };

    fn queue() -> Option<RedisTagUpdateQueue> {
        redis::Client::open("redis://127.0.0.1:6379")
            .ok()
            .map(|client| RedisTagUpdateQueue::new(client, "resources-to-tag"))
    }

    #[test]
    fn keys_are_shared_by_every_worker() {
        let queue = queue();
        assert!(queue.is_some());
        let Some(queue) = queue else {
            return;
        };

        assert_eq!(queue.pending_key(), "resources-to-tag:pending");
        assert_eq!(queue.leases_key(), "resources-to-tag:leases");
        assert_eq!(queue.redeliveries_key(), "resources-to-tag:redeliveries");
    }

    #[test]
    fn lease_member_payload_offset_matches_requeue_script() {
        let token = uuid::Uuid::new_v4().to_string();
        assert_eq!(token.len(), LEASE_TOKEN_LEN);

        let raw = r#"{"id":"x","request":{}}"#;
        let member = lease_member(token.as_str(), raw);

        assert_eq!(payload_of_lease_member(member.as_str()), Some(raw));
        // Lua strings are 1-based, so the script skips token and separator.
        assert_eq!(&member[LEASE_TOKEN_LEN + 2 - 1..], raw);
        assert!(REQUEUE_EXPIRED_SCRIPT.contains("string.sub(member, tonumber(ARGV[2]))"));
    }

    #[test]
    fn lease_expiry_is_wall_clock_based() {
        let now = Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();

        assert_eq!(
            lease_expiry_millis(now, 60) - now.timestamp_millis(),
            60_000
        );
        assert_eq!(lease_expiry_millis(now, 0), now.timestamp_millis());
    }

    #[test]
    fn envelope_payload_uses_camel_case_request_fields() {
        let envelope = MessageEnvelope {
            id: uuid::Uuid::new_v4(),
            request: TagUpdateRequest {
                resource_id: "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Web/sites/a"
                    .to_owned(),
                api_version: "2022-03-01".to_owned(),
                location: "westeurope".to_owned(),
                tags: [("costCenter".to_owned(), "CC1".to_owned())]
                    .into_iter()
                    .collect(),
                resource_type: "Microsoft.Web/sites".to_owned(),
                subscription_id: SubscriptionId::new("sub-1").unwrap_or_else(|_| unreachable!()),
            },
        };

        let raw = encode_envelope(&envelope).unwrap_or_default();
        assert!(raw.contains("\"resourceId\""));
        assert!(raw.contains("\"apiVersion\":\"2022-03-01\""));

        let decoded = decode_envelope(raw.as_str());
        assert!(decoded.is_ok_and(|decoded| decoded.request == envelope.request));
        assert!(decode_envelope("{\"id\":1}").is_err());
    }
}
