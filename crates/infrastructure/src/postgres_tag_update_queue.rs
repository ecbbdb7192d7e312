use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tagsync_application::{QueuedTagUpdate, TagUpdateQueue};
use tagsync_core::{AppError, AppResult};
use tagsync_domain::TagUpdateRequest;
use tracing::warn;

/// PostgreSQL-backed tag update queue using leased rows.
///
/// Rows are claimed with `FOR UPDATE SKIP LOCKED`; a row whose lease expired
/// is claimed again by the next receiver.
#[derive(Clone)]
pub struct PostgresTagUpdateQueue {
    pool: PgPool,
    queue_name: String,
}

impl PostgresTagUpdateQueue {
    /// Creates a queue adapter over one named queue.
    #[must_use]
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
        }
    }
}

#[derive(Debug, FromRow)]
struct ClaimedJobRow {
    id: uuid::Uuid,
    payload: Value,
    delivery_count: i32,
    lease_token: String,
}

#[async_trait]
impl TagUpdateQueue for PostgresTagUpdateQueue {
    async fn enqueue(&self, request: &TagUpdateRequest) -> AppResult<()> {
        let payload = serde_json::to_value(request).map_err(|error| {
            AppError::Queue(format!(
                "failed to encode tag update for resource '{}': {error}",
                request.resource_id
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO tag_update_jobs (queue_name, payload, status, created_at, updated_at)
            VALUES ($1, $2, 'pending', now(), now())
            "#,
        )
        .bind(self.queue_name.as_str())
        .bind(payload)
        .execute(&self.pool)
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
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Queue(format!(
                "failed to start tag update claim transaction: {error}"
            ))
        })?;

        let rows = sqlx::query_as::<_, ClaimedJobRow>(
            r#"
            WITH candidate_jobs AS (
                SELECT id
                FROM tag_update_jobs
                WHERE queue_name = $4
                  AND (
                        status = 'pending'
                        OR (status = 'leased' AND lease_expires_at < now())
                      )
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE tag_update_jobs jobs
            SET
                status = 'leased',
                leased_by = $2,
                lease_token = gen_random_uuid()::TEXT,
                lease_expires_at = now() + make_interval(secs => $3::INT),
                delivery_count = jobs.delivery_count + 1,
                updated_at = now()
            FROM candidate_jobs
            WHERE jobs.id = candidate_jobs.id
            RETURNING jobs.id, jobs.payload, jobs.delivery_count, jobs.lease_token
            "#,
        )
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid tag update claim limit: {error}"))
        })?)
        .bind(worker_id)
        .bind(i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid tag update lease_seconds: {error}"))
        })?)
        .bind(self.queue_name.as_str())
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Queue(format!(
                "failed to claim tag updates for worker '{worker_id}': {error}"
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Queue(format!(
                "failed to commit tag update claim transaction: {error}"
            ))
        })?;

        let mut deliveries = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<TagUpdateRequest>(row.payload) {
                Ok(request) => deliveries.push(QueuedTagUpdate {
                    delivery_id: delivery_id(row.id, row.lease_token.as_str()),
                    request,
                    delivery_count: u32::try_from(row.delivery_count).unwrap_or_default(),
                }),
                Err(error) => {
                    warn!(job_id = %row.id, error = %error, "dropping undecodable tag update");
                    self.delete_job(row.id, row.lease_token.as_str()).await?;
                }
            }
        }

        Ok(deliveries)
    }

    async fn acknowledge(&self, delivery: &QueuedTagUpdate) -> AppResult<()> {
        let (job_id, lease_token) = parse_delivery_id(delivery.delivery_id.as_str())?;
        let deleted = self.delete_job(job_id, lease_token).await?;
        if !deleted {
            return Err(AppError::Conflict(format!(
                "tag update '{job_id}' is no longer leased with the delivered lease token"
            )));
        }

        Ok(())
    }
}

impl PostgresTagUpdateQueue {
    async fn delete_job(&self, job_id: uuid::Uuid, lease_token: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM tag_update_jobs
            WHERE id = $1
              AND lease_token = $2
              AND status = 'leased'
            "#,
        )
        .bind(job_id)
        .bind(lease_token)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Queue(format!("failed to delete tag update '{job_id}': {error}"))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

fn delivery_id(job_id: uuid::Uuid, lease_token: &str) -> String {
    format!("{job_id}:{lease_token}")
}

fn parse_delivery_id(value: &str) -> AppResult<(uuid::Uuid, &str)> {
    let (job_id, lease_token) = value.split_once(':').ok_or_else(|| {
        AppError::Validation(format!("invalid tag update delivery id '{value}'"))
    })?;
    let job_id = uuid::Uuid::parse_str(job_id).map_err(|error| {
        AppError::Validation(format!("invalid tag update job id '{job_id}': {error}"))
    })?;

    if lease_token.is_empty() {
        return Err(AppError::Validation(format!(
            "tag update delivery id '{value}' has no lease token"
        )));
    }

    Ok((job_id, lease_token))
}
