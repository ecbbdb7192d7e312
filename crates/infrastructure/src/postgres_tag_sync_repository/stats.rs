use super::*;

#[async_trait]
impl AuditStatsRepository for PostgresTagSyncRepository {
    async fn upsert_run_stats(&self, stats: &AuditRunStats) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_run_stats (
                subscription_id,
                run_id,
                job_start,
                job_end,
                resource_groups_total,
                resource_groups_skipped,
                resource_items_total,
                resource_items_with_updates,
                resource_items_skipped
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (subscription_id, run_id)
            DO UPDATE SET
                job_start = EXCLUDED.job_start,
                job_end = EXCLUDED.job_end,
                resource_groups_total = EXCLUDED.resource_groups_total,
                resource_groups_skipped = EXCLUDED.resource_groups_skipped,
                resource_items_total = EXCLUDED.resource_items_total,
                resource_items_with_updates = EXCLUDED.resource_items_with_updates,
                resource_items_skipped = EXCLUDED.resource_items_skipped
            "#,
        )
        .bind(stats.subscription_id.as_str())
        .bind(stats.run_id)
        .bind(stats.job_start)
        .bind(stats.job_end)
        .bind(counter_to_column(
            "resource_groups_total",
            stats.resource_groups_total,
        )?)
        .bind(counter_to_column(
            "resource_groups_skipped",
            stats.resource_groups_skipped,
        )?)
        .bind(counter_to_column(
            "resource_items_total",
            stats.resource_items_total,
        )?)
        .bind(counter_to_column(
            "resource_items_with_updates",
            stats.resource_items_with_updates,
        )?)
        .bind(counter_to_column(
            "resource_items_skipped",
            stats.resource_items_skipped,
        )?)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save audit run '{}' for subscription '{}': {error}",
                stats.run_id, stats.subscription_id
            ))
        })?;

        Ok(())
    }

    async fn list_recent_runs(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
    ) -> AppResult<Vec<AuditRunStats>> {
        let rows = sqlx::query_as::<_, AuditRunStatsRow>(
            r#"
            SELECT
                subscription_id,
                run_id,
                job_start,
                job_end,
                resource_groups_total,
                resource_groups_skipped,
                resource_items_total,
                resource_items_with_updates,
                resource_items_skipped
            FROM audit_run_stats
            WHERE subscription_id = $1
            ORDER BY job_start DESC
            LIMIT $2
            "#,
        )
        .bind(subscription_id.as_str())
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid audit run list limit: {error}"))
        })?)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list audit runs for subscription '{subscription_id}': {error}"
            ))
        })?;

        rows.into_iter().map(run_stats_from_row).collect()
    }
}

fn run_stats_from_row(row: AuditRunStatsRow) -> AppResult<AuditRunStats> {
    Ok(AuditRunStats {
        subscription_id: SubscriptionId::new(row.subscription_id)?,
        run_id: row.run_id,
        job_start: row.job_start,
        job_end: row.job_end,
        resource_groups_total: counter_from_column(
            "resource_groups_total",
            row.resource_groups_total,
        )?,
        resource_groups_skipped: counter_from_column(
            "resource_groups_skipped",
            row.resource_groups_skipped,
        )?,
        resource_items_total: counter_from_column(
            "resource_items_total",
            row.resource_items_total,
        )?,
        resource_items_with_updates: counter_from_column(
            "resource_items_with_updates",
            row.resource_items_with_updates,
        )?,
        resource_items_skipped: counter_from_column(
            "resource_items_skipped",
            row.resource_items_skipped,
        )?,
    })
}
