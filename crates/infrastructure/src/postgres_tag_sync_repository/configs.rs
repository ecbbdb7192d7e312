use super::*;

#[async_trait]
impl AuditConfigRepository for PostgresTagSyncRepository {
    async fn list_configs(&self) -> AppResult<Vec<AuditConfig>> {
        let rows = sqlx::query_as::<_, AuditConfigRow>(
            r#"
            SELECT partition_key, subscription_id, required_tags
            FROM audit_configs
            ORDER BY partition_key, subscription_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit configs: {error}")))?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            match AuditConfig::from_csv(row.subscription_id.as_str(), row.required_tags.as_str()) {
                Ok(config) => configs.push(config),
                Err(error) => warn!(
                    partition_key = %row.partition_key,
                    subscription_id = %row.subscription_id,
                    error = %error,
                    "ignoring malformed audit config row"
                ),
            }
        }

        Ok(configs)
    }

    async fn upsert_config(&self, partition: &str, config: AuditConfig) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_configs (partition_key, subscription_id, required_tags, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (partition_key, subscription_id)
            DO UPDATE SET
                required_tags = EXCLUDED.required_tags,
                updated_at = now()
            "#,
        )
        .bind(partition)
        .bind(config.subscription_id().as_str())
        .bind(config.required_tags_csv())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save audit config for subscription '{}': {error}",
                config.subscription_id()
            ))
        })?;

        Ok(())
    }
}
