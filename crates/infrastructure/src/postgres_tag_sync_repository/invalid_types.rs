use super::*;

#[async_trait]
impl InvalidResourceTypeRepository for PostgresTagSyncRepository {
    async fn list_invalid_types(&self) -> AppResult<Vec<InvalidResourceTypeRecord>> {
        let rows = sqlx::query_as::<_, InvalidResourceTypeRow>(
            r#"
            SELECT partition_key, resource_type, message, unique_id, recorded_at
            FROM invalid_resource_types
            ORDER BY recorded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list invalid resource types: {error}"))
        })?;

        rows.into_iter().map(invalid_type_from_row).collect()
    }

    async fn find_invalid_type(
        &self,
        resource_type: &str,
    ) -> AppResult<Option<InvalidResourceTypeRecord>> {
        let row = sqlx::query_as::<_, InvalidResourceTypeRow>(
            r#"
            SELECT partition_key, resource_type, message, unique_id, recorded_at
            FROM invalid_resource_types
            WHERE lower(resource_type) = lower($1)
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(resource_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find invalid resource type '{resource_type}': {error}"
            ))
        })?;

        row.map(invalid_type_from_row).transpose()
    }

    async fn upsert_invalid_type(&self, record: InvalidResourceTypeRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invalid_resource_types (
                partition_key,
                resource_type,
                message,
                unique_id,
                recorded_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (partition_key, resource_type)
            DO UPDATE SET
                message = EXCLUDED.message,
                unique_id = EXCLUDED.unique_id,
                recorded_at = EXCLUDED.recorded_at
            "#,
        )
        .bind(record.subscription_id.as_str())
        .bind(record.resource_type.as_str())
        .bind(record.message.as_str())
        .bind(record.unique_id)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to register invalid resource type '{}': {error}",
                record.resource_type
            ))
        })?;

        Ok(())
    }
}

fn invalid_type_from_row(row: InvalidResourceTypeRow) -> AppResult<InvalidResourceTypeRecord> {
    Ok(InvalidResourceTypeRecord {
        subscription_id: SubscriptionId::new(row.partition_key)?,
        resource_type: row.resource_type,
        message: row.message,
        unique_id: row.unique_id,
        recorded_at: row.recorded_at,
    })
}
