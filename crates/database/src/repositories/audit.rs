use rp_models::{AuditLog, CreateAuditLog};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new audit log entry (immutable, append-only)
    pub async fn create(&self, log: CreateAuditLog) -> Result<AuditLog, sqlx::Error> {
        let audit_log = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (
                event_type, event_category, event_action,
                actor_type, actor_id,
                target_type, target_id, target_name,
                description, metadata,
                status, error_message, request_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(&log.event_type)
        .bind(log.event_category)
        .bind(&log.event_action)
        .bind(&log.actor_type)
        .bind(&log.actor_id)
        .bind(&log.target_type)
        .bind(&log.target_id)
        .bind(&log.target_name)
        .bind(&log.description)
        .bind(&log.metadata)
        .bind(log.status.to_string())
        .bind(&log.error_message)
        .bind(&log.request_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(audit_log)
    }

    /// Audit trail of a single client, newest first
    pub async fn list_for_client(
        &self,
        client_id: &str,
        limit: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE target_type = 'client' AND target_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
