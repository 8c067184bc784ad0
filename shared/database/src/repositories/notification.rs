use async_trait::async_trait;
use sqlx::PgPool;

use tix_models::Notification;
use tix_utils::TixResult;

use super::DbContext;
use crate::stores::NotificationSink;

/// Persists notifications; the delivery gateway polls this table.
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for NotificationRepository {
    async fn push(&self, notification: Notification) -> TixResult<()> {
        let recipients = serde_json::to_value(&notification.recipients)?;

        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, org_id, case_id, sender, sender_type, event_type, message,
                 recipients, data, hidden, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.org_id)
        .bind(&notification.case_id)
        .bind(&notification.sender)
        .bind(&notification.sender_type)
        .bind(&notification.event_type)
        .bind(&notification.message)
        .bind(&recipients)
        .bind(&notification.data)
        .bind(notification.hidden)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .db_context("Failed to store notification")?;

        tracing::debug!(
            notification_id = %notification.id,
            event_type = %notification.event_type,
            recipients = notification.recipients.len(),
            "Notification stored"
        );
        Ok(())
    }
}
