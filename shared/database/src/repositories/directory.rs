use async_trait::async_trait;
use sqlx::PgPool;

use tix_models::{UnitStatusUpdate, UpsertOutcome, UserAccount, UserProfile};
use tix_utils::TixResult;

use super::DbContext;
use crate::stores::DirectoryStore;

/// User accounts (`um_users`) and field units (`mdm_units`) mirrored from the ESB.
pub struct DirectoryRepository {
    pool: PgPool,
}

impl DirectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryStore for DirectoryRepository {
    async fn find_user(&self, org_id: &str, username: &str) -> TixResult<Option<UserAccount>> {
        sqlx::query_as::<_, UserAccount>(
            r#"
            SELECT org_id, username, emp_id, first_name, last_name, email, mobile,
                   user_type, active, updated_at
            FROM um_users
            WHERE org_id = $1 AND username = $2
            "#,
        )
        .bind(org_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .db_context("Failed to fetch user")
    }

    async fn upsert_user(&self, profile: &UserProfile, password_hash: Option<&str>) -> TixResult<UpsertOutcome> {
        // The password is only written on insert; updates never touch credentials.
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO um_users
                (org_id, username, emp_id, first_name, last_name, email, mobile,
                 password_hash, user_type, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, NOW(), NOW())
            ON CONFLICT (org_id, username) DO UPDATE SET
                emp_id = EXCLUDED.emp_id,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                mobile = EXCLUDED.mobile,
                user_type = EXCLUDED.user_type,
                active = TRUE,
                updated_at = NOW()
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&profile.org_id)
        .bind(&profile.username)
        .bind(&profile.emp_id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.email)
        .bind(&profile.mobile)
        .bind(password_hash)
        .bind(&profile.user_type)
        .fetch_one(&self.pool)
        .await
        .db_context("Failed to upsert user")?;

        Ok(if inserted { UpsertOutcome::Inserted } else { UpsertOutcome::Updated })
    }

    async fn deactivate_user(&self, org_id: &str, username: &str) -> TixResult<u64> {
        let result = sqlx::query(
            "UPDATE um_users SET active = FALSE, updated_at = NOW() WHERE org_id = $1 AND username = $2 AND active",
        )
        .bind(org_id)
        .bind(username)
        .execute(&self.pool)
        .await
        .db_context("Failed to deactivate user")?;

        Ok(result.rows_affected())
    }

    async fn update_unit_status(&self, update: &UnitStatusUpdate) -> TixResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE mdm_units
            SET username = $3,
                is_login = $4,
                sts_id = $5,
                latitude = COALESCE($6, latitude),
                longitude = COALESCE($7, longitude),
                updated_at = $8
            WHERE org_id = $1 AND unit_id = $2
            "#,
        )
        .bind(&update.org_id)
        .bind(&update.unit_id)
        .bind(&update.username)
        .bind(update.is_login)
        .bind(&update.status_id)
        .bind(update.latitude)
        .bind(update.longitude)
        .bind(update.at)
        .execute(&self.pool)
        .await
        .db_context("Failed to update unit status")?;

        Ok(result.rows_affected())
    }
}
