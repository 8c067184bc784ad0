use async_trait::async_trait;
use sqlx::PgPool;

use tix_models::{CaseSummaryBucket, GroupTotal, GroupType, SummaryBucketKey, SummaryDelta};
use tix_utils::TixResult;

use super::DbContext;
use crate::stores::SummaryStore;

/// Dashboard counters in `d_case_summary` and the group definitions that key them.
pub struct SummaryRepository {
    pool: PgPool,
}

impl SummaryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryStore for SummaryRepository {
    async fn increment_summary(&self, key: &SummaryBucketKey, delta: SummaryDelta) -> TixResult<()> {
        sqlx::query(
            r#"
            INSERT INTO d_case_summary
                (org_id, date, hour, group_type_id, country_id, prov_id, dist_id,
                 total, in_sla, over_sla, case_duration)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (org_id, date, hour, group_type_id, country_id, prov_id, dist_id)
            DO UPDATE SET
                total = d_case_summary.total + EXCLUDED.total,
                in_sla = d_case_summary.in_sla + EXCLUDED.in_sla,
                over_sla = d_case_summary.over_sla + EXCLUDED.over_sla,
                case_duration = d_case_summary.case_duration + EXCLUDED.case_duration
            "#,
        )
        .bind(&key.org_id)
        .bind(&key.date)
        .bind(&key.hour)
        .bind(&key.group_type_id)
        .bind(&key.country_id)
        .bind(&key.prov_id)
        .bind(&key.dist_id)
        .bind(delta.total)
        .bind(delta.in_sla)
        .bind(delta.over_sla)
        .bind(delta.case_duration)
        .execute(&self.pool)
        .await
        .db_context("Failed to increment case summary")?;
        Ok(())
    }

    async fn summary_bucket(&self, key: &SummaryBucketKey) -> TixResult<Option<CaseSummaryBucket>> {
        sqlx::query_as::<_, CaseSummaryBucket>(
            r#"
            SELECT org_id, date, hour, group_type_id, country_id, prov_id, dist_id,
                   total, in_sla, over_sla, case_duration
            FROM d_case_summary
            WHERE org_id = $1 AND date = $2 AND hour = $3 AND group_type_id = $4
              AND country_id = $5 AND prov_id = $6 AND dist_id = $7
            "#,
        )
        .bind(&key.org_id)
        .bind(&key.date)
        .bind(&key.hour)
        .bind(&key.group_type_id)
        .bind(&key.country_id)
        .bind(&key.prov_id)
        .bind(&key.dist_id)
        .fetch_optional(&self.pool)
        .await
        .db_context("Failed to fetch case summary bucket")
    }

    async fn group_totals(&self, org_id: &str, date: &str) -> TixResult<Vec<GroupTotal>> {
        sqlx::query_as::<_, GroupTotal>(
            r#"
            SELECT group_type_id, CAST(SUM(total) AS BIGINT) AS total
            FROM d_case_summary
            WHERE org_id = $1 AND date = $2
            GROUP BY group_type_id
            ORDER BY group_type_id
            "#,
        )
        .bind(org_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .db_context("Failed to aggregate group totals")
    }

    async fn orgs_with_activity(&self, date: &str) -> TixResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT org_id FROM d_case_summary WHERE date = $1 ORDER BY org_id",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .db_context("Failed to list active organizations")
    }

    async fn load_group_types(&self) -> TixResult<Vec<GroupType>> {
        sqlx::query_as::<_, GroupType>(
            r#"
            SELECT id, org_id, group_type_id, en, th, case_type_ids, prefix
            FROM case_type_groups
            ORDER BY org_id, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .db_context("Failed to load case type groups")
    }
}
