//! Case Repository
//!
//! Cases, their current stage, responders, history and the workflow/lookup
//! tables the case engine reads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};

use tix_models::{
    AreaDistrict, Case, CaseAttachment, CaseInsert, CaseCurrentStage, CaseHistoryEvent, CaseResponder,
    CaseStatusName, CaseSubType, NewCaseRecord, SlaCandidate, StageTransitionWrite, WorkflowNode,
};
use tix_utils::{TixError, TixResult};

use super::DbContext;
use crate::stores::{CaseStore, SlaScan};

const CASE_COLUMNS: &str = r#"
    org_id, case_id, case_type_id, case_s_type_id, wf_id, wf_version, priority, status_id,
    title, description, country_id, prov_id, dist_id, case_sla, created_at, start_at,
    command_at, receive_at, arrive_at, closed_at, over_sla, over_sla_date, over_sla_count,
    schedule_flag, schedule_date, integration_ref_number, device_metadata, source,
    created_by, updated_at, updated_by
"#;

const NODE_COLUMNS: &str = "org_id, wf_id, version, node_id, node_type, section, data";

const UPSERT_STAGE: &str = r#"
    INSERT INTO tix_case_current_stage
        (org_id, case_id, wf_id, version, node_id, node_type, section, data,
         pic, group_id, form_id, unit_id, username, updated_at, updated_by)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
    ON CONFLICT (org_id, case_id) DO UPDATE SET
        wf_id = EXCLUDED.wf_id,
        version = EXCLUDED.version,
        node_id = EXCLUDED.node_id,
        node_type = EXCLUDED.node_type,
        section = EXCLUDED.section,
        data = EXCLUDED.data,
        pic = EXCLUDED.pic,
        group_id = EXCLUDED.group_id,
        form_id = EXCLUDED.form_id,
        unit_id = EXCLUDED.unit_id,
        username = EXCLUDED.username,
        updated_at = EXCLUDED.updated_at,
        updated_by = EXCLUDED.updated_by
"#;

const INSERT_RESPONDER: &str = r#"
    INSERT INTO tix_case_responders
        (org_id, case_id, unit_id, user_owner, status_id, created_at, created_by)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

pub struct CaseRepository {
    pool: PgPool,
}

impl CaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_stage<'c>(
        tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
        stage: &CaseCurrentStage,
    ) -> TixResult<()> {
        sqlx::query(UPSERT_STAGE)
            .bind(&stage.org_id)
            .bind(&stage.case_id)
            .bind(&stage.wf_id)
            .bind(&stage.version)
            .bind(&stage.node_id)
            .bind(&stage.node_type)
            .bind(&stage.section)
            .bind(&stage.data)
            .bind(&stage.pic)
            .bind(&stage.group_id)
            .bind(&stage.form_id)
            .bind(&stage.unit_id)
            .bind(&stage.username)
            .bind(stage.updated_at)
            .bind(&stage.updated_by)
            .execute(&mut **tx)
            .await
            .db_context("Failed to write current stage")?;
        Ok(())
    }

    async fn insert_responder<'c>(
        tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
        responder: &CaseResponder,
    ) -> TixResult<()> {
        sqlx::query(INSERT_RESPONDER)
            .bind(&responder.org_id)
            .bind(&responder.case_id)
            .bind(&responder.unit_id)
            .bind(&responder.user_owner)
            .bind(&responder.status_id)
            .bind(responder.created_at)
            .bind(&responder.created_by)
            .execute(&mut **tx)
            .await
            .db_context("Failed to append responder")?;
        Ok(())
    }
}

#[async_trait]
impl CaseStore for CaseRepository {
    async fn find_case(&self, org_id: &str, case_id: &str) -> TixResult<Option<Case>> {
        let sql = format!("SELECT {} FROM tix_cases WHERE org_id = $1 AND case_id = $2", CASE_COLUMNS);
        sqlx::query_as::<_, Case>(&sql)
            .bind(org_id)
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await
            .db_context("Failed to fetch case")
    }

    async fn find_case_by_reference(&self, org_id: &str, reference: &str) -> TixResult<Option<Case>> {
        let sql = format!(
            "SELECT {} FROM tix_cases WHERE org_id = $1 AND integration_ref_number = $2 \
             ORDER BY created_at DESC LIMIT 1",
            CASE_COLUMNS
        );
        sqlx::query_as::<_, Case>(&sql)
            .bind(org_id)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .db_context("Failed to fetch case by reference")
    }

    async fn current_stage(&self, org_id: &str, case_id: &str) -> TixResult<Option<CaseCurrentStage>> {
        sqlx::query_as::<_, CaseCurrentStage>(
            r#"
            SELECT org_id, case_id, wf_id, version, node_id, node_type, section, data,
                   pic, group_id, form_id, unit_id, username, updated_at, updated_by
            FROM tix_case_current_stage
            WHERE org_id = $1 AND case_id = $2
            "#,
        )
        .bind(org_id)
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await
        .db_context("Failed to fetch current stage")
    }

    async fn workflow_nodes(&self, org_id: &str, wf_id: &str, version: &str) -> TixResult<Vec<WorkflowNode>> {
        let sql = format!(
            "SELECT {} FROM wf_nodes WHERE org_id = $1 AND wf_id = $2 AND version = $3 ORDER BY id",
            NODE_COLUMNS
        );
        sqlx::query_as::<_, WorkflowNode>(&sql)
            .bind(org_id)
            .bind(wf_id)
            .bind(version)
            .fetch_all(&self.pool)
            .await
            .db_context("Failed to fetch workflow nodes")
    }

    async fn workflow_node(
        &self,
        org_id: &str,
        wf_id: &str,
        version: &str,
        node_id: &str,
    ) -> TixResult<Option<WorkflowNode>> {
        let sql = format!(
            "SELECT {} FROM wf_nodes WHERE org_id = $1 AND wf_id = $2 AND version = $3 AND node_id = $4",
            NODE_COLUMNS
        );
        sqlx::query_as::<_, WorkflowNode>(&sql)
            .bind(org_id)
            .bind(wf_id)
            .bind(version)
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await
            .db_context("Failed to fetch workflow node")
    }

    async fn active_workflow_version(&self, org_id: &str, wf_id: &str) -> TixResult<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT version FROM wf_definitions WHERE org_id = $1 AND wf_id = $2 AND active",
        )
        .bind(org_id)
        .bind(wf_id)
        .fetch_optional(&self.pool)
        .await
        .db_context("Failed to fetch workflow definition")
    }

    async fn next_case_sequence(&self, org_id: &str, day: &str) -> TixResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO tix_case_sequences (org_id, day, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (org_id, day)
            DO UPDATE SET last_value = tix_case_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(org_id)
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .db_context("Failed to allocate case sequence")
    }

    async fn create_case(&self, record: NewCaseRecord) -> TixResult<CaseInsert> {
        let NewCaseRecord { case, stage, responder, attachments } = record;
        let mut tx = self.pool.begin().await.db_context("Failed to begin transaction")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO tix_cases
                (org_id, case_id, case_type_id, case_s_type_id, wf_id, wf_version, priority,
                 status_id, title, description, country_id, prov_id, dist_id, case_sla,
                 created_at, start_at, command_at, receive_at, arrive_at, closed_at, over_sla,
                 over_sla_date, over_sla_count, schedule_flag, schedule_date,
                 integration_ref_number, device_metadata, source, created_by, updated_at,
                 updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&case.org_id)
        .bind(&case.case_id)
        .bind(&case.case_type_id)
        .bind(&case.case_s_type_id)
        .bind(&case.wf_id)
        .bind(&case.wf_version)
        .bind(case.priority)
        .bind(&case.status_id)
        .bind(&case.title)
        .bind(&case.description)
        .bind(&case.country_id)
        .bind(&case.prov_id)
        .bind(&case.dist_id)
        .bind(case.case_sla)
        .bind(case.created_at)
        .bind(case.start_at)
        .bind(case.command_at)
        .bind(case.receive_at)
        .bind(case.arrive_at)
        .bind(case.closed_at)
        .bind(case.over_sla)
        .bind(case.over_sla_date)
        .bind(case.over_sla_count)
        .bind(case.schedule_flag)
        .bind(case.schedule_date)
        .bind(&case.integration_ref_number)
        .bind(&case.device_metadata)
        .bind(&case.source)
        .bind(&case.created_by)
        .bind(case.updated_at)
        .bind(&case.updated_by)
        .execute(&mut *tx)
        .await
        .db_context("Failed to insert case")?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.db_context("Failed to roll back case insert")?;
            // Either key may have collided; the reference index is the one a racing intake hits.
            if let Some(reference) = case.integration_ref_number.as_deref() {
                if let Some(existing) = self.find_case_by_reference(&case.org_id, reference).await? {
                    return Ok(CaseInsert::DuplicateReference(existing));
                }
            }
            return Err(TixError::conflict(format!("case {} already exists", case.case_id)));
        }

        Self::upsert_stage(&mut tx, &stage).await?;
        Self::insert_responder(&mut tx, &responder).await?;

        for attachment in &attachments {
            sqlx::query(
                "INSERT INTO tix_case_attachments (org_id, case_id, url, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(&attachment.org_id)
            .bind(&attachment.case_id)
            .bind(&attachment.url)
            .bind(attachment.created_at)
            .execute(&mut *tx)
            .await
            .db_context("Failed to insert attachment")?;
        }

        tx.commit().await.db_context("Failed to commit case")?;
        Ok(CaseInsert::Created)
    }

    async fn apply_transition(&self, org_id: &str, case_id: &str, write: StageTransitionWrite) -> TixResult<()> {
        let mut tx = self.pool.begin().await.db_context("Failed to begin transaction")?;

        let locked: Option<String> = sqlx::query_scalar(
            "SELECT status_id FROM tix_cases WHERE org_id = $1 AND case_id = $2 FOR UPDATE",
        )
        .bind(org_id)
        .bind(case_id)
        .fetch_optional(&mut *tx)
        .await
        .db_context("Failed to lock case")?;

        match locked {
            None => return Err(TixError::not_found(format!("case {}", case_id))),
            Some(current) if current != write.expected_status => {
                return Err(TixError::conflict(format!(
                    "case {} moved to {} while transitioning from {}",
                    case_id, current, write.expected_status
                )));
            }
            Some(_) => {}
        }

        Self::upsert_stage(&mut tx, &write.stage).await?;

        // Milestones are stamped once; later visits to the same status keep the first time.
        let milestone = write
            .milestone
            .map(|m| format!(", {col} = COALESCE({col}, $4)", col = m.column()))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE tix_cases SET status_id = $3, updated_at = $4, updated_by = $5{} \
             WHERE org_id = $1 AND case_id = $2",
            milestone
        );
        let updated = sqlx::query(&sql)
            .bind(org_id)
            .bind(case_id)
            .bind(&write.status_id)
            .bind(write.at)
            .bind(&write.stage.updated_by)
            .execute(&mut *tx)
            .await
            .db_context("Failed to update case status")?;

        if updated.rows_affected() == 0 {
            return Err(TixError::not_found(format!("case {}", case_id)));
        }

        Self::insert_responder(&mut tx, &write.responder).await?;

        tx.commit().await.db_context("Failed to commit transition")?;
        Ok(())
    }

    async fn append_history(&self, event: CaseHistoryEvent) -> TixResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tix_case_history_events
                (org_id, case_id, event_type, full_msg, json_data, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&event.org_id)
        .bind(&event.case_id)
        .bind(&event.event_type)
        .bind(&event.full_msg)
        .bind(&event.json_data)
        .bind(event.created_at)
        .bind(&event.created_by)
        .execute(&self.pool)
        .await
        .db_context("Failed to append history event")?;
        Ok(())
    }

    async fn status_names(&self) -> TixResult<Vec<CaseStatusName>> {
        sqlx::query_as::<_, CaseStatusName>(
            "SELECT status_id, name_th, name_en FROM tix_case_status ORDER BY status_id",
        )
        .fetch_all(&self.pool)
        .await
        .db_context("Failed to fetch status names")
    }

    async fn find_sub_type(&self, org_id: &str, s_type_id: &str) -> TixResult<Option<CaseSubType>> {
        sqlx::query_as::<_, CaseSubType>(
            r#"
            SELECT org_id, case_type_id, s_type_id, wf_id, case_sla, priority, device_type, work_order_type
            FROM case_sub_types
            WHERE org_id = $1 AND s_type_id = $2 AND active
            "#,
        )
        .bind(org_id)
        .bind(s_type_id)
        .fetch_optional(&self.pool)
        .await
        .db_context("Failed to fetch case sub-type")
    }

    async fn find_sub_type_for_work_order(
        &self,
        org_id: &str,
        device_type: &str,
        work_order_type: &str,
    ) -> TixResult<Option<CaseSubType>> {
        sqlx::query_as::<_, CaseSubType>(
            r#"
            SELECT org_id, case_type_id, s_type_id, wf_id, case_sla, priority, device_type, work_order_type
            FROM case_sub_types
            WHERE org_id = $1 AND device_type = $2 AND work_order_type = $3 AND active
            ORDER BY s_type_id
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .bind(device_type)
        .bind(work_order_type)
        .fetch_optional(&self.pool)
        .await
        .db_context("Failed to fetch case sub-type for work order")
    }

    async fn find_area(&self, org_id: &str, namespace: &str) -> TixResult<Option<AreaDistrict>> {
        sqlx::query_as::<_, AreaDistrict>(
            "SELECT org_id, namespace, country_id, prov_id, dist_id FROM area_districts WHERE org_id = $1 AND namespace = $2",
        )
        .bind(org_id)
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await
        .db_context("Failed to fetch area")
    }

    async fn case_attachments(&self, org_id: &str, case_id: &str) -> TixResult<Vec<CaseAttachment>> {
        let rows: Vec<(String, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT org_id, case_id, url, created_at FROM tix_case_attachments WHERE org_id = $1 AND case_id = $2 ORDER BY id",
        )
        .bind(org_id)
        .bind(case_id)
        .fetch_all(&self.pool)
        .await
        .db_context("Failed to fetch attachments")?;

        Ok(rows
            .into_iter()
            .map(|(org_id, case_id, url, created_at)| CaseAttachment { org_id, case_id, url, created_at })
            .collect())
    }

    async fn sla_candidates(&self, scan: &SlaScan) -> TixResult<Vec<SlaCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT c.org_id, c.case_id, c.status_id, c.prov_id, c.created_at,
                       c.over_sla_count, c.over_sla_date,
                       CASE WHEN (n.data #>> '{data,config,SLA}') ~ '^\s*[0-9]{1,9}\s*$'
                            THEN CAST(TRIM(n.data #>> '{data,config,SLA}') AS INTEGER)
                       END AS node_sla_minutes
                FROM tix_cases c
                JOIN tix_case_current_stage s ON s.org_id = c.org_id AND s.case_id = c.case_id
                JOIN wf_nodes n ON n.org_id = s.org_id AND n.wf_id = s.wf_id
                               AND n.version = s.version AND n.node_id = s.node_id
                WHERE c.status_id = ANY($1)
                  AND c.over_sla_count < $2
                  AND (c.over_sla_date IS NULL OR c.over_sla_date <= $3)
            ) candidates
            WHERE node_sla_minutes > 0
              AND created_at + make_interval(mins => node_sla_minutes) <= $4
            ORDER BY created_at
            "#,
        )
        .bind(&scan.statuses)
        .bind(scan.max_over_sla_count)
        .bind(scan.cooldown_cutoff)
        .bind(scan.now)
        .fetch_all(&self.pool)
        .await
        .db_context("Failed to scan SLA candidates")?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            match SlaCandidate::from_row(&row) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    let case_id: Option<String> = row.try_get("case_id").ok();
                    tracing::warn!(?case_id, error = %e, "Skipping undecodable SLA candidate");
                }
            }
        }
        Ok(candidates)
    }

    async fn record_over_sla(&self, org_id: &str, case_id: &str, at: DateTime<Utc>) -> TixResult<i32> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE tix_cases
            SET over_sla = TRUE,
                over_sla_count = COALESCE(over_sla_count, 0) + 1,
                over_sla_date = $3
            WHERE org_id = $1 AND case_id = $2
            RETURNING over_sla_count
            "#,
        )
        .bind(org_id)
        .bind(case_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .db_context("Failed to record over-SLA")?
        .ok_or_else(|| TixError::not_found(format!("case {}", case_id)))
    }
}
