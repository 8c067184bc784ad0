use chrono::{DateTime, FixedOffset, Utc};
use serde_json::json;
use std::sync::Arc;

use tix_database::CaseStore;
use tix_models::{
    Case, CaseAttachment, CaseHistoryEvent, CaseInsert, CaseResponder, CaseSubType, Geography,
    NewCaseRecord,
};
use tix_utils::{require_non_empty, TixError, TixResult};

use crate::dashboard::DashboardAggregator;
use crate::engine::{stage_for_node, StageEngine, StageUpdateRequest, TransitionMode, HISTORY_CREATE};
use crate::graph::node_for_status;
use crate::metrics::metrics;
use crate::notify::Notifier;

/// Everything needed to open a case once its sub-type is resolved.
#[derive(Debug, Clone)]
pub struct OpenCase {
    pub org_id: String,
    pub sub_type: CaseSubType,
    pub title: String,
    pub description: Option<String>,
    pub priority: i32,
    pub geography: Geography,
    /// External work-order number; doubles as the idempotency key.
    pub integration_ref_number: Option<String>,
    pub device_metadata: serde_json::Value,
    pub attachments: Vec<String>,
    pub source: String,
    pub username: String,
    /// Auto-dispatch target.
    pub unit_id: Option<String>,
    pub unit_user: Option<String>,
    /// Channel letter of the generated id.
    pub channel: char,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Created(Case),
    /// A case with the same external reference already exists.
    Existing(Case),
}

impl IntakeOutcome {
    pub fn case(&self) -> &Case {
        match self {
            Self::Created(case) | Self::Existing(case) => case,
        }
    }
}

/// `I250101-00001`: channel, local `yyMMdd`, zero-padded daily sequence.
pub fn format_case_id(channel: char, at: DateTime<Utc>, offset: FixedOffset, sequence: i64) -> String {
    format!("{}{}-{:05}", channel, sequence_day(at, offset), sequence)
}

fn sequence_day(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%y%m%d").to_string()
}

pub struct CaseIntake {
    cases: Arc<dyn CaseStore>,
    engine: Arc<StageEngine>,
    notifier: Notifier,
    dashboard: DashboardAggregator,
    offset: FixedOffset,
}

impl CaseIntake {
    pub fn new(
        cases: Arc<dyn CaseStore>,
        engine: Arc<StageEngine>,
        notifier: Notifier,
        dashboard: DashboardAggregator,
        offset: FixedOffset,
    ) -> Self {
        Self { cases, engine, notifier, dashboard, offset }
    }

    pub async fn open_case(&self, request: OpenCase) -> TixResult<IntakeOutcome> {
        self.open_case_at(request, Utc::now()).await
    }

    pub async fn open_case_at(&self, request: OpenCase, now: DateTime<Utc>) -> TixResult<IntakeOutcome> {
        require_non_empty("orgId", &request.org_id)?;
        require_non_empty("title", &request.title)?;

        if let Some(reference) = request.integration_ref_number.as_deref() {
            if let Some(existing) = self.cases.find_case_by_reference(&request.org_id, reference).await? {
                tracing::info!(
                    org_id = %request.org_id,
                    reference,
                    case_id = %existing.case_id,
                    "Work order already has a case"
                );
                return Ok(IntakeOutcome::Existing(existing));
            }
        }

        let sub_type = &request.sub_type;
        let version = self
            .cases
            .active_workflow_version(&request.org_id, &sub_type.wf_id)
            .await?
            .ok_or_else(|| TixError::not_found(format!("workflow {}", sub_type.wf_id)))?;

        let new_code = self.engine.catalog().codes().new.clone();
        let nodes = self
            .engine
            .graph()
            .load_nodes(&request.org_id, &sub_type.wf_id, &version)
            .await?;
        let initial = node_for_status(&nodes, &new_code).cloned().ok_or_else(|| {
            TixError::not_found(format!("initial node for status {} in {}/{}", new_code, sub_type.wf_id, version))
        })?;

        let sequence = self
            .cases
            .next_case_sequence(&request.org_id, &sequence_day(now, self.offset))
            .await?;
        let case_id = format_case_id(request.channel, now, self.offset, sequence);

        let case = Case {
            org_id: request.org_id.clone(),
            case_id: case_id.clone(),
            case_type_id: sub_type.case_type_id.clone(),
            case_s_type_id: sub_type.s_type_id.clone(),
            wf_id: sub_type.wf_id.clone(),
            wf_version: version,
            priority: request.priority,
            status_id: new_code.clone(),
            title: request.title.clone(),
            description: request.description.clone(),
            country_id: request.geography.country_id.clone(),
            prov_id: request.geography.prov_id.clone(),
            dist_id: request.geography.dist_id.clone(),
            case_sla: sub_type.sla_minutes(),
            created_at: now,
            start_at: Some(now),
            command_at: None,
            receive_at: None,
            arrive_at: None,
            closed_at: None,
            over_sla: false,
            over_sla_date: None,
            over_sla_count: 0,
            schedule_flag: false,
            schedule_date: None,
            integration_ref_number: request.integration_ref_number.clone(),
            device_metadata: request.device_metadata.clone(),
            source: request.source.clone(),
            created_by: request.username.clone(),
            updated_at: now,
            updated_by: request.username.clone(),
        };

        let record = NewCaseRecord {
            stage: stage_for_node(&case, &initial, None, None, &request.username),
            responder: CaseResponder {
                org_id: case.org_id.clone(),
                case_id: case_id.clone(),
                unit_id: None,
                user_owner: None,
                status_id: new_code,
                created_at: now,
                created_by: request.username.clone(),
            },
            attachments: request
                .attachments
                .iter()
                .filter(|url| !url.is_empty())
                .map(|url| CaseAttachment {
                    org_id: case.org_id.clone(),
                    case_id: case_id.clone(),
                    url: url.clone(),
                    created_at: now,
                })
                .collect(),
            case: case.clone(),
        };

        if let CaseInsert::DuplicateReference(existing) = self.cases.create_case(record).await? {
            tracing::info!(
                org_id = %existing.org_id,
                reference = ?case.integration_ref_number,
                case_id = %existing.case_id,
                "Work order case opened concurrently, keeping the first"
            );
            return Ok(IntakeOutcome::Existing(existing));
        }
        metrics().cases_opened.inc();
        tracing::info!(
            org_id = %case.org_id,
            case_id = %case.case_id,
            case_type_id = %case.case_type_id,
            wf_id = %case.wf_id,
            reference = ?case.integration_ref_number,
            "Case opened"
        );

        self.after_open(&case, &request).await;
        Ok(IntakeOutcome::Created(case))
    }

    async fn after_open(&self, case: &Case, request: &OpenCase) {
        self.notifier.case_created(case).await;

        let event = CaseHistoryEvent::new(
            case,
            HISTORY_CREATE,
            format!("Case {} opened", case.case_id),
            json!({
                "caseTypeId": case.case_type_id,
                "caseSTypeId": case.case_s_type_id,
                "source": case.source,
                "reference": case.integration_ref_number,
            }),
            &request.username,
        );
        if let Err(e) = self.cases.append_history(event).await {
            tracing::warn!(case_id = %case.case_id, error = %e, "History append failed");
        }

        if let Err(e) = self
            .dashboard
            .record_case_opened(&case.org_id, &case.case_type_id, &case.geography())
            .await
        {
            metrics().summary_failures.inc();
            tracing::error!(case_id = %case.case_id, error = %e, "Failed to count opened case in summary");
        }

        let has_assignee = request.unit_id.as_deref().is_some_and(|u| !u.is_empty())
            || request.unit_user.as_deref().is_some_and(|u| !u.is_empty());
        if has_assignee {
            let dispatch = StageUpdateRequest {
                org_id: case.org_id.clone(),
                case_id: case.case_id.clone(),
                unit_id: request.unit_id.clone(),
                unit_user: request.unit_user.clone(),
                username: request.username.clone(),
                ..Default::default()
            };
            if let Err(e) = self.engine.update_current_stage(dispatch, TransitionMode::Dispatch).await {
                tracing::warn!(case_id = %case.case_id, error = %e, "Auto-dispatch failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_case_id_uses_local_day() {
        let bangkok = FixedOffset::east_opt(7 * 3600).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 18, 0, 0).unwrap();
        assert_eq!(format_case_id('I', at, bangkok, 1), "I250101-00001");
        assert_eq!(format_case_id('W', at, bangkok, 123_456), "W250101-123456");
        assert!(tix_utils::validate_case_id(&format_case_id('I', at, bangkok, 42)).is_ok());
    }
}
