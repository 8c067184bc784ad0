//! Case Stage Transition Engine
//!
//! Moves a case from its current workflow node to the node of a requested
//! status. The stage replacement, the status/milestone update and the new
//! responder row are written as one transaction by the store; notification,
//! history and dashboard folding follow as best-effort side effects.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use tix_database::CaseStore;
use tix_models::{
    Case, CaseCurrentStage, CaseHistoryEvent, CaseResponder, CaseStatusName, SlaCandidate,
    StageTransitionWrite, WorkflowNode,
};
use tix_utils::{TixError, TixResult};

use crate::dashboard::DashboardAggregator;
use crate::graph::WorkflowGraphReader;
use crate::metrics::metrics;
use crate::notify::Notifier;
use crate::state_machine::StatusCatalog;

pub const HISTORY_CREATE: &str = "CASE_CREATE";
pub const HISTORY_STATUS: &str = "CASE_STATUS";
pub const HISTORY_DISPATCH: &str = "CASE_DISPATCH";
pub const HISTORY_SLA: &str = "CASE_OVER_SLA";

/// How the target node is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    /// Node whose action is the requested status.
    Status,
    /// The workflow's dispatch node, with the configured dispatch status.
    Dispatch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StageUpdateRequest {
    #[validate(length(min = 1))]
    pub org_id: String,
    #[validate(length(min = 1))]
    pub case_id: String,
    #[serde(default)]
    pub status_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub unit_id: Option<String>,
    #[serde(default)]
    pub unit_user: Option<String>,
    #[serde(default)]
    pub res_id: Option<String>,
    #[serde(default)]
    pub res_detail: Option<String>,
    #[validate(length(min = 1))]
    pub username: String,
}

pub struct StageEngine {
    cases: Arc<dyn CaseStore>,
    graph: WorkflowGraphReader,
    catalog: StatusCatalog,
    notifier: Notifier,
    dashboard: DashboardAggregator,
    sla_closing_statuses: Vec<String>,
}

/// Current-stage row for `node`, carrying the new assignment.
pub fn stage_for_node(
    case: &Case,
    node: &WorkflowNode,
    unit_id: Option<String>,
    username: Option<String>,
    updated_by: &str,
) -> CaseCurrentStage {
    CaseCurrentStage {
        org_id: case.org_id.clone(),
        case_id: case.case_id.clone(),
        wf_id: node.wf_id.clone(),
        version: node.version.clone(),
        node_id: node.node_id.clone(),
        node_type: node.node_type.clone(),
        section: node.section.clone(),
        data: node.data.clone(),
        pic: node.pic().map(str::to_string),
        group_id: node.group().map(str::to_string),
        form_id: node.form_id().map(str::to_string),
        unit_id,
        username,
        updated_at: Utc::now(),
        updated_by: updated_by.to_string(),
    }
}

impl StageEngine {
    pub fn new(
        cases: Arc<dyn CaseStore>,
        graph: WorkflowGraphReader,
        catalog: StatusCatalog,
        notifier: Notifier,
        dashboard: DashboardAggregator,
        sla_closing_statuses: Vec<String>,
    ) -> Self {
        Self { cases, graph, catalog, notifier, dashboard, sla_closing_statuses }
    }

    pub fn catalog(&self) -> &StatusCatalog {
        &self.catalog
    }

    pub fn graph(&self) -> &WorkflowGraphReader {
        &self.graph
    }

    async fn status_name(&self, status_id: &str) -> CaseStatusName {
        let names = match self.cases.status_names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(status_id, error = %e, "Status names unavailable");
                Vec::new()
            }
        };
        names.into_iter().find(|n| n.status_id == status_id).unwrap_or_else(|| CaseStatusName {
            status_id: status_id.to_string(),
            name_th: status_id.to_string(),
            name_en: status_id.to_string(),
        })
    }

    async fn resolve_target(
        &self,
        request: &StageUpdateRequest,
        mode: TransitionMode,
    ) -> TixResult<(WorkflowNode, String)> {
        let graph = self
            .graph
            .get_workflow_and_current_node(&request.org_id, &request.case_id, None)
            .await?;

        let node = match (mode, request.node_id.as_deref()) {
            (_, Some(node_id)) => self
                .cases
                .workflow_node(&request.org_id, &graph.current_stage.wf_id, &graph.current_stage.version, node_id)
                .await?
                .ok_or_else(|| TixError::not_found(format!("workflow node {}", node_id)))?,
            (TransitionMode::Dispatch, None) => graph.dispatch_node.clone().ok_or_else(|| {
                TixError::not_found(format!(
                    "dispatch node for status {} in workflow {}",
                    self.graph.dispatch_status(),
                    graph.current_stage.wf_id
                ))
            })?,
            (TransitionMode::Status, None) => {
                let status_id = request
                    .status_id
                    .as_deref()
                    .ok_or_else(|| TixError::validation("statusId", "status or node is required"))?;
                graph.node_for_status(status_id).cloned().ok_or_else(|| {
                    TixError::not_found(format!(
                        "workflow node for status {} in {}/{}",
                        status_id, graph.current_stage.wf_id, graph.current_stage.version
                    ))
                })?
            }
        };

        if !node.is_process() {
            return Err(TixError::validation(
                "nodeId",
                format!("node {} is a {} node, not a process step", node.node_id, node.node_type),
            ));
        }

        let status_id = match mode {
            TransitionMode::Dispatch => self.graph.dispatch_status().to_string(),
            TransitionMode::Status => request
                .status_id
                .clone()
                .or_else(|| node.action().map(str::to_string))
                .ok_or_else(|| TixError::validation("statusId", "node carries no action"))?,
        };

        Ok((node, status_id))
    }

    /// Apply one transition and return the new current stage.
    pub async fn update_current_stage(
        &self,
        request: StageUpdateRequest,
        mode: TransitionMode,
    ) -> TixResult<CaseCurrentStage> {
        tix_utils::validate_model(&request)?;

        let case = self
            .cases
            .find_case(&request.org_id, &request.case_id)
            .await?
            .ok_or_else(|| TixError::not_found(format!("case {}", request.case_id)))?;

        let (node, status_id) = self.resolve_target(&request, mode).await?;
        self.catalog.validate_transition(&case.status_id, &status_id)?;

        let now = Utc::now();
        let stage = stage_for_node(
            &case,
            &node,
            request.unit_id.clone(),
            request.unit_user.clone(),
            &request.username,
        );
        let responder = CaseResponder {
            org_id: case.org_id.clone(),
            case_id: case.case_id.clone(),
            unit_id: request.unit_id.clone(),
            user_owner: request.unit_user.clone(),
            status_id: status_id.clone(),
            created_at: now,
            created_by: request.username.clone(),
        };

        self.cases
            .apply_transition(
                &case.org_id,
                &case.case_id,
                StageTransitionWrite {
                    expected_status: case.status_id.clone(),
                    stage: stage.clone(),
                    status_id: status_id.clone(),
                    milestone: self.catalog.milestone_for(&status_id),
                    responder,
                    at: now,
                },
            )
            .await?;

        metrics().transitions.with_label_values(&[status_id.as_str()]).inc();
        tracing::info!(
            org_id = %case.org_id,
            case_id = %case.case_id,
            from = %case.status_id,
            to = %status_id,
            node_id = %node.node_id,
            ?mode,
            "Case stage updated"
        );

        self.after_transition(&case, &request, &node, &status_id, mode).await;
        Ok(stage)
    }

    async fn after_transition(
        &self,
        before: &Case,
        request: &StageUpdateRequest,
        node: &WorkflowNode,
        status_id: &str,
        mode: TransitionMode,
    ) {
        let case = match self.cases.find_case(&before.org_id, &before.case_id).await {
            Ok(Some(case)) => case,
            Ok(None) => before.clone(),
            Err(e) => {
                tracing::warn!(case_id = %before.case_id, error = %e, "Reload after transition failed");
                before.clone()
            }
        };

        let status = self.status_name(status_id).await;
        self.notifier.status_changed(&case, &status, request.unit_user.as_deref()).await;

        let event_type = match mode {
            TransitionMode::Status => HISTORY_STATUS,
            TransitionMode::Dispatch => HISTORY_DISPATCH,
        };
        let event = CaseHistoryEvent::new(
            &case,
            event_type,
            format!("{} -> {} ({})", before.status_id, status_id, status.name_en),
            json!({
                "statusId": status_id,
                "nodeId": node.node_id,
                "unitId": request.unit_id,
                "unitUser": request.unit_user,
                "resId": request.res_id,
                "resDetail": request.res_detail,
            }),
            &request.username,
        );
        if let Err(e) = self.cases.append_history(event).await {
            tracing::warn!(case_id = %case.case_id, error = %e, "History append failed");
        }

        if self.sla_closing_statuses.iter().any(|s| s == status_id) {
            if let Err(e) = self.dashboard.record_case_closed_with_sla(&case.org_id, &case.case_id).await {
                metrics().summary_failures.inc();
                tracing::error!(case_id = %case.case_id, error = %e, "Failed to fold closed case into summary");
            }
        }
    }

    /// Alert and history side effects of an SLA breach.
    pub async fn emit_sla_alert(&self, candidate: &SlaCandidate, level: u8) {
        self.notifier.sla_alert(candidate, level).await;
        metrics().sla_alerts.inc();

        let event = CaseHistoryEvent {
            org_id: candidate.org_id.clone(),
            case_id: candidate.case_id.clone(),
            event_type: HISTORY_SLA.to_string(),
            full_msg: format!("SLA of {} minutes exceeded (level {})", candidate.node_sla_minutes, level),
            json_data: json!({
                "statusId": candidate.status_id,
                "slaMinutes": candidate.node_sla_minutes,
                "delay": level,
            }),
            created_at: Utc::now(),
            created_by: "system".to_string(),
        };
        if let Err(e) = self.cases.append_history(event).await {
            tracing::warn!(case_id = %candidate.case_id, error = %e, "History append failed");
        }
    }
}
