use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use tix_database::{postgres_health_check, redis_health_check};
use tix_models::{Geography, Recipient, SyncKind};
use tix_utils::{validate_model, TixError};

use super::middleware::Tenant;
use super::response::{success, ApiResult};
use super::AppState;
use crate::engine::{StageUpdateRequest, TransitionMode};
use crate::intake::{IntakeOutcome, OpenCase};

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "tix-case-workflow",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn metrics_handler() -> String {
    crate::metrics::render()
}

pub async fn detailed_health_check(State(state): State<AppState>) -> Json<Value> {
    let mut checks = serde_json::Map::new();

    if let Some(backends) = &state.backends {
        let postgres = match postgres_health_check(&backends.postgres).await {
            Ok(()) => json!({"status": "healthy", "message": "Connected"}),
            Err(e) => json!({"status": "unhealthy", "message": e.to_string()}),
        };
        checks.insert("postgres".into(), postgres);

        let mut redis = backends.redis.clone();
        let redis = match redis_health_check(&mut redis).await {
            Ok(()) => json!({"status": "healthy", "message": "Connected"}),
            Err(e) => json!({"status": "unhealthy", "message": e.to_string()}),
        };
        checks.insert("redis".into(), redis);
    }

    let all_healthy = checks.values().all(|check| check["status"] == "healthy");

    Json(json!({
        "status": if all_healthy { "healthy" } else { "degraded" },
        "service": "tix-case-workflow",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": checks,
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaseRequest {
    #[validate(length(min = 1))]
    pub case_s_type_id: String,
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub country_id: String,
    #[validate(length(min = 1))]
    pub prov_id: String,
    #[serde(default)]
    pub dist_id: String,
    #[serde(default)]
    pub integration_ref_number: Option<String>,
    #[serde(default)]
    pub device_metadata: Option<Value>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub unit_id: Option<String>,
    #[serde(default)]
    pub unit_user: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn create_case(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(request): Json<CreateCaseRequest>,
) -> ApiResult<Value> {
    validate_model(&request)?;
    let services = &state.services;

    let sub_type = services
        .stores
        .cases
        .find_sub_type(&tenant.org_id, &request.case_s_type_id)
        .await?
        .ok_or_else(|| TixError::not_found(format!("case sub-type {}", request.case_s_type_id)))?;
    let priority = request
        .priority
        .or(sub_type.priority)
        .unwrap_or(services.config.integration.severity_priorities.low);

    let outcome = services
        .intake
        .open_case(OpenCase {
            org_id: tenant.org_id.clone(),
            sub_type,
            title: request.title,
            description: request.description,
            priority,
            geography: Geography {
                country_id: request.country_id,
                prov_id: request.prov_id,
                dist_id: request.dist_id,
            },
            integration_ref_number: request.integration_ref_number,
            device_metadata: request.device_metadata.unwrap_or_else(|| json!({})),
            attachments: request.attachments,
            source: request.source.unwrap_or_else(|| "web".to_string()),
            username: tenant.username,
            unit_id: request.unit_id,
            unit_user: request.unit_user,
            channel: 'I',
        })
        .await?;

    let created = matches!(outcome, IntakeOutcome::Created(_));
    if created {
        services
            .sync
            .sync_or_enqueue(&tenant.org_id, &outcome.case().case_id, SyncKind::Create)
            .await;
    }

    Ok(success(json!({ "case": outcome.case(), "created": created })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageUpdateBody {
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
    /// Force the dispatch node and status.
    #[serde(default)]
    pub dispatch: bool,
}

pub async fn update_case_stage(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(case_id): Path<String>,
    Json(body): Json<StageUpdateBody>,
) -> ApiResult<Value> {
    let services = &state.services;
    let mode = if body.dispatch { TransitionMode::Dispatch } else { TransitionMode::Status };

    let stage = services
        .engine
        .update_current_stage(
            StageUpdateRequest {
                org_id: tenant.org_id.clone(),
                case_id: case_id.clone(),
                status_id: body.status_id,
                node_id: body.node_id,
                unit_id: body.unit_id,
                unit_user: body.unit_user,
                res_id: body.res_id,
                res_detail: body.res_detail,
                username: tenant.username,
            },
            mode,
        )
        .await?;

    services.sync.sync_or_enqueue(&tenant.org_id, &case_id, SyncKind::Update).await;

    Ok(success(json!({ "currentStage": stage })))
}

/// Case, its workflow nodes and its current stage.
pub async fn get_case_sop(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(case_id): Path<String>,
) -> ApiResult<Value> {
    let services = &state.services;
    let case = services
        .stores
        .cases
        .find_case(&tenant.org_id, &case_id)
        .await?
        .ok_or_else(|| TixError::not_found(format!("case {}", case_id)))?;
    let graph = services
        .engine
        .graph()
        .get_workflow_and_current_node(&tenant.org_id, &case_id, None)
        .await?;

    Ok(success(json!({
        "case": case,
        "currentStage": graph.current_stage,
        "workflow": {
            "wfId": graph.current_stage.wf_id,
            "version": graph.current_stage.version,
            "nodes": graph.nodes,
        },
        "dispatchNode": graph.dispatch_node,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    /// `YYYY/MM/DD`; today in the reporting offset when absent.
    pub date: Option<String>,
}

pub async fn get_dashboard_summary(
    State(state): State<AppState>,
    tenant: Tenant,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Value> {
    let dashboard = &state.services.dashboard;
    let date = query.date.unwrap_or_else(|| dashboard.today());
    let summary = dashboard.summary_for(&tenant.org_id, &date).await?;
    Ok(success(serde_json::to_value(summary).map_err(TixError::from)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct BroadcastBody {
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

pub async fn broadcast_dashboard_summary(
    State(state): State<AppState>,
    tenant: Tenant,
    body: Option<Json<BroadcastBody>>,
) -> ApiResult<Value> {
    let mut recipients = body.map(|Json(b)| b.recipients).unwrap_or_default();
    if recipients.is_empty() {
        recipients.push(Recipient::org(&tenant.org_id));
    }

    let summary = state
        .services
        .dashboard
        .broadcast_summary(&tenant.org_id, &tenant.username, recipients)
        .await?;
    Ok(success(serde_json::to_value(summary).map_err(TixError::from)?))
}
