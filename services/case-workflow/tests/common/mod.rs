#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tix_case_workflow::engine::stage_for_node;
use tix_case_workflow::intake::OpenCase;
use tix_case_workflow::sync::WorkOrderClient;
use tix_case_workflow::{CaseServices, Stores};
use tix_database::memory::InMemoryStore;
use tix_models::{
    Case, CaseStatusName, CaseSubType, Geography, GroupType, SyncKind, WorkOrderRequest, WorkflowNode,
    NODE_TYPE_PROCESS, SECTION_CONNECTIONS, SECTION_NODES,
};
use tix_utils::{AppConfig, TixError, TixResult};

pub const ORG: &str = "org-1";
pub const WF: &str = "WF1";
pub const VERSION: &str = "v1";

pub fn node(node_id: &str, node_type: &str, section: &str, action: Option<&str>, sla: Option<&str>) -> WorkflowNode {
    let mut config = serde_json::Map::new();
    if let Some(action) = action {
        config.insert("action".into(), json!(action));
    }
    if let Some(sla) = sla {
        config.insert("SLA".into(), json!(sla));
    }
    WorkflowNode {
        org_id: ORG.into(),
        wf_id: WF.into(),
        version: VERSION.into(),
        node_id: node_id.into(),
        node_type: node_type.into(),
        section: section.into(),
        data: json!({ "data": { "config": config, "label": node_id } }),
    }
}

pub fn process(node_id: &str, action: &str, sla: Option<&str>) -> WorkflowNode {
    node(node_id, NODE_TYPE_PROCESS, SECTION_NODES, Some(action), sla)
}

/// Start, NEW (30 min SLA), ASSIGNED, ACKNOWLEDGE, INPROGRESS, DONE, CLOSED, one edge.
/// No node carries ONHOLD.
pub fn workflow_nodes() -> Vec<WorkflowNode> {
    vec![
        node("edge-1", "edge", SECTION_CONNECTIONS, None, None),
        node("start", "start", SECTION_NODES, None, None),
        process("n-new", "S001", Some("30")),
        process("n-assign", "S002", Some("60")),
        process("n-ack", "S003", None),
        process("n-progress", "S004", None),
        process("n-done", "S006", None),
        process("n-close", "S008", None),
    ]
}

pub fn sub_type() -> CaseSubType {
    CaseSubType {
        org_id: ORG.into(),
        case_type_id: "T1".into(),
        s_type_id: "S1".into(),
        wf_id: WF.into(),
        case_sla: Some("60".into()),
        priority: Some(2),
        device_type: Some("CCTV".into()),
        work_order_type: Some("MAINT".into()),
    }
}

pub fn group_types() -> Vec<GroupType> {
    vec![
        GroupType {
            id: 1,
            org_id: ORG.into(),
            group_type_id: "G-MAINT".into(),
            en: "Maintenance".into(),
            th: "ซ่อมบำรุง".into(),
            case_type_ids: vec!["T1".into(), "T2".into()],
            prefix: "maint".into(),
        },
        GroupType {
            id: 2,
            org_id: ORG.into(),
            group_type_id: "G-FIRE".into(),
            en: "Fire".into(),
            th: "อัคคีภัย".into(),
            case_type_ids: vec!["T3".into()],
            prefix: "fire".into(),
        },
    ]
}

pub fn geography() -> Geography {
    Geography { country_id: "TH".into(), prov_id: "10".into(), dist_id: "1001".into() }
}

/// Work-order client that records requests and fails on demand.
#[derive(Default)]
pub struct RecordingClient {
    pub fail: AtomicBool,
    pub sent: Mutex<Vec<(SyncKind, WorkOrderRequest)>>,
}

impl RecordingClient {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(SyncKind, WorkOrderRequest)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkOrderClient for RecordingClient {
    async fn send(&self, kind: SyncKind, request: &WorkOrderRequest) -> TixResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TixError::external_service("Mettriq", "503 Service Unavailable"));
        }
        self.sent.lock().unwrap().push((kind, request.clone()));
        Ok(())
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub client: Arc<RecordingClient>,
    pub services: CaseServices,
    pub config: AppConfig,
}

pub async fn fixture() -> Fixture {
    fixture_with(AppConfig::default()).await
}

pub async fn fixture_with(config: AppConfig) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    store.seed_workflow(ORG, WF, VERSION, workflow_nodes()).await;
    store.seed_sub_type(sub_type()).await;
    store.seed_group_types(group_types()).await;
    store
        .seed_status_names(vec![CaseStatusName {
            status_id: "S002".into(),
            name_th: "มอบหมายแล้ว".into(),
            name_en: "Assigned".into(),
        }])
        .await;

    let client = Arc::new(RecordingClient::default());
    let services = CaseServices::new(&config, Stores::from_single(store.clone()), client.clone());

    Fixture { store, client, services, config }
}

pub fn open_request(reference: Option<&str>) -> OpenCase {
    OpenCase {
        org_id: ORG.into(),
        sub_type: sub_type(),
        title: "Camera offline".into(),
        description: Some("CCTV at gate 3 not responding".into()),
        priority: 2,
        geography: geography(),
        integration_ref_number: reference.map(str::to_string),
        device_metadata: json!({ "namespace": "bkk-gate" }),
        attachments: vec!["https://files.example/a.jpg".into()],
        source: "mettriq".into(),
        username: "operator".into(),
        unit_id: None,
        unit_user: None,
        channel: 'I',
    }
}

/// A case sitting on `node_id` since `created_at`.
pub async fn seed_case_at(store: &InMemoryStore, case_id: &str, status_id: &str, node_id: &str, created_at: DateTime<Utc>) -> Case {
    let geo = geography();
    let case = Case {
        org_id: ORG.into(),
        case_id: case_id.into(),
        case_type_id: "T1".into(),
        case_s_type_id: "S1".into(),
        wf_id: WF.into(),
        wf_version: VERSION.into(),
        priority: 2,
        status_id: status_id.into(),
        title: "Seeded".into(),
        description: None,
        country_id: geo.country_id,
        prov_id: geo.prov_id,
        dist_id: geo.dist_id,
        case_sla: Some(60),
        created_at,
        start_at: Some(created_at),
        command_at: None,
        receive_at: None,
        arrive_at: None,
        closed_at: None,
        over_sla: false,
        over_sla_date: None,
        over_sla_count: 0,
        schedule_flag: false,
        schedule_date: None,
        integration_ref_number: None,
        device_metadata: json!({}),
        source: "test".into(),
        created_by: "seed".into(),
        updated_at: created_at,
        updated_by: "seed".into(),
    };
    let node = workflow_nodes()
        .into_iter()
        .find(|n| n.node_id == node_id)
        .expect("fixture node exists");
    let stage = stage_for_node(&case, &node, None, None, "seed");
    store.seed_case(case.clone(), Some(stage)).await;
    case
}
