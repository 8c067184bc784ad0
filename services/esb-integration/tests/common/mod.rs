#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tix_case_workflow::sync::WorkOrderClient;
use tix_case_workflow::{CaseServices, Stores};
use tix_database::memory::InMemoryStore;
use tix_esb_integration::consumer::{MessageSource, SourceConnector};
use tix_esb_integration::handlers::EsbContext;
use tix_models::{
    AreaDistrict, CaseSubType, GroupType, SyncKind, WorkOrderRequest, WorkflowNode, NODE_TYPE_PROCESS,
    SECTION_NODES,
};
use tix_utils::{AppConfig, TixResult};

pub const ORG: &str = "org-1";
pub const WF: &str = "WF1";

fn process(node_id: &str, action: &str) -> WorkflowNode {
    WorkflowNode {
        org_id: ORG.into(),
        wf_id: WF.into(),
        version: "v1".into(),
        node_id: node_id.into(),
        node_type: NODE_TYPE_PROCESS.into(),
        section: SECTION_NODES.into(),
        data: json!({ "data": { "config": { "action": action }, "label": node_id } }),
    }
}

/// Counts outbound sync calls; inbound handling must not produce any.
#[derive(Default)]
pub struct SilentClient {
    pub sent: Mutex<Vec<SyncKind>>,
}

#[async_trait]
impl WorkOrderClient for SilentClient {
    async fn send(&self, kind: SyncKind, _request: &WorkOrderRequest) -> TixResult<()> {
        self.sent.lock().unwrap().push(kind);
        Ok(())
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub client: Arc<SilentClient>,
    pub services: CaseServices,
    pub context: EsbContext,
}

pub async fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    store
        .seed_workflow(
            ORG,
            WF,
            "v1",
            vec![
                process("n-new", "S001"),
                process("n-assign", "S002"),
                process("n-progress", "S004"),
                process("n-done", "S006"),
                process("n-close", "S008"),
            ],
        )
        .await;
    store
        .seed_sub_type(CaseSubType {
            org_id: ORG.into(),
            case_type_id: "T1".into(),
            s_type_id: "S1".into(),
            wf_id: WF.into(),
            case_sla: Some("60".into()),
            priority: Some(3),
            device_type: Some("CCTV".into()),
            work_order_type: Some("MAINT".into()),
        })
        .await;
    store
        .seed_area(AreaDistrict {
            org_id: ORG.into(),
            namespace: "bkk-gate".into(),
            country_id: "TH".into(),
            prov_id: "10".into(),
            dist_id: "1001".into(),
        })
        .await;
    store
        .seed_group_types(vec![GroupType {
            id: 1,
            org_id: ORG.into(),
            group_type_id: "G-MAINT".into(),
            en: "Maintenance".into(),
            th: "ซ่อมบำรุง".into(),
            case_type_ids: vec!["T1".into()],
            prefix: "maint".into(),
        }])
        .await;
    store.seed_unit(ORG, "unit-9").await;

    let mut config = AppConfig::default();
    config.integration.default_org_id = ORG.into();
    let client = Arc::new(SilentClient::default());
    let services = CaseServices::new(&config, Stores::from_single(store.clone()), client.clone());
    let context = EsbContext::new(services.clone());

    Fixture { store, client, services, context }
}

/// Serves a fixed list of payloads per topic, then ends the stream.
#[derive(Default)]
pub struct ScriptedConnector {
    pub topics: Mutex<HashMap<String, Vec<Vec<u8>>>>,
}

impl ScriptedConnector {
    pub fn push(&self, topic: &str, payload: serde_json::Value) {
        self.topics
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push(payload.to_string().into_bytes());
    }

    pub fn push_raw(&self, topic: &str, payload: &[u8]) {
        self.topics.lock().unwrap().entry(topic.to_string()).or_default().push(payload.to_vec());
    }
}

struct Scripted(Vec<Vec<u8>>);

#[async_trait]
impl MessageSource for Scripted {
    async fn recv(&mut self) -> TixResult<Option<Vec<u8>>> {
        if self.0.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.0.remove(0)))
    }
}

#[async_trait]
impl SourceConnector for ScriptedConnector {
    async fn connect(&self, topic: &str) -> TixResult<Box<dyn MessageSource>> {
        let payloads = self.topics.lock().unwrap().remove(topic).unwrap_or_default();
        Ok(Box::new(Scripted(payloads)))
    }
}
