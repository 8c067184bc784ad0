use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const SECTION_NODES: &str = "nodes";
pub const SECTION_CONNECTIONS: &str = "connections";
pub const NODE_TYPE_PROCESS: &str = "process";

/// One step of a workflow graph.
///
/// `data` holds the editor payload; the fields the backend cares about live
/// under `data.data.config` (`action`, `SLA`, `pic`, `group`, `formId`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub org_id: String,
    pub wf_id: String,
    pub version: String,
    pub node_id: String,
    pub node_type: String,
    pub section: String,
    pub data: serde_json::Value,
}

impl WorkflowNode {
    pub fn config(&self) -> Option<&serde_json::Value> {
        self.data.get("data").and_then(|d| d.get("config"))
    }

    fn config_str(&self, key: &str) -> Option<&str> {
        self.config().and_then(|c| c.get(key)).and_then(|v| v.as_str())
    }

    /// Status code this node represents.
    pub fn action(&self) -> Option<&str> {
        self.config_str("action")
    }

    /// SLA in minutes. Stored string-encoded; numbers are accepted too.
    pub fn sla_minutes(&self) -> Option<i32> {
        let raw = self.config().and_then(|c| c.get("SLA"))?;
        match raw {
            serde_json::Value::String(s) => s.trim().parse().ok(),
            serde_json::Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
            _ => None,
        }
    }

    pub fn pic(&self) -> Option<&str> {
        self.config_str("pic")
    }

    pub fn group(&self) -> Option<&str> {
        self.config_str("group")
    }

    pub fn form_id(&self) -> Option<&str> {
        self.config_str("formId")
    }

    pub fn is_process(&self) -> bool {
        self.node_type == NODE_TYPE_PROCESS
    }

    /// Sort key: `nodes` first, then `connections`, then everything else.
    pub fn section_rank(&self) -> u8 {
        match self.section.as_str() {
            SECTION_NODES => 0,
            SECTION_CONNECTIONS => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub org_id: String,
    pub wf_id: String,
    pub title: String,
    pub version: String,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}
