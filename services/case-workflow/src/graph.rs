//! Workflow graph reads: a case's current stage plus the ordered node set of
//! the workflow version it is bound to.

use std::sync::Arc;

use tix_database::CaseStore;
use tix_models::{CaseCurrentStage, WorkflowNode};
use tix_utils::{TixError, TixResult};

#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    pub current_stage: CaseCurrentStage,
    /// `nodes` section first, then `connections`, then the rest.
    pub nodes: Vec<WorkflowNode>,
    /// First process node whose action is the dispatch status.
    pub dispatch_node: Option<WorkflowNode>,
}

impl WorkflowGraph {
    pub fn node_for_status(&self, status_id: &str) -> Option<&WorkflowNode> {
        node_for_status(&self.nodes, status_id)
    }

    pub fn current_node(&self) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.node_id == self.current_stage.node_id)
    }
}

/// Stable sort by section rank; ties keep store order.
pub fn order_nodes(mut nodes: Vec<WorkflowNode>) -> Vec<WorkflowNode> {
    nodes.sort_by_key(WorkflowNode::section_rank);
    nodes
}

pub fn node_for_status<'a>(nodes: &'a [WorkflowNode], status_id: &str) -> Option<&'a WorkflowNode> {
    nodes.iter().find(|n| n.is_process() && n.action() == Some(status_id))
}

#[derive(Clone)]
pub struct WorkflowGraphReader {
    cases: Arc<dyn CaseStore>,
    dispatch_status: String,
}

impl WorkflowGraphReader {
    pub fn new(cases: Arc<dyn CaseStore>, dispatch_status: impl Into<String>) -> Self {
        Self { cases, dispatch_status: dispatch_status.into() }
    }

    pub fn dispatch_status(&self) -> &str {
        &self.dispatch_status
    }

    pub async fn load_nodes(&self, org_id: &str, wf_id: &str, version: &str) -> TixResult<Vec<WorkflowNode>> {
        let nodes = self.cases.workflow_nodes(org_id, wf_id, version).await?;
        Ok(order_nodes(nodes))
    }

    /// Current stage of `case_id` with the full node list of its workflow.
    ///
    /// `version_override` reads the nodes of another version of the same
    /// workflow; the stage pointer itself is unchanged.
    pub async fn get_workflow_and_current_node(
        &self,
        org_id: &str,
        case_id: &str,
        version_override: Option<&str>,
    ) -> TixResult<WorkflowGraph> {
        let current_stage = self
            .cases
            .current_stage(org_id, case_id)
            .await?
            .ok_or_else(|| TixError::not_found(format!("current node not found for case {}", case_id)))?;

        let version = version_override.unwrap_or(&current_stage.version);
        let nodes = self.load_nodes(org_id, &current_stage.wf_id, version).await?;
        let dispatch_node = node_for_status(&nodes, &self.dispatch_status).cloned();

        tracing::debug!(
            org_id,
            case_id,
            wf_id = %current_stage.wf_id,
            version,
            nodes = nodes.len(),
            has_dispatch_node = dispatch_node.is_some(),
            "Loaded workflow graph"
        );

        Ok(WorkflowGraph { current_stage, nodes, dispatch_node })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tix_models::{NODE_TYPE_PROCESS, SECTION_CONNECTIONS, SECTION_NODES};

    fn node(id: &str, node_type: &str, section: &str, action: Option<&str>) -> WorkflowNode {
        WorkflowNode {
            org_id: "org".into(),
            wf_id: "WF1".into(),
            version: "v1".into(),
            node_id: id.into(),
            node_type: node_type.into(),
            section: section.into(),
            data: match action {
                Some(a) => json!({"data": {"config": {"action": a}}}),
                None => json!({}),
            },
        }
    }

    #[test]
    fn test_order_is_sections_then_insertion() {
        let ordered = order_nodes(vec![
            node("c1", "connection", SECTION_CONNECTIONS, None),
            node("x1", "meta", "extras", None),
            node("n1", NODE_TYPE_PROCESS, SECTION_NODES, Some("S001")),
            node("c2", "connection", SECTION_CONNECTIONS, None),
            node("n2", NODE_TYPE_PROCESS, SECTION_NODES, Some("S002")),
        ]);
        let ids: Vec<_> = ordered.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, ["n1", "n2", "c1", "c2", "x1"]);
    }

    #[test]
    fn test_status_lookup_only_matches_process_nodes() {
        let nodes = vec![
            node("d1", "decision", SECTION_NODES, Some("S002")),
            node("n2", NODE_TYPE_PROCESS, SECTION_NODES, Some("S002")),
        ];
        assert_eq!(node_for_status(&nodes, "S002").map(|n| n.node_id.as_str()), Some("n2"));
        assert!(node_for_status(&nodes, "S009").is_none());
    }
}
