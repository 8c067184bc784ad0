use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A work-order/ticket tracked through a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub org_id: String,
    pub case_id: String,
    pub case_type_id: String,
    pub case_s_type_id: String,
    pub wf_id: String,
    pub wf_version: String,
    pub priority: i32,
    pub status_id: String,
    pub title: String,
    pub description: Option<String>,
    pub country_id: String,
    pub prov_id: String,
    pub dist_id: String,
    pub case_sla: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub start_at: Option<DateTime<Utc>>,
    pub command_at: Option<DateTime<Utc>>,
    pub receive_at: Option<DateTime<Utc>>,
    pub arrive_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub over_sla: bool,
    pub over_sla_date: Option<DateTime<Utc>>,
    pub over_sla_count: i32,
    pub schedule_flag: bool,
    pub schedule_date: Option<DateTime<Utc>>,
    pub integration_ref_number: Option<String>,
    pub device_metadata: serde_json::Value,
    pub source: String,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl Case {
    pub fn geography(&self) -> Geography {
        Geography {
            country_id: self.country_id.clone(),
            prov_id: self.prov_id.clone(),
            dist_id: self.dist_id.clone(),
        }
    }

    /// Elapsed time from creation to close; `None` while the case is open.
    pub fn close_duration(&self) -> Option<chrono::Duration> {
        self.closed_at.map(|closed| closed - self.created_at)
    }
}

/// Country / province / district triple used to scope recipients and summary buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Geography {
    pub country_id: String,
    pub prov_id: String,
    pub dist_id: String,
}

/// Pointer from a case to the workflow node it currently occupies.
///
/// Node type, section and data are denormalized copies of the node so that
/// SOP reads do not need to join `wf_nodes`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseCurrentStage {
    pub org_id: String,
    pub case_id: String,
    pub wf_id: String,
    pub version: String,
    pub node_id: String,
    pub node_type: String,
    pub section: String,
    pub data: serde_json::Value,
    pub pic: Option<String>,
    pub group_id: Option<String>,
    pub form_id: Option<String>,
    pub unit_id: Option<String>,
    pub username: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseResponder {
    pub org_id: String,
    pub case_id: String,
    pub unit_id: Option<String>,
    pub user_owner: Option<String>,
    pub status_id: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseHistoryEvent {
    pub org_id: String,
    pub case_id: String,
    pub event_type: String,
    pub full_msg: String,
    pub json_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl CaseHistoryEvent {
    pub fn new(
        case: &Case,
        event_type: impl Into<String>,
        full_msg: impl Into<String>,
        json_data: serde_json::Value,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            org_id: case.org_id.clone(),
            case_id: case.case_id.clone(),
            event_type: event_type.into(),
            full_msg: full_msg.into(),
            json_data,
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseAttachment {
    pub org_id: String,
    pub case_id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Localized display name of a status code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseStatusName {
    pub status_id: String,
    pub name_th: String,
    pub name_en: String,
}

/// Case sub-type row: resolves classification, workflow and SLA for new cases.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseSubType {
    pub org_id: String,
    pub case_type_id: String,
    pub s_type_id: String,
    pub wf_id: String,
    pub case_sla: Option<String>,
    pub priority: Option<i32>,
    pub device_type: Option<String>,
    pub work_order_type: Option<String>,
}

impl CaseSubType {
    /// SLA minutes; the column is text in upstream data so non-numeric values read as `None`.
    pub fn sla_minutes(&self) -> Option<i32> {
        self.case_sla.as_deref().and_then(|s| s.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AreaDistrict {
    pub org_id: String,
    pub namespace: String,
    pub country_id: String,
    pub prov_id: String,
    pub dist_id: String,
}

impl From<AreaDistrict> for Geography {
    fn from(area: AreaDistrict) -> Self {
        Self {
            country_id: area.country_id,
            prov_id: area.prov_id,
            dist_id: area.dist_id,
        }
    }
}

/// Everything needed to insert a new case atomically.
#[derive(Debug, Clone)]
pub struct NewCaseRecord {
    pub case: Case,
    pub stage: CaseCurrentStage,
    pub responder: CaseResponder,
    pub attachments: Vec<CaseAttachment>,
}

/// Result of inserting a [`NewCaseRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum CaseInsert {
    Created,
    /// Another case already holds the integration reference; nothing was written.
    DuplicateReference(Case),
}

/// Case milestone columns stamped the first time a status is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Milestone {
    Command,
    Receive,
    Arrive,
    Closed,
}

impl Milestone {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Command => "command_at",
            Self::Receive => "receive_at",
            Self::Arrive => "arrive_at",
            Self::Closed => "closed_at",
        }
    }
}

/// The writes of one stage transition, applied as a single unit.
#[derive(Debug, Clone)]
pub struct StageTransitionWrite {
    /// Status the transition was validated from. The write is refused if the
    /// stored status no longer matches.
    pub expected_status: String,
    pub stage: CaseCurrentStage,
    pub status_id: String,
    pub milestone: Option<Milestone>,
    pub responder: CaseResponder,
    pub at: DateTime<Utc>,
}

/// Open case whose current node carries an SLA, as returned by the SLA scan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlaCandidate {
    pub org_id: String,
    pub case_id: String,
    pub status_id: String,
    pub prov_id: String,
    pub created_at: DateTime<Utc>,
    pub over_sla_count: i32,
    pub over_sla_date: Option<DateTime<Utc>>,
    pub node_sla_minutes: i32,
}
