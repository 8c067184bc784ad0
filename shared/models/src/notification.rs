use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecipientKind {
    OrgId,
    ProvId,
    DistId,
    Username,
    UnitId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(rename = "type")]
    pub kind: RecipientKind,
    pub value: String,
}

impl Recipient {
    pub fn province(prov_id: impl Into<String>) -> Self {
        Self { kind: RecipientKind::ProvId, value: prov_id.into() }
    }

    pub fn org(org_id: impl Into<String>) -> Self {
        Self { kind: RecipientKind::OrgId, value: org_id.into() }
    }

    pub fn user(username: impl Into<String>) -> Self {
        Self { kind: RecipientKind::Username, value: username.into() }
    }
}

/// Notification delivered to connected clients.
///
/// `hidden` notifications feed dashboard widgets and never show in a user's
/// notification list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub org_id: String,
    pub case_id: Option<String>,
    pub sender: String,
    pub sender_type: String,
    pub event_type: String,
    pub message: String,
    pub recipients: Vec<Recipient>,
    pub data: serde_json::Value,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        org_id: impl Into<String>,
        sender: impl Into<String>,
        event_type: impl Into<String>,
        message: impl Into<String>,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            case_id: None,
            sender: sender.into(),
            sender_type: "system".to_string(),
            event_type: event_type.into(),
            message: message.into(),
            recipients,
            data: serde_json::Value::Null,
            hidden: false,
            created_at: Utc::now(),
        }
    }

    pub fn for_case(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}
