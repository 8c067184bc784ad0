//! Work-order payloads exchanged with the external ESB (Mettriq).
//!
//! Inbound messages arrive on Kafka topics; outbound requests are POSTed to
//! the work-order API. Both use snake_case field names on the wire.

use serde::{Deserialize, Serialize};

use crate::Recipient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Case-insensitive parse; unknown text yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Self::Critical),
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderAssignee {
    pub unit_id: Option<String>,
    pub username: Option<String>,
}

impl WorkOrderAssignee {
    pub fn is_empty(&self) -> bool {
        self.unit_id.as_deref().map_or(true, str::is_empty)
            && self.username.as_deref().map_or(true, str::is_empty)
    }
}

/// Work-order create/update message consumed from the ESB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderMessage {
    #[serde(default)]
    pub org_id: Option<String>,
    pub work_order_number: String,
    #[serde(default)]
    pub work_order_type: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub location: Option<WorkOrderLocation>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub assignee: Option<WorkOrderAssignee>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub device_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

/// Work-order representation sent to the external system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderRequest {
    pub work_order_number: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub location: WorkOrderLocation,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<WorkOrderAssignee>,
    pub namespace: String,
    pub source: String,
}

/// User account create/update message (staff and admin topics share the shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccountMessage {
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub emp_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl UserAccountMessage {
    /// Username if present, otherwise the employee code.
    pub fn login_key(&self) -> Option<&str> {
        self.username
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.emp_id.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStatusMessage {
    #[serde(default)]
    pub org_id: Option<String>,
    pub unit_id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub checked_in: bool,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsbNotificationMessage {
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub case_id: Option<String>,
    pub event_type: String,
    pub message: String,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse_is_case_insensitive() {
        assert_eq!(Severity::parse("high"), Some(Severity::High));
        assert_eq!(Severity::parse(" Critical "), Some(Severity::Critical));
        assert_eq!(Severity::parse("urgent"), None);
    }

    #[test]
    fn test_work_order_message_tolerates_missing_fields() {
        let msg: WorkOrderMessage =
            serde_json::from_str(r#"{"work_order_number": "WO-1", "images": ["a.jpg"]}"#).unwrap();
        assert_eq!(msg.work_order_number, "WO-1");
        assert_eq!(msg.images, vec!["a.jpg".to_string()]);
        assert!(msg.assignee.is_none());
    }

    #[test]
    fn test_login_key_prefers_username() {
        let mut msg = UserAccountMessage {
            org_id: None,
            username: Some("somchai".into()),
            emp_id: Some("E001".into()),
            first_name: None,
            last_name: None,
            email: None,
            mobile: None,
            password: None,
            user_type: None,
            source: None,
        };
        assert_eq!(msg.login_key(), Some("somchai"));
        msg.username = Some(String::new());
        assert_eq!(msg.login_key(), Some("E001"));
    }
}
