//! ESB topic handlers: map inbound payloads onto case intake, stage
//! transitions, the user/unit directory and notifications.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use tix_case_workflow::engine::{StageUpdateRequest, TransitionMode};
use tix_case_workflow::intake::{IntakeOutcome, OpenCase};
use tix_case_workflow::state_machine::CaseStatus;
use tix_case_workflow::CaseServices;
use tix_models::{
    CaseCurrentStage, EsbNotificationMessage, Geography, Notification, Severity, UnitStatusMessage,
    UnitStatusUpdate, UpsertOutcome, UserAccountMessage, UserProfile, WorkOrderMessage,
};
use tix_utils::{SeverityPriorities, TixError, TixResult, UnitStatusCodes};

use crate::consumer::TopicHandler;

/// Acting username for changes driven by ESB messages.
pub const ESB_USER: &str = "esb";

/// Case priority for an external severity. Unknown or missing severities get
/// the `LOW` priority.
pub fn priority_for_severity(raw: Option<&str>, priorities: &SeverityPriorities) -> i32 {
    match raw.and_then(Severity::parse).unwrap_or(Severity::Low) {
        Severity::Critical => priorities.critical,
        Severity::High => priorities.high,
        Severity::Medium => priorities.medium,
        Severity::Low => priorities.low,
    }
}

/// PHC-format argon2id hash with a random salt.
pub fn hash_password(password: &str) -> TixResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TixError::internal(format!("password hashing failed: {}", e)))
}

/// Device metadata stored on the case: the payload's own metadata plus the
/// namespace and location when it does not carry them.
fn device_metadata(message: &WorkOrderMessage) -> Value {
    let mut metadata = match &message.device_metadata {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let Some(namespace) = message.namespace.as_deref().filter(|n| !n.is_empty()) {
        metadata.entry("namespace").or_insert_with(|| json!(namespace));
    }
    if let Some(location) = &message.location {
        if let Some(latitude) = location.latitude {
            metadata.entry("latitude").or_insert_with(|| json!(latitude));
        }
        if let Some(longitude) = location.longitude {
            metadata.entry("longitude").or_insert_with(|| json!(longitude));
        }
        if let Some(address) = &location.address {
            metadata.entry("address").or_insert_with(|| json!(address));
        }
    }
    Value::Object(metadata)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Result of a work-order update message.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Transitioned(CaseCurrentStage),
    /// `NEW`/`ASSIGNED` updates carry no transition for us.
    Ignored,
}

/// Shared state for all topic handlers.
pub struct EsbContext {
    pub services: CaseServices,
    pub default_org_id: String,
    pub priorities: SeverityPriorities,
    pub unit_status: UnitStatusCodes,
}

impl EsbContext {
    pub fn new(services: CaseServices) -> Self {
        let integration = &services.config.integration;
        Self {
            default_org_id: integration.default_org_id.clone(),
            priorities: integration.severity_priorities.clone(),
            unit_status: integration.unit_status.clone(),
            services,
        }
    }

    fn org_of(&self, org_id: Option<&str>) -> String {
        non_empty(org_id).unwrap_or_else(|| self.default_org_id.clone())
    }

    pub async fn create_work_order(&self, message: WorkOrderMessage) -> TixResult<IntakeOutcome> {
        let org_id = self.org_of(message.org_id.as_deref());
        let cases = &self.services.stores.cases;

        let device_type = non_empty(message.device_type.as_deref())
            .ok_or_else(|| TixError::validation("device_type", "device type is required"))?;
        let work_order_type = non_empty(message.work_order_type.as_deref())
            .ok_or_else(|| TixError::validation("work_order_type", "work order type is required"))?;

        if let Some(existing) = cases.find_case_by_reference(&org_id, &message.work_order_number).await? {
            tracing::info!(
                org_id = %org_id,
                case_id = %existing.case_id,
                work_order = %message.work_order_number,
                "Work order already has a case"
            );
            return Ok(IntakeOutcome::Existing(existing));
        }

        let sub_type = cases
            .find_sub_type_for_work_order(&org_id, &device_type, &work_order_type)
            .await?
            .ok_or_else(|| TixError::not_found(format!("case sub-type for {}/{}", device_type, work_order_type)))?;

        let geography = match non_empty(message.namespace.as_deref()) {
            Some(namespace) => match cases.find_area(&org_id, &namespace).await? {
                Some(area) => Geography::from(area),
                None => {
                    tracing::warn!(org_id = %org_id, namespace = %namespace, "No district for namespace");
                    Geography::default()
                }
            },
            None => Geography::default(),
        };

        let assignee = message.assignee.clone().unwrap_or_default();
        let request = OpenCase {
            org_id,
            priority: priority_for_severity(message.severity.as_deref(), &self.priorities),
            title: non_empty(message.title.as_deref()).unwrap_or_else(|| message.work_order_number.clone()),
            description: message.description.clone(),
            geography,
            integration_ref_number: Some(message.work_order_number.clone()),
            device_metadata: device_metadata(&message),
            attachments: message.images.clone(),
            source: non_empty(message.source.as_deref()).unwrap_or_else(|| ESB_USER.to_string()),
            username: non_empty(message.updated_by.as_deref()).unwrap_or_else(|| ESB_USER.to_string()),
            unit_id: non_empty(assignee.unit_id.as_deref()),
            unit_user: non_empty(assignee.username.as_deref()),
            channel: 'I',
            sub_type,
        };

        self.services.intake.open_case(request).await
    }

    pub async fn update_work_order(&self, message: WorkOrderMessage) -> TixResult<UpdateOutcome> {
        let org_id = self.org_of(message.org_id.as_deref());
        let status = message.status.as_deref().unwrap_or_default();

        if matches!(CaseStatus::from_name(status), Some(CaseStatus::New | CaseStatus::Assigned)) {
            tracing::debug!(work_order = %message.work_order_number, status, "Ignoring work-order update");
            return Ok(UpdateOutcome::Ignored);
        }

        let status_id = self
            .services
            .catalog
            .inbound_code(status, message.state.as_deref())
            .ok_or_else(|| TixError::validation("status", format!("unmapped work-order status '{}'", status)))?;

        let case = self
            .services
            .stores
            .cases
            .find_case_by_reference(&org_id, &message.work_order_number)
            .await?
            .ok_or_else(|| TixError::not_found(format!("case for work order {}", message.work_order_number)))?;

        let assignee = message.assignee.clone().unwrap_or_default();
        let request = StageUpdateRequest {
            org_id,
            case_id: case.case_id,
            status_id: Some(status_id),
            unit_id: non_empty(assignee.unit_id.as_deref()),
            unit_user: non_empty(assignee.username.as_deref()),
            username: non_empty(message.updated_by.as_deref()).unwrap_or_else(|| ESB_USER.to_string()),
            ..Default::default()
        };

        let stage = self
            .services
            .engine
            .update_current_stage(request, TransitionMode::Status)
            .await?;
        Ok(UpdateOutcome::Transitioned(stage))
    }

    pub async fn upsert_user(&self, message: UserAccountMessage, default_user_type: &str) -> TixResult<UpsertOutcome> {
        let username = message
            .login_key()
            .map(str::to_string)
            .ok_or_else(|| TixError::validation("username", "username or employee code is required"))?;
        let password_hash = match non_empty(message.password.as_deref()) {
            Some(password) => Some(hash_password(&password)?),
            None => None,
        };

        let profile = UserProfile {
            org_id: self.org_of(message.org_id.as_deref()),
            username,
            emp_id: message.emp_id,
            first_name: message.first_name,
            last_name: message.last_name,
            email: message.email,
            mobile: message.mobile,
            user_type: non_empty(message.user_type.as_deref()).unwrap_or_else(|| default_user_type.to_string()),
        };

        let outcome = self
            .services
            .stores
            .directory
            .upsert_user(&profile, password_hash.as_deref())
            .await?;
        tracing::info!(org_id = %profile.org_id, username = %profile.username, ?outcome, "User account synchronized");
        Ok(outcome)
    }

    pub async fn delete_user(&self, message: UserAccountMessage) -> TixResult<()> {
        let org_id = self.org_of(message.org_id.as_deref());
        let username = message
            .login_key()
            .ok_or_else(|| TixError::validation("username", "username or employee code is required"))?;

        let affected = self.services.stores.directory.deactivate_user(&org_id, username).await?;
        if affected == 0 {
            return Err(TixError::not_found(format!("no user found: {}", username)));
        }
        tracing::info!(org_id = %org_id, username, "User account deactivated");
        Ok(())
    }

    pub async fn update_unit_status(&self, message: UnitStatusMessage) -> TixResult<()> {
        let status_id = if message.checked_in {
            self.unit_status.checked_in.clone()
        } else {
            self.unit_status.checked_out.clone()
        };
        let update = UnitStatusUpdate {
            org_id: self.org_of(message.org_id.as_deref()),
            unit_id: message.unit_id,
            username: non_empty(message.username.as_deref()),
            is_login: message.checked_in,
            status_id,
            latitude: message.latitude,
            longitude: message.longitude,
            at: chrono::Utc::now(),
        };

        if self.services.stores.directory.update_unit_status(&update).await? == 0 {
            return Err(TixError::not_found(format!("unit {}", update.unit_id)));
        }
        Ok(())
    }

    pub async fn forward_notification(&self, message: EsbNotificationMessage) -> TixResult<()> {
        let sender = non_empty(message.source.as_deref()).unwrap_or_else(|| ESB_USER.to_string());
        let mut notification = Notification::new(
            self.org_of(message.org_id.as_deref()),
            sender,
            message.event_type,
            message.message,
            message.recipients,
        )
        .with_data(message.data.unwrap_or(Value::Null));
        if let Some(case_id) = non_empty(message.case_id.as_deref()) {
            notification = notification.for_case(case_id);
        }
        self.services.notifier.forward(notification).await
    }
}

pub struct WorkOrderCreated(pub Arc<EsbContext>);

#[async_trait]
impl TopicHandler for WorkOrderCreated {
    type Message = WorkOrderMessage;

    fn source(message: &WorkOrderMessage) -> Option<&str> {
        message.source.as_deref()
    }

    async fn handle(&self, message: WorkOrderMessage) -> TixResult<()> {
        let work_order = message.work_order_number.clone();
        match self.0.create_work_order(message).await? {
            IntakeOutcome::Created(case) => {
                tracing::info!(org_id = %case.org_id, case_id = %case.case_id, work_order = %work_order, "Case opened from work order");
            }
            IntakeOutcome::Existing(_) => {}
        }
        Ok(())
    }
}

pub struct WorkOrderUpdated(pub Arc<EsbContext>);

#[async_trait]
impl TopicHandler for WorkOrderUpdated {
    type Message = WorkOrderMessage;

    fn source(message: &WorkOrderMessage) -> Option<&str> {
        message.source.as_deref()
    }

    async fn handle(&self, message: WorkOrderMessage) -> TixResult<()> {
        let work_order = message.work_order_number.clone();
        if let UpdateOutcome::Transitioned(stage) = self.0.update_work_order(message).await? {
            tracing::info!(case_id = %stage.case_id, node_id = %stage.node_id, work_order = %work_order, "Case advanced from work order");
        }
        Ok(())
    }
}

/// Staff and admin create/update topics; `user_type` applies when the
/// message does not name one.
pub struct UserAccountUpserted {
    pub context: Arc<EsbContext>,
    pub user_type: &'static str,
}

#[async_trait]
impl TopicHandler for UserAccountUpserted {
    type Message = UserAccountMessage;

    fn source(message: &UserAccountMessage) -> Option<&str> {
        message.source.as_deref()
    }

    async fn handle(&self, message: UserAccountMessage) -> TixResult<()> {
        self.context.upsert_user(message, self.user_type).await.map(|_| ())
    }
}

pub struct UserAccountDeleted(pub Arc<EsbContext>);

#[async_trait]
impl TopicHandler for UserAccountDeleted {
    type Message = UserAccountMessage;

    fn source(message: &UserAccountMessage) -> Option<&str> {
        message.source.as_deref()
    }

    async fn handle(&self, message: UserAccountMessage) -> TixResult<()> {
        self.0.delete_user(message).await
    }
}

pub struct UnitStatusChanged(pub Arc<EsbContext>);

#[async_trait]
impl TopicHandler for UnitStatusChanged {
    type Message = UnitStatusMessage;

    fn source(message: &UnitStatusMessage) -> Option<&str> {
        message.source.as_deref()
    }

    async fn handle(&self, message: UnitStatusMessage) -> TixResult<()> {
        self.0.update_unit_status(message).await
    }
}

pub struct EsbNotified(pub Arc<EsbContext>);

#[async_trait]
impl TopicHandler for EsbNotified {
    type Message = EsbNotificationMessage;

    fn source(message: &EsbNotificationMessage) -> Option<&str> {
        message.source.as_deref()
    }

    async fn handle(&self, message: EsbNotificationMessage) -> TixResult<()> {
        self.0.forward_notification(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_priority_for_severity_is_case_insensitive() {
        let priorities = SeverityPriorities::default();
        assert_eq!(priority_for_severity(Some("critical"), &priorities), 1);
        assert_eq!(priority_for_severity(Some("High"), &priorities), 2);
        assert_eq!(priority_for_severity(Some("MEDIUM"), &priorities), 3);
        assert_eq!(priority_for_severity(None, &priorities), 4);
    }

    #[test]
    fn test_hash_password_is_phc_argon2id() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_ne!(hash, hash_password("s3cret").unwrap());
    }

    #[test]
    fn test_device_metadata_keeps_payload_values() {
        let message: WorkOrderMessage = serde_json::from_value(json!({
            "work_order_number": "WO-1",
            "namespace": "bkk-gate",
            "location": {"latitude": 13.7, "longitude": 100.5, "address": "Gate 3"},
            "device_metadata": {"namespace": "explicit", "serial": "X1"}
        }))
        .unwrap();

        let metadata = device_metadata(&message);
        assert_eq!(metadata["namespace"], "explicit");
        assert_eq!(metadata["serial"], "X1");
        assert_eq!(metadata["latitude"], 13.7);
        assert_eq!(metadata["address"], "Gate 3");
    }

    proptest! {
        #[test]
        fn prop_unknown_severity_maps_to_low(raw in "[a-z]{1,12}") {
            prop_assume!(Severity::parse(&raw).is_none());
            let priorities = SeverityPriorities::default();
            prop_assert_eq!(priority_for_severity(Some(&raw), &priorities), priorities.low);
        }
    }
}
