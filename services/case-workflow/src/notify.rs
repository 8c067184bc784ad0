use serde_json::json;
use std::sync::Arc;

use tix_database::NotificationSink;
use tix_models::{Case, CaseStatusName, Notification, Recipient, SlaCandidate};
use tix_utils::TixResult;

pub const EVENT_CASE_CREATED: &str = "CASE_CREATED";
pub const EVENT_STATUS_CHANGED: &str = "CASE_STATUS_CHANGED";
pub const EVENT_SLA_ALERT: &str = "CASE_OVER_SLA";
pub const EVENT_DASHBOARD_SUMMARY: &str = "DASHBOARD_CASE_SUMMARY";

/// Province of the case plus the assigned user, when there is one.
pub fn case_recipients(prov_id: &str, unit_user: Option<&str>) -> Vec<Recipient> {
    let mut recipients = vec![Recipient::province(prov_id)];
    if let Some(user) = unit_user.filter(|u| !u.is_empty()) {
        recipients.push(Recipient::user(user));
    }
    recipients
}

/// Notification templates. Delivery is best-effort: a failed push is logged
/// and never fails the operation that triggered it.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    sender: String,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, sender: impl Into<String>) -> Self {
        Self { sink, sender: sender.into() }
    }

    async fn send(&self, notification: Notification) {
        let event_type = notification.event_type.clone();
        let case_id = notification.case_id.clone();
        if let Err(e) = self.sink.push(notification).await {
            tracing::warn!(event_type = %event_type, ?case_id, error = %e, "Notification push failed");
        }
    }

    pub async fn forward(&self, notification: Notification) -> TixResult<()> {
        self.sink.push(notification).await
    }

    pub async fn case_created(&self, case: &Case) {
        let notification = Notification::new(
            &case.org_id,
            &self.sender,
            EVENT_CASE_CREATED,
            format!("New case {}: {}", case.case_id, case.title),
            case_recipients(&case.prov_id, None),
        )
        .for_case(&case.case_id)
        .with_data(json!({
            "caseId": case.case_id,
            "caseTypeId": case.case_type_id,
            "caseSTypeId": case.case_s_type_id,
            "priority": case.priority,
            "statusId": case.status_id,
        }));
        self.send(notification).await;
    }

    pub async fn status_changed(&self, case: &Case, status: &CaseStatusName, unit_user: Option<&str>) {
        let notification = Notification::new(
            &case.org_id,
            &self.sender,
            EVENT_STATUS_CHANGED,
            format!("Case {} is now {}", case.case_id, status.name_en),
            case_recipients(&case.prov_id, unit_user),
        )
        .for_case(&case.case_id)
        .with_data(json!({
            "caseId": case.case_id,
            "statusId": status.status_id,
            "statusTh": status.name_th,
            "statusEn": status.name_en,
        }));
        self.send(notification).await;
    }

    /// `delay` is the escalation level: 1 on the first breach, 2 afterwards.
    pub async fn sla_alert(&self, candidate: &SlaCandidate, delay: u8) {
        let notification = Notification::new(
            &candidate.org_id,
            &self.sender,
            EVENT_SLA_ALERT,
            format!(
                "Case {} exceeded its {} minute SLA",
                candidate.case_id, candidate.node_sla_minutes
            ),
            vec![Recipient::province(&candidate.prov_id)],
        )
        .for_case(&candidate.case_id)
        .with_data(json!({
            "caseId": candidate.case_id,
            "statusId": candidate.status_id,
            "slaMinutes": candidate.node_sla_minutes,
            "delay": delay,
        }));
        self.send(notification).await;
    }

    pub async fn dashboard_summary(
        &self,
        org_id: &str,
        username: &str,
        recipients: Vec<Recipient>,
        data: serde_json::Value,
    ) {
        let notification = Notification::new(
            org_id,
            username,
            EVENT_DASHBOARD_SUMMARY,
            "Case summary",
            recipients,
        )
        .with_data(data)
        .hidden();
        self.send(notification).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tix_models::RecipientKind;

    #[test]
    fn test_recipients_skip_empty_user() {
        assert_eq!(case_recipients("10", Some("")).len(), 1);
        let recipients = case_recipients("10", Some("unit.a"));
        assert_eq!(recipients[0].kind, RecipientKind::ProvId);
        assert_eq!(recipients[1], Recipient::user("unit.a"));
    }
}
