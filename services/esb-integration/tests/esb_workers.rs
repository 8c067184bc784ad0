mod common;

use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use common::*;
use tix_case_workflow::intake::IntakeOutcome;
use tix_database::CaseStore;
use tix_esb_integration::handlers::UpdateOutcome;
use tix_esb_integration::spawn_consumers;
use tix_models::{
    EsbNotificationMessage, UnitStatusMessage, UpsertOutcome, UserAccountMessage, WorkOrderMessage,
};
use tix_utils::TixResult;

fn work_order(value: serde_json::Value) -> WorkOrderMessage {
    serde_json::from_value(value).unwrap()
}

fn create_message(number: &str) -> WorkOrderMessage {
    work_order(json!({
        "org_id": ORG,
        "work_order_number": number,
        "work_order_type": "MAINT",
        "device_type": "CCTV",
        "title": "Camera offline",
        "severity": "high",
        "namespace": "bkk-gate",
        "location": {"latitude": 13.75, "longitude": 100.5},
        "images": ["https://files.example/a.jpg", "https://files.example/b.jpg"],
        "source": "mettriq"
    }))
}

fn update_message(number: &str, status: &str, state: Option<&str>) -> WorkOrderMessage {
    work_order(json!({
        "org_id": ORG,
        "work_order_number": number,
        "status": status,
        "state": state,
        "source": "mettriq"
    }))
}

fn user_message(username: &str, password: Option<&str>) -> UserAccountMessage {
    UserAccountMessage {
        org_id: Some(ORG.into()),
        username: Some(username.into()),
        emp_id: Some("E100".into()),
        first_name: Some("Somchai".into()),
        last_name: Some("Jaidee".into()),
        email: None,
        mobile: None,
        password: password.map(str::to_string),
        user_type: None,
        source: Some("esb".into()),
    }
}

#[tokio::test]
async fn test_work_order_create_opens_case() {
    let fx = fixture().await;

    let outcome = fx.context.create_work_order(create_message("WO-1")).await.unwrap();
    let IntakeOutcome::Created(case) = outcome else { panic!("expected a new case") };

    assert!(case.case_id.starts_with('I'));
    assert_eq!(case.case_type_id, "T1");
    assert_eq!(case.case_s_type_id, "S1");
    assert_eq!(case.status_id, "S001");
    assert_eq!(case.priority, 2);
    assert_eq!(case.prov_id, "10");
    assert_eq!(case.dist_id, "1001");
    assert_eq!(case.integration_ref_number.as_deref(), Some("WO-1"));
    assert_eq!(case.device_metadata["namespace"], "bkk-gate");
    assert_eq!(case.device_metadata["latitude"], 13.75);

    assert_eq!(fx.store.stage(ORG, &case.case_id).await.unwrap().node_id, "n-new");
    assert_eq!(fx.store.case_attachments(ORG, &case.case_id).await.unwrap().len(), 2);
    assert_eq!(fx.store.summary_buckets().await[0].total, 1);
    // Inbound work orders are never synced back out.
    assert!(fx.client.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_work_order_create_is_a_no_op() {
    let fx = fixture().await;
    let first = fx.context.create_work_order(create_message("WO-2")).await.unwrap();
    let again = fx.context.create_work_order(create_message("WO-2")).await.unwrap();

    let IntakeOutcome::Existing(existing) = again else { panic!("expected the existing case") };
    assert_eq!(existing.case_id, first.case().case_id);
    assert_eq!(fx.store.summary_buckets().await[0].total, 1);
}

#[tokio::test]
async fn test_unknown_device_type_is_not_found() {
    let fx = fixture().await;
    let mut message = create_message("WO-3");
    message.device_type = Some("DRONE".into());

    let err = fx.context.create_work_order(message).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_work_order_with_assignee_is_dispatched() {
    let fx = fixture().await;
    let mut message = create_message("WO-4");
    message.assignee = Some(tix_models::WorkOrderAssignee {
        unit_id: Some("unit-9".into()),
        username: Some("tech.a".into()),
    });

    let case_id = fx.context.create_work_order(message).await.unwrap().case().case_id.clone();

    assert_eq!(fx.store.case(ORG, &case_id).await.unwrap().status_id, "S002");
    let stage = fx.store.stage(ORG, &case_id).await.unwrap();
    assert_eq!(stage.node_id, "n-assign");
    assert_eq!(stage.unit_id.as_deref(), Some("unit-9"));
}

#[tokio::test]
async fn test_work_order_updates_drive_the_stage_engine() {
    let fx = fixture().await;
    let case_id = fx.context.create_work_order(create_message("WO-5")).await.unwrap().case().case_id.clone();

    for status in ["NEW", "assigned"] {
        let outcome = fx.context.update_work_order(update_message("WO-5", status, None)).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Ignored);
    }
    assert_eq!(fx.store.case(ORG, &case_id).await.unwrap().status_id, "S001");

    let outcome = fx.context.update_work_order(update_message("WO-5", "INPROGRESS", None)).await.unwrap();
    let UpdateOutcome::Transitioned(stage) = outcome else { panic!("expected a transition") };
    assert_eq!(stage.node_id, "n-progress");
    assert!(fx.store.case(ORG, &case_id).await.unwrap().arrive_at.is_some());

    // DONE with state CLOSED closes the case.
    fx.context
        .update_work_order(update_message("WO-5", "DONE", Some("CLOSED")))
        .await
        .unwrap();
    let case = fx.store.case(ORG, &case_id).await.unwrap();
    assert_eq!(case.status_id, "S008");
    assert!(case.closed_at.is_some());
    assert!(fx.client.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_for_unknown_work_order_is_not_found() {
    let fx = fixture().await;
    let err = fx
        .context
        .update_work_order(update_message("WO-404", "INPROGRESS", None))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = fx
        .context
        .update_work_order(update_message("WO-404", "PAUSED", None))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_user_accounts_upsert_and_deactivate() {
    let fx = fixture().await;

    let outcome = fx.context.upsert_user(user_message("somchai", Some("s3cret")), "staff").await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);
    let stored = fx.store.user(ORG, "somchai").await.unwrap();
    assert!(stored.account.active);
    assert_eq!(stored.account.user_type, "staff");
    assert!(stored.password_hash.unwrap().starts_with("$argon2id$"));

    let mut renamed = user_message("somchai", None);
    renamed.last_name = Some("Rakdee".into());
    let outcome = fx.context.upsert_user(renamed, "staff").await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(fx.store.user(ORG, "somchai").await.unwrap().account.last_name.as_deref(), Some("Rakdee"));

    fx.context.delete_user(user_message("somchai", None)).await.unwrap();
    assert!(!fx.store.user(ORG, "somchai").await.unwrap().account.active);

    let err = fx.context.delete_user(user_message("nobody", None)).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("no user found"));
}

#[tokio::test]
async fn test_user_without_login_key_is_rejected() {
    let fx = fixture().await;
    let mut message = user_message("", None);
    message.emp_id = None;

    let err = fx.context.upsert_user(message, "admin").await.unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unit_status_maps_check_in_flag() {
    let fx = fixture().await;
    let message = UnitStatusMessage {
        org_id: Some(ORG.into()),
        unit_id: "unit-9".into(),
        username: Some("tech.a".into()),
        checked_in: true,
        latitude: Some(13.7),
        longitude: Some(100.5),
        source: None,
    };

    fx.context.update_unit_status(message.clone()).await.unwrap();
    let unit = fx.store.unit(ORG, "unit-9").await.unwrap();
    assert!(unit.is_login);
    assert_eq!(unit.status_id, "001");
    assert_eq!(unit.latitude, Some(13.7));

    fx.context
        .update_unit_status(UnitStatusMessage { checked_in: false, ..message.clone() })
        .await
        .unwrap();
    assert_eq!(fx.store.unit(ORG, "unit-9").await.unwrap().status_id, "000");

    let err = fx
        .context
        .update_unit_status(UnitStatusMessage { unit_id: "unit-x".into(), ..message })
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_esb_notification_is_forwarded() {
    let fx = fixture().await;
    let message: EsbNotificationMessage = serde_json::from_value(json!({
        "case_id": "I250101-00001",
        "event_type": "ESB_ALERT",
        "message": "Gateway offline",
        "recipients": [{"type": "provId", "value": "10"}],
        "data": {"gateway": "gw-1"}
    }))
    .unwrap();

    fx.context.forward_notification(message).await.unwrap();

    let notifications = fx.store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].org_id, ORG);
    assert_eq!(notifications[0].case_id.as_deref(), Some("I250101-00001"));
    assert_eq!(notifications[0].event_type, "ESB_ALERT");
    assert_eq!(notifications[0].data["gateway"], "gw-1");
}

#[tokio::test]
async fn test_topic_workers_consume_every_topic() {
    let fx = fixture().await;
    let topics = fx.services.config.kafka.topics.clone();
    let connector = Arc::new(ScriptedConnector::default());

    connector.push_raw(&topics.work_order_create, b"{\"work_order_number\":");
    connector.push(&topics.work_order_create, serde_json::to_value(create_message("WO-10")).unwrap());
    let mut echo = serde_json::to_value(create_message("WO-11")).unwrap();
    echo["source"] = json!("tix");
    connector.push(&topics.work_order_create, echo);
    connector.push(
        &topics.user_admin_create,
        json!({"org_id": ORG, "username": "admin.a", "password": "pw", "source": "esb"}),
    );

    let mut workers: JoinSet<TixResult<()>> = JoinSet::new();
    spawn_consumers(&mut workers, &fx.services, connector, &CancellationToken::new());
    assert_eq!(workers.len(), 10);
    while let Some(joined) = workers.join_next().await {
        joined.unwrap().unwrap();
    }

    let buckets = fx.store.summary_buckets().await;
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].total, 1);
    assert_eq!(fx.store.user(ORG, "admin.a").await.unwrap().account.user_type, "admin");
}
