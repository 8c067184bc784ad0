//! Repository tests against a live PostgreSQL.
//!
//! Ignored by default. Run with
//! `TIX_TEST_DATABASE_URL=postgres://... cargo test -p tix-database -- --ignored`.
//! Every test works under a fresh org id, so runs do not interfere.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use tix_database::migrations::run_postgres_migrations;
use tix_database::{create_postgres_pool, CaseRepository, CaseStore, PostgresPool, SummaryRepository, SummaryStore};
use tix_models::{
    Case, CaseCurrentStage, CaseInsert, CaseResponder, NewCaseRecord, StageTransitionWrite, SummaryBucketKey,
    SummaryDelta,
};

async fn pool() -> PostgresPool {
    let url = std::env::var("TIX_TEST_DATABASE_URL").expect("TIX_TEST_DATABASE_URL must be set");
    let pool = create_postgres_pool(&url, 16, Duration::from_secs(5)).await.unwrap();
    run_postgres_migrations(&pool).await.unwrap();
    pool
}

fn org() -> String {
    format!("test-{}", uuid::Uuid::new_v4())
}

fn record(org_id: &str, case_id: &str, reference: Option<&str>) -> NewCaseRecord {
    let now = Utc::now();
    let case = Case {
        org_id: org_id.into(),
        case_id: case_id.into(),
        case_type_id: "T1".into(),
        case_s_type_id: "S1".into(),
        wf_id: "WF-1".into(),
        wf_version: "1".into(),
        priority: 2,
        status_id: "S001".into(),
        title: "Camera offline".into(),
        description: None,
        country_id: "TH".into(),
        prov_id: "10".into(),
        dist_id: "1001".into(),
        case_sla: Some(60),
        created_at: now,
        start_at: Some(now),
        command_at: None,
        receive_at: None,
        arrive_at: None,
        closed_at: None,
        over_sla: false,
        over_sla_date: None,
        over_sla_count: 0,
        schedule_flag: false,
        schedule_date: None,
        integration_ref_number: reference.map(str::to_string),
        device_metadata: json!({}),
        source: "test".into(),
        created_by: "tester".into(),
        updated_at: now,
        updated_by: "tester".into(),
    };
    NewCaseRecord {
        stage: stage(org_id, case_id, "n-new"),
        responder: responder(org_id, case_id, "S001"),
        attachments: vec![],
        case,
    }
}

fn stage(org_id: &str, case_id: &str, node_id: &str) -> CaseCurrentStage {
    CaseCurrentStage {
        org_id: org_id.into(),
        case_id: case_id.into(),
        wf_id: "WF-1".into(),
        version: "1".into(),
        node_id: node_id.into(),
        node_type: "process".into(),
        section: "main".into(),
        data: json!({}),
        pic: None,
        group_id: None,
        form_id: None,
        unit_id: None,
        username: None,
        updated_at: Utc::now(),
        updated_by: "tester".into(),
    }
}

fn responder(org_id: &str, case_id: &str, status_id: &str) -> CaseResponder {
    CaseResponder {
        org_id: org_id.into(),
        case_id: case_id.into(),
        unit_id: None,
        user_owner: None,
        status_id: status_id.into(),
        created_at: Utc::now(),
        created_by: "tester".into(),
    }
}

fn transition(org_id: &str, case_id: &str, from: &str, to: &str, node_id: &str) -> StageTransitionWrite {
    StageTransitionWrite {
        expected_status: from.into(),
        stage: stage(org_id, case_id, node_id),
        status_id: to.into(),
        milestone: None,
        responder: responder(org_id, case_id, to),
        at: Utc::now(),
    }
}

#[tokio::test]
#[ignore = "needs TIX_TEST_DATABASE_URL"]
async fn test_concurrent_summary_increments_are_not_lost() {
    let repo = Arc::new(SummaryRepository::new(pool().await));
    let key = SummaryBucketKey {
        org_id: org(),
        date: "2025/01/01".into(),
        hour: "10:00:00".into(),
        group_type_id: "G-MAINT".into(),
        country_id: "TH".into(),
        prov_id: "10".into(),
        dist_id: "1001".into(),
    };

    let mut writers = JoinSet::new();
    for i in 0..32 {
        let repo = repo.clone();
        let key = key.clone();
        writers.spawn(async move {
            let delta = if i % 2 == 0 { SummaryDelta::opened() } else { SummaryDelta::closed_in_sla(10) };
            repo.increment_summary(&key, delta).await
        });
    }
    while let Some(joined) = writers.join_next().await {
        joined.unwrap().unwrap();
    }

    let bucket = repo.summary_bucket(&key).await.unwrap().unwrap();
    assert_eq!(bucket.total, 16);
    assert_eq!(bucket.in_sla, 16);
    assert_eq!(bucket.case_duration, 160);
}

#[tokio::test]
#[ignore = "needs TIX_TEST_DATABASE_URL"]
async fn test_second_case_for_a_reference_returns_the_first() {
    let repo = CaseRepository::new(pool().await);
    let org_id = org();

    let first = repo.create_case(record(&org_id, "I250101-00001", Some("WO-1"))).await.unwrap();
    assert_eq!(first, CaseInsert::Created);

    let second = repo.create_case(record(&org_id, "I250101-00002", Some("WO-1"))).await.unwrap();
    let CaseInsert::DuplicateReference(existing) = second else { panic!("expected the first case") };
    assert_eq!(existing.case_id, "I250101-00001");
    assert!(repo.find_case(&org_id, "I250101-00002").await.unwrap().is_none());

    // Cases without a reference never collide on it.
    repo.create_case(record(&org_id, "I250101-00003", None)).await.unwrap();
    repo.create_case(record(&org_id, "I250101-00004", None)).await.unwrap();

    let err = repo.create_case(record(&org_id, "I250101-00003", None)).await.unwrap_err();
    assert_eq!(err.error_code(), "CONFLICT");
}

#[tokio::test]
#[ignore = "needs TIX_TEST_DATABASE_URL"]
async fn test_transition_from_stale_status_is_refused() {
    let repo = CaseRepository::new(pool().await);
    let org_id = org();
    repo.create_case(record(&org_id, "I250101-00001", None)).await.unwrap();

    repo.apply_transition(&org_id, "I250101-00001", transition(&org_id, "I250101-00001", "S001", "S008", "n-close"))
        .await
        .unwrap();

    let err = repo
        .apply_transition(&org_id, "I250101-00001", transition(&org_id, "I250101-00001", "S001", "S004", "n-progress"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CONFLICT");

    assert_eq!(repo.find_case(&org_id, "I250101-00001").await.unwrap().unwrap().status_id, "S008");
    assert_eq!(repo.current_stage(&org_id, "I250101-00001").await.unwrap().unwrap().node_id, "n-close");
}
