//! Store traits
//!
//! The seams between the case workflow core and its persistence. Postgres and
//! Redis back them in production; `memory` backs them in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use tix_models::{
    AreaDistrict, Case, CaseAttachment, CaseCurrentStage, CaseInsert, CaseHistoryEvent, CaseStatusName,
    CaseSubType, CaseSummaryBucket, GroupTotal, GroupType, NewCaseRecord, Notification,
    SlaCandidate, StageTransitionWrite, SummaryBucketKey, SummaryDelta, UnitStatusUpdate,
    UpsertOutcome, UserAccount, UserProfile, WorkflowNode,
};
use tix_utils::TixResult;

/// Filter for the SLA monitor scan.
#[derive(Debug, Clone)]
pub struct SlaScan {
    pub statuses: Vec<String>,
    /// Cases whose over-SLA count reached this are skipped.
    pub max_over_sla_count: i32,
    /// Cases alerted after this instant are still cooling down.
    pub cooldown_cutoff: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn find_case(&self, org_id: &str, case_id: &str) -> TixResult<Option<Case>>;

    /// Lookup by external work-order correlation key.
    async fn find_case_by_reference(&self, org_id: &str, reference: &str) -> TixResult<Option<Case>>;

    async fn current_stage(&self, org_id: &str, case_id: &str) -> TixResult<Option<CaseCurrentStage>>;

    /// All nodes of a workflow version in insertion order.
    async fn workflow_nodes(&self, org_id: &str, wf_id: &str, version: &str) -> TixResult<Vec<WorkflowNode>>;

    async fn workflow_node(
        &self,
        org_id: &str,
        wf_id: &str,
        version: &str,
        node_id: &str,
    ) -> TixResult<Option<WorkflowNode>>;

    async fn active_workflow_version(&self, org_id: &str, wf_id: &str) -> TixResult<Option<String>>;

    /// Next value of the per-org, per-day case counter (starts at 1).
    async fn next_case_sequence(&self, org_id: &str, day: &str) -> TixResult<i64>;

    /// Insert case, current stage, first responder and attachments atomically.
    /// Fails with `Conflict` if the case id is taken. A taken integration
    /// reference is not an error: the case holding it is returned instead.
    async fn create_case(&self, record: NewCaseRecord) -> TixResult<CaseInsert>;

    /// Replace the current stage, update status (and milestone) and append the
    /// responder row atomically. Fails with `NotFound` if the case is gone and
    /// with `Conflict` if its status is no longer `write.expected_status`.
    async fn apply_transition(&self, org_id: &str, case_id: &str, write: StageTransitionWrite) -> TixResult<()>;

    async fn append_history(&self, event: CaseHistoryEvent) -> TixResult<()>;

    async fn status_names(&self) -> TixResult<Vec<CaseStatusName>>;

    async fn find_sub_type(&self, org_id: &str, s_type_id: &str) -> TixResult<Option<CaseSubType>>;

    async fn find_sub_type_for_work_order(
        &self,
        org_id: &str,
        device_type: &str,
        work_order_type: &str,
    ) -> TixResult<Option<CaseSubType>>;

    async fn find_area(&self, org_id: &str, namespace: &str) -> TixResult<Option<AreaDistrict>>;

    async fn case_attachments(&self, org_id: &str, case_id: &str) -> TixResult<Vec<CaseAttachment>>;

    async fn sla_candidates(&self, scan: &SlaScan) -> TixResult<Vec<SlaCandidate>>;

    /// Bump the over-SLA counter and stamp the alert time; returns the new count.
    async fn record_over_sla(&self, org_id: &str, case_id: &str, at: DateTime<Utc>) -> TixResult<i32>;
}

#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Atomic insert-or-add on the bucket row.
    async fn increment_summary(&self, key: &SummaryBucketKey, delta: SummaryDelta) -> TixResult<()>;

    async fn summary_bucket(&self, key: &SummaryBucketKey) -> TixResult<Option<CaseSummaryBucket>>;

    async fn group_totals(&self, org_id: &str, date: &str) -> TixResult<Vec<GroupTotal>>;

    async fn orgs_with_activity(&self, date: &str) -> TixResult<Vec<String>>;

    async fn load_group_types(&self) -> TixResult<Vec<GroupType>>;
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_user(&self, org_id: &str, username: &str) -> TixResult<Option<UserAccount>>;

    /// Insert with `password_hash` when absent, otherwise update profile fields only.
    async fn upsert_user(&self, profile: &UserProfile, password_hash: Option<&str>) -> TixResult<UpsertOutcome>;

    /// Soft-deactivate; returns rows affected.
    async fn deactivate_user(&self, org_id: &str, username: &str) -> TixResult<u64>;

    /// Returns rows affected.
    async fn update_unit_status(&self, update: &UnitStatusUpdate) -> TixResult<u64>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn push(&self, notification: Notification) -> TixResult<()>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> TixResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> TixResult<()>;

    async fn delete(&self, key: &str) -> TixResult<()>;

    async fn hash_get(&self, key: &str, field: &str) -> TixResult<Option<String>>;

    async fn hash_get_all(&self, key: &str) -> TixResult<HashMap<String, String>>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> TixResult<()>;

    async fn hash_delete(&self, key: &str, field: &str) -> TixResult<()>;

    /// Write `value` under `field` in `to` and remove `field` from `from` in one step.
    async fn hash_move(&self, from: &str, to: &str, field: &str, value: &str) -> TixResult<()>;

    /// Take the lease if free, or renew it if `owner` already holds it.
    async fn acquire_lease(&self, key: &str, owner: &str, ttl: Duration) -> TixResult<bool>;

    /// Release only if `owner` still holds the lease.
    async fn release_lease(&self, key: &str, owner: &str) -> TixResult<bool>;
}
