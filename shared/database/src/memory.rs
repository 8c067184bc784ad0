//! In-memory store
//!
//! Implements every store trait over a single mutex-guarded state so service
//! logic can be exercised without Postgres or Redis. Seed helpers populate
//! reference data; inspection helpers expose what was written. Failure flags
//! make individual backends return transient errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use tix_models::{
    AreaDistrict, Case, CaseAttachment, CaseCurrentStage, CaseHistoryEvent, CaseInsert, CaseResponder,
    CaseStatusName, CaseSubType, CaseSummaryBucket, GroupTotal, GroupType, Milestone,
    NewCaseRecord, Notification, SlaCandidate, StageTransitionWrite, SummaryBucketKey,
    SummaryDelta, UnitStatusUpdate, UpsertOutcome, UserAccount, UserProfile, WorkflowNode,
};
use tix_utils::{TixError, TixResult};

use crate::stores::{CacheStore, CaseStore, DirectoryStore, NotificationSink, SlaScan, SummaryStore};

type Key = (String, String);

fn key(org_id: &str, id: &str) -> Key {
    (org_id.to_string(), id.to_string())
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub account: UserAccount,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredUnit {
    pub org_id: String,
    pub unit_id: String,
    pub username: Option<String>,
    pub is_login: bool,
    pub status_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    cases: HashMap<Key, Case>,
    stages: HashMap<Key, CaseCurrentStage>,
    responders: Vec<CaseResponder>,
    history: Vec<CaseHistoryEvent>,
    attachments: Vec<CaseAttachment>,
    sequences: HashMap<Key, i64>,
    status_names: Vec<CaseStatusName>,
    workflow_versions: HashMap<Key, String>,
    nodes: Vec<WorkflowNode>,
    sub_types: Vec<CaseSubType>,
    areas: Vec<AreaDistrict>,
    summaries: HashMap<SummaryBucketKey, CaseSummaryBucket>,
    group_types: Vec<GroupType>,
    users: HashMap<Key, StoredUser>,
    units: HashMap<Key, StoredUnit>,
    notifications: Vec<Notification>,
    values: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, String>>,
    leases: HashMap<String, (String, Instant)>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_cache_writes: AtomicBool,
    fail_cache_reads: AtomicBool,
    fail_leases: AtomicBool,
    fail_notifications: AtomicBool,
    fail_summaries: AtomicBool,
    fail_over_sla: AtomicBool,
    stale_reference_reads: AtomicBool,
    group_type_loads: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- failure injection ----

    pub fn fail_cache_writes(&self, fail: bool) {
        self.fail_cache_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cache_reads(&self, fail: bool) {
        self.fail_cache_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_leases(&self, fail: bool) {
        self.fail_leases.store(fail, Ordering::SeqCst);
    }

    pub fn fail_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    pub fn fail_summaries(&self, fail: bool) {
        self.fail_summaries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_over_sla(&self, fail: bool) {
        self.fail_over_sla.store(fail, Ordering::SeqCst);
    }

    /// Reference lookups miss, as a reader racing a concurrent insert would.
    pub fn stale_reference_reads(&self, stale: bool) {
        self.stale_reference_reads.store(stale, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, backend: &str) -> TixResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(match backend {
                "cache" => TixError::cache("injected cache failure"),
                _ => TixError::database(format!("injected {} failure", backend)),
            });
        }
        Ok(())
    }

    // ---- seeding ----

    pub async fn seed_case(&self, case: Case, stage: Option<CaseCurrentStage>) {
        let mut state = self.state.lock().await;
        let k = key(&case.org_id, &case.case_id);
        if let Some(stage) = stage {
            state.stages.insert(k.clone(), stage);
        }
        state.cases.insert(k, case);
    }

    pub async fn seed_workflow(&self, org_id: &str, wf_id: &str, version: &str, nodes: Vec<WorkflowNode>) {
        let mut state = self.state.lock().await;
        state.workflow_versions.insert(key(org_id, wf_id), version.to_string());
        state.nodes.extend(nodes);
    }

    pub async fn seed_sub_type(&self, sub_type: CaseSubType) {
        self.state.lock().await.sub_types.push(sub_type);
    }

    pub async fn seed_area(&self, area: AreaDistrict) {
        self.state.lock().await.areas.push(area);
    }

    pub async fn seed_group_types(&self, groups: Vec<GroupType>) {
        self.state.lock().await.group_types = groups;
    }

    pub async fn seed_status_names(&self, names: Vec<CaseStatusName>) {
        self.state.lock().await.status_names = names;
    }

    pub async fn seed_unit(&self, org_id: &str, unit_id: &str) {
        self.state.lock().await.units.insert(
            key(org_id, unit_id),
            StoredUnit {
                org_id: org_id.to_string(),
                unit_id: unit_id.to_string(),
                username: None,
                is_login: false,
                status_id: String::new(),
                latitude: None,
                longitude: None,
                updated_at: None,
            },
        );
    }

    // ---- inspection ----

    fn case_with_reference(state: &State, org_id: &str, reference: &str) -> Option<Case> {
        state
            .cases
            .values()
            .filter(|c| c.org_id == org_id && c.integration_ref_number.as_deref() == Some(reference))
            .max_by_key(|c| c.created_at)
            .cloned()
    }

    pub async fn case(&self, org_id: &str, case_id: &str) -> Option<Case> {
        self.state.lock().await.cases.get(&key(org_id, case_id)).cloned()
    }

    pub async fn stage(&self, org_id: &str, case_id: &str) -> Option<CaseCurrentStage> {
        self.state.lock().await.stages.get(&key(org_id, case_id)).cloned()
    }

    pub async fn responders(&self, case_id: &str) -> Vec<CaseResponder> {
        let state = self.state.lock().await;
        state.responders.iter().filter(|r| r.case_id == case_id).cloned().collect()
    }

    pub async fn history(&self, case_id: &str) -> Vec<CaseHistoryEvent> {
        let state = self.state.lock().await;
        state.history.iter().filter(|h| h.case_id == case_id).cloned().collect()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }

    pub async fn summary_buckets(&self) -> Vec<CaseSummaryBucket> {
        self.state.lock().await.summaries.values().cloned().collect()
    }

    pub async fn user(&self, org_id: &str, username: &str) -> Option<StoredUser> {
        self.state.lock().await.users.get(&key(org_id, username)).cloned()
    }

    pub async fn unit(&self, org_id: &str, unit_id: &str) -> Option<StoredUnit> {
        self.state.lock().await.units.get(&key(org_id, unit_id)).cloned()
    }

    pub fn group_type_loads(&self) -> usize {
        self.group_type_loads.load(Ordering::SeqCst)
    }

    /// Drop a lease as if its TTL had elapsed.
    pub async fn expire_lease(&self, lease_key: &str) {
        self.state.lock().await.leases.remove(lease_key);
    }

    pub async fn lease_holder(&self, lease_key: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .leases
            .get(lease_key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(owner, _)| owner.clone())
    }
}

#[async_trait]
impl CaseStore for InMemoryStore {
    async fn find_case(&self, org_id: &str, case_id: &str) -> TixResult<Option<Case>> {
        Ok(self.case(org_id, case_id).await)
    }

    async fn find_case_by_reference(&self, org_id: &str, reference: &str) -> TixResult<Option<Case>> {
        if self.stale_reference_reads.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let state = self.state.lock().await;
        Ok(Self::case_with_reference(&state, org_id, reference))
    }

    async fn current_stage(&self, org_id: &str, case_id: &str) -> TixResult<Option<CaseCurrentStage>> {
        Ok(self.stage(org_id, case_id).await)
    }

    async fn workflow_nodes(&self, org_id: &str, wf_id: &str, version: &str) -> TixResult<Vec<WorkflowNode>> {
        let state = self.state.lock().await;
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.org_id == org_id && n.wf_id == wf_id && n.version == version)
            .cloned()
            .collect())
    }

    async fn workflow_node(
        &self,
        org_id: &str,
        wf_id: &str,
        version: &str,
        node_id: &str,
    ) -> TixResult<Option<WorkflowNode>> {
        let state = self.state.lock().await;
        Ok(state
            .nodes
            .iter()
            .find(|n| n.org_id == org_id && n.wf_id == wf_id && n.version == version && n.node_id == node_id)
            .cloned())
    }

    async fn active_workflow_version(&self, org_id: &str, wf_id: &str) -> TixResult<Option<String>> {
        Ok(self.state.lock().await.workflow_versions.get(&key(org_id, wf_id)).cloned())
    }

    async fn next_case_sequence(&self, org_id: &str, day: &str) -> TixResult<i64> {
        let mut state = self.state.lock().await;
        let counter = state.sequences.entry(key(org_id, day)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn create_case(&self, record: NewCaseRecord) -> TixResult<CaseInsert> {
        let mut state = self.state.lock().await;
        let k = key(&record.case.org_id, &record.case.case_id);
        if let Some(reference) = record.case.integration_ref_number.as_deref() {
            if let Some(existing) = Self::case_with_reference(&state, &record.case.org_id, reference) {
                return Ok(CaseInsert::DuplicateReference(existing));
            }
        }
        if state.cases.contains_key(&k) {
            return Err(TixError::conflict(format!("case {} already exists", record.case.case_id)));
        }
        state.cases.insert(k.clone(), record.case);
        state.stages.insert(k, record.stage);
        state.responders.push(record.responder);
        state.attachments.extend(record.attachments);
        Ok(CaseInsert::Created)
    }

    async fn apply_transition(&self, org_id: &str, case_id: &str, write: StageTransitionWrite) -> TixResult<()> {
        let mut state = self.state.lock().await;
        let k = key(org_id, case_id);
        let case = state
            .cases
            .get_mut(&k)
            .ok_or_else(|| TixError::not_found(format!("case {}", case_id)))?;
        if case.status_id != write.expected_status {
            return Err(TixError::conflict(format!(
                "case {} moved to {} while transitioning from {}",
                case_id, case.status_id, write.expected_status
            )));
        }

        case.status_id = write.status_id.clone();
        case.updated_at = write.at;
        case.updated_by = write.stage.updated_by.clone();
        if let Some(milestone) = write.milestone {
            let slot = match milestone {
                Milestone::Command => &mut case.command_at,
                Milestone::Receive => &mut case.receive_at,
                Milestone::Arrive => &mut case.arrive_at,
                Milestone::Closed => &mut case.closed_at,
            };
            slot.get_or_insert(write.at);
        }

        state.stages.insert(k, write.stage);
        state.responders.push(write.responder);
        Ok(())
    }

    async fn append_history(&self, event: CaseHistoryEvent) -> TixResult<()> {
        self.state.lock().await.history.push(event);
        Ok(())
    }

    async fn status_names(&self) -> TixResult<Vec<CaseStatusName>> {
        Ok(self.state.lock().await.status_names.clone())
    }

    async fn find_sub_type(&self, org_id: &str, s_type_id: &str) -> TixResult<Option<CaseSubType>> {
        let state = self.state.lock().await;
        Ok(state
            .sub_types
            .iter()
            .find(|s| s.org_id == org_id && s.s_type_id == s_type_id)
            .cloned())
    }

    async fn find_sub_type_for_work_order(
        &self,
        org_id: &str,
        device_type: &str,
        work_order_type: &str,
    ) -> TixResult<Option<CaseSubType>> {
        let state = self.state.lock().await;
        Ok(state
            .sub_types
            .iter()
            .find(|s| {
                s.org_id == org_id
                    && s.device_type.as_deref() == Some(device_type)
                    && s.work_order_type.as_deref() == Some(work_order_type)
            })
            .cloned())
    }

    async fn find_area(&self, org_id: &str, namespace: &str) -> TixResult<Option<AreaDistrict>> {
        let state = self.state.lock().await;
        Ok(state
            .areas
            .iter()
            .find(|a| a.org_id == org_id && a.namespace == namespace)
            .cloned())
    }

    async fn case_attachments(&self, org_id: &str, case_id: &str) -> TixResult<Vec<CaseAttachment>> {
        let state = self.state.lock().await;
        Ok(state
            .attachments
            .iter()
            .filter(|a| a.org_id == org_id && a.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn sla_candidates(&self, scan: &SlaScan) -> TixResult<Vec<SlaCandidate>> {
        let state = self.state.lock().await;
        let mut candidates: Vec<SlaCandidate> = state
            .cases
            .iter()
            .filter(|(_, c)| scan.statuses.contains(&c.status_id))
            .filter(|(_, c)| c.over_sla_count < scan.max_over_sla_count)
            .filter(|(_, c)| c.over_sla_date.map_or(true, |d| d <= scan.cooldown_cutoff))
            .filter_map(|(k, c)| {
                let stage = state.stages.get(k)?;
                let node = state.nodes.iter().find(|n| {
                    n.org_id == stage.org_id
                        && n.wf_id == stage.wf_id
                        && n.version == stage.version
                        && n.node_id == stage.node_id
                })?;
                let sla = node.sla_minutes().filter(|m| *m > 0)?;
                (c.created_at + chrono::Duration::minutes(i64::from(sla)) <= scan.now).then(|| SlaCandidate {
                    org_id: c.org_id.clone(),
                    case_id: c.case_id.clone(),
                    status_id: c.status_id.clone(),
                    prov_id: c.prov_id.clone(),
                    created_at: c.created_at,
                    over_sla_count: c.over_sla_count,
                    over_sla_date: c.over_sla_date,
                    node_sla_minutes: sla,
                })
            })
            .collect();
        candidates.sort_by_key(|c| c.created_at);
        Ok(candidates)
    }

    async fn record_over_sla(&self, org_id: &str, case_id: &str, at: DateTime<Utc>) -> TixResult<i32> {
        Self::check(&self.fail_over_sla, "over-SLA")?;
        let mut state = self.state.lock().await;
        let case = state
            .cases
            .get_mut(&key(org_id, case_id))
            .ok_or_else(|| TixError::not_found(format!("case {}", case_id)))?;
        case.over_sla = true;
        case.over_sla_count += 1;
        case.over_sla_date = Some(at);
        Ok(case.over_sla_count)
    }
}

#[async_trait]
impl SummaryStore for InMemoryStore {
    async fn increment_summary(&self, key: &SummaryBucketKey, delta: SummaryDelta) -> TixResult<()> {
        Self::check(&self.fail_summaries, "summary")?;
        let mut state = self.state.lock().await;
        state
            .summaries
            .entry(key.clone())
            .or_insert_with(|| CaseSummaryBucket::empty(key))
            .apply(delta);
        Ok(())
    }

    async fn summary_bucket(&self, key: &SummaryBucketKey) -> TixResult<Option<CaseSummaryBucket>> {
        Ok(self.state.lock().await.summaries.get(key).cloned())
    }

    async fn group_totals(&self, org_id: &str, date: &str) -> TixResult<Vec<GroupTotal>> {
        Self::check(&self.fail_summaries, "summary")?;
        let state = self.state.lock().await;
        let mut totals: HashMap<String, i64> = HashMap::new();
        for bucket in state.summaries.values().filter(|b| b.org_id == org_id && b.date == date) {
            *totals.entry(bucket.group_type_id.clone()).or_default() += bucket.total;
        }
        let mut totals: Vec<GroupTotal> = totals
            .into_iter()
            .map(|(group_type_id, total)| GroupTotal { group_type_id, total })
            .collect();
        totals.sort_by(|a, b| a.group_type_id.cmp(&b.group_type_id));
        Ok(totals)
    }

    async fn orgs_with_activity(&self, date: &str) -> TixResult<Vec<String>> {
        Self::check(&self.fail_summaries, "summary")?;
        let state = self.state.lock().await;
        let mut orgs: Vec<String> = state
            .summaries
            .values()
            .filter(|b| b.date == date)
            .map(|b| b.org_id.clone())
            .collect();
        orgs.sort();
        orgs.dedup();
        Ok(orgs)
    }

    async fn load_group_types(&self) -> TixResult<Vec<GroupType>> {
        self.group_type_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().await.group_types.clone())
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn find_user(&self, org_id: &str, username: &str) -> TixResult<Option<UserAccount>> {
        Ok(self.user(org_id, username).await.map(|u| u.account))
    }

    async fn upsert_user(&self, profile: &UserProfile, password_hash: Option<&str>) -> TixResult<UpsertOutcome> {
        let mut state = self.state.lock().await;
        let k = key(&profile.org_id, &profile.username);
        let account = UserAccount {
            org_id: profile.org_id.clone(),
            username: profile.username.clone(),
            emp_id: profile.emp_id.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: profile.email.clone(),
            mobile: profile.mobile.clone(),
            user_type: profile.user_type.clone(),
            active: true,
            updated_at: Utc::now(),
        };
        match state.users.get_mut(&k) {
            Some(existing) => {
                existing.account = account;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                state.users.insert(
                    k,
                    StoredUser { account, password_hash: password_hash.map(str::to_string) },
                );
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn deactivate_user(&self, org_id: &str, username: &str) -> TixResult<u64> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&key(org_id, username)) {
            Some(user) if user.account.active => {
                user.account.active = false;
                user.account.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_unit_status(&self, update: &UnitStatusUpdate) -> TixResult<u64> {
        let mut state = self.state.lock().await;
        let Some(unit) = state.units.get_mut(&key(&update.org_id, &update.unit_id)) else {
            return Ok(0);
        };
        unit.username = update.username.clone();
        unit.is_login = update.is_login;
        unit.status_id = update.status_id.clone();
        unit.latitude = update.latitude.or(unit.latitude);
        unit.longitude = update.longitude.or(unit.longitude);
        unit.updated_at = Some(update.at);
        Ok(1)
    }
}

#[async_trait]
impl NotificationSink for InMemoryStore {
    async fn push(&self, notification: Notification) -> TixResult<()> {
        Self::check(&self.fail_notifications, "notification")?;
        self.state.lock().await.notifications.push(notification);
        Ok(())
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> TixResult<Option<String>> {
        Self::check(&self.fail_cache_reads, "cache")?;
        let state = self.state.lock().await;
        Ok(state
            .values
            .get(key)
            .filter(|(_, expires)| expires.map_or(true, |e| e > Instant::now()))
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> TixResult<()> {
        Self::check(&self.fail_cache_writes, "cache")?;
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        self.state.lock().await.values.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> TixResult<()> {
        Self::check(&self.fail_cache_writes, "cache")?;
        let mut state = self.state.lock().await;
        state.values.remove(key);
        state.hashes.remove(key);
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> TixResult<Option<String>> {
        Self::check(&self.fail_cache_reads, "cache")?;
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hash_get_all(&self, key: &str) -> TixResult<HashMap<String, String>> {
        Self::check(&self.fail_cache_reads, "cache")?;
        Ok(self.state.lock().await.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> TixResult<()> {
        Self::check(&self.fail_cache_writes, "cache")?;
        let mut state = self.state.lock().await;
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> TixResult<()> {
        Self::check(&self.fail_cache_writes, "cache")?;
        let mut state = self.state.lock().await;
        if let Some(hash) = state.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn hash_move(&self, from: &str, to: &str, field: &str, value: &str) -> TixResult<()> {
        Self::check(&self.fail_cache_writes, "cache")?;
        let mut state = self.state.lock().await;
        state
            .hashes
            .entry(to.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        if let Some(hash) = state.hashes.get_mut(from) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn acquire_lease(&self, key: &str, owner: &str, ttl: Duration) -> TixResult<bool> {
        Self::check(&self.fail_leases, "cache")?;
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let free = match state.leases.get(key) {
            None => true,
            Some((holder, expires)) => *expires <= now || holder == owner,
        };
        if free {
            state.leases.insert(key.to_string(), (owner.to_string(), now + ttl));
        }
        Ok(free)
    }

    async fn release_lease(&self, key: &str, owner: &str) -> TixResult<bool> {
        Self::check(&self.fail_leases, "cache")?;
        let mut state = self.state.lock().await;
        match state.leases.get(key) {
            Some((holder, _)) if holder == owner => {
                state.leases.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
