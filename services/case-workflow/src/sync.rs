//! Outbound Work-Order Sync
//!
//! Pushes local case changes to the Mettriq work-order API. A failed push is
//! parked in a Redis hash keyed by case id; the `case_sync` job replays the
//! hash and graduates entries that keep failing to a dead-letter hash.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use tix_database::{CacheStore, CaseStore};
use tix_models::{
    Case, Severity, SyncKind, SyncQueueEntry, WorkOrderAssignee, WorkOrderLocation, WorkOrderRequest,
};
use tix_utils::{SeverityPriorities, TixError, TixResult};

use crate::metrics::metrics;
use crate::scheduler::PeriodicJob;
use crate::state_machine::StatusCatalog;

#[async_trait]
pub trait WorkOrderClient: Send + Sync {
    async fn send(&self, kind: SyncKind, request: &WorkOrderRequest) -> TixResult<()>;
}

/// HTTP client for `{server}/mettriq/v1/work_order/{create,update}`.
pub struct MettriqClient {
    client: Client,
    base_url: String,
}

impl MettriqClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> TixResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TixError::configuration(format!("http client: {}", e)))?;

        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    pub fn endpoint(&self, kind: SyncKind) -> String {
        format!("{}/mettriq/v1/work_order/{}", self.base_url, kind)
    }
}

#[async_trait]
impl WorkOrderClient for MettriqClient {
    async fn send(&self, kind: SyncKind, request: &WorkOrderRequest) -> TixResult<()> {
        let response = self
            .client
            .post(self.endpoint(kind))
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TixError::external_service(
            "Mettriq",
            format!("{} {} returned {}: {}", kind, request.work_order_number, status, body),
        ))
    }
}

/// Severity reported for a case priority: the mildest severity whose
/// configured priority is not lower than the case's.
pub fn severity_for_priority(priority: i32, priorities: &SeverityPriorities) -> Severity {
    if priority <= priorities.critical {
        Severity::Critical
    } else if priority <= priorities.high {
        Severity::High
    } else if priority <= priorities.medium {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn metadata_str(case: &Case, field: &str) -> Option<String> {
    case.device_metadata.get(field).and_then(|v| v.as_str()).map(str::to_string)
}

fn metadata_f64(case: &Case, field: &str) -> Option<f64> {
    case.device_metadata.get(field).and_then(|v| v.as_f64())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Sent,
    Queued,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub enabled: bool,
    pub source_tag: String,
    pub priorities: SeverityPriorities,
    pub queue_key: String,
    pub dead_letter_key: String,
    /// Failed attempts, the first push included, before an entry is dead-lettered.
    pub max_retry: u32,
}

pub struct CaseSync {
    cases: Arc<dyn CaseStore>,
    cache: Arc<dyn CacheStore>,
    client: Arc<dyn WorkOrderClient>,
    catalog: StatusCatalog,
    settings: SyncSettings,
}

impl CaseSync {
    pub fn new(
        cases: Arc<dyn CaseStore>,
        cache: Arc<dyn CacheStore>,
        client: Arc<dyn WorkOrderClient>,
        catalog: StatusCatalog,
        settings: SyncSettings,
    ) -> Self {
        Self { cases, cache, client, catalog, settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Work-order view of a case, with its attachments and current assignment.
    pub async fn build_request(&self, org_id: &str, case_id: &str) -> TixResult<WorkOrderRequest> {
        let case = self
            .cases
            .find_case(org_id, case_id)
            .await?
            .ok_or_else(|| TixError::not_found(format!("case {}", case_id)))?;
        let images = self
            .cases
            .case_attachments(org_id, case_id)
            .await?
            .into_iter()
            .map(|a| a.url)
            .collect();
        let assignee = self.cases.current_stage(org_id, case_id).await?.and_then(|stage| {
            let assignee = WorkOrderAssignee { unit_id: stage.unit_id, username: stage.username };
            (!assignee.is_empty()).then_some(assignee)
        });
        let outbound = self.catalog.outbound(&case.status_id);

        Ok(WorkOrderRequest {
            work_order_number: case.integration_ref_number.clone().unwrap_or_else(|| case.case_id.clone()),
            title: case.title.clone(),
            description: case.description.clone().unwrap_or_default(),
            severity: severity_for_priority(case.priority, &self.settings.priorities),
            status: outbound.status,
            state: outbound.state,
            location: WorkOrderLocation {
                latitude: metadata_f64(&case, "latitude"),
                longitude: metadata_f64(&case, "longitude"),
                address: metadata_str(&case, "address"),
            },
            images,
            assignee,
            namespace: metadata_str(&case, "namespace").unwrap_or_else(|| case.dist_id.clone()),
            source: self.settings.source_tag.clone(),
        })
    }

    pub async fn sync(&self, org_id: &str, case_id: &str, kind: SyncKind) -> TixResult<()> {
        let request = self.build_request(org_id, case_id).await?;
        self.client.send(kind, &request).await
    }

    /// Push now; park the case in the retry queue if that fails.
    pub async fn sync_or_enqueue(&self, org_id: &str, case_id: &str, kind: SyncKind) -> SyncOutcome {
        if !self.settings.enabled {
            return SyncOutcome::Disabled;
        }

        match self.sync(org_id, case_id, kind).await {
            Ok(()) => {
                tracing::debug!(org_id, case_id, %kind, "Work order synced");
                self.clear_superseded(case_id, kind).await;
                SyncOutcome::Sent
            }
            Err(e) => {
                metrics().sync_failures.with_label_values(&[kind.to_string().as_str()]).inc();
                tracing::warn!(org_id, case_id, %kind, error = %e, "Work order sync failed, queueing");
                if let Err(qe) = self.enqueue(org_id, case_id, kind, &e.to_string()).await {
                    tracing::error!(case_id, error = %qe, "Failed to queue work order sync");
                }
                SyncOutcome::Queued
            }
        }
    }

    async fn pending(&self, case_id: &str) -> TixResult<Option<SyncQueueEntry>> {
        match self.cache.hash_get(&self.settings.queue_key, case_id).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    /// New entry, or refresh of the pending one. A refresh is not a retry.
    ///
    /// An entry that has already used up its attempts goes straight to the
    /// dead letter instead of waiting for another replay.
    pub async fn enqueue(&self, org_id: &str, case_id: &str, kind: SyncKind, error: &str) -> TixResult<()> {
        let entry = match self.pending(case_id).await? {
            Some(mut entry) => {
                entry.merge_kind(kind);
                entry.last_error = Some(error.to_string());
                entry.last_attempt_at = chrono::Utc::now();
                entry
            }
            None => SyncQueueEntry::first_failure(org_id, case_id, kind, error),
        };
        let value = serde_json::to_string(&entry)?;

        if entry.is_exhausted(self.settings.max_retry) {
            self.dead_letter(&entry, &value).await
        } else {
            self.cache.hash_set(&self.settings.queue_key, case_id, &value).await
        }
    }

    async fn dead_letter(&self, entry: &SyncQueueEntry, value: &str) -> TixResult<()> {
        self.cache
            .hash_move(&self.settings.queue_key, &self.settings.dead_letter_key, &entry.case_id, value)
            .await?;
        metrics().sync_dead_lettered.inc();
        tracing::error!(
            case_id = %entry.case_id,
            kind = %entry.kind,
            retries = entry.retry_count,
            error = entry.last_error.as_deref().unwrap_or_default(),
            "Work order sync exhausted retries, moved to dead letter"
        );
        Ok(())
    }

    async fn clear_superseded(&self, case_id: &str, sent: SyncKind) {
        let pending = match self.pending(case_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(case_id, error = %e, "Retry queue unavailable");
                return;
            }
        };
        // A successful create covers everything; an update only covers a pending update.
        if sent == SyncKind::Create || pending.kind == SyncKind::Update {
            if let Err(e) = self.cache.hash_delete(&self.settings.queue_key, case_id).await {
                tracing::warn!(case_id, error = %e, "Failed to clear retry entry");
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub succeeded: usize,
    pub dead_lettered: usize,
    pub requeued: usize,
}

pub struct CaseSyncReconciler {
    sync: Arc<CaseSync>,
}

impl CaseSyncReconciler {
    pub fn new(sync: Arc<CaseSync>) -> Self {
        Self { sync }
    }

    pub async fn replay(&self) -> TixResult<ReplayReport> {
        let settings = self.sync.settings();
        let cache = &self.sync.cache;
        let queued = cache.hash_get_all(&settings.queue_key).await?;
        let mut report = ReplayReport::default();

        for (case_id, raw) in queued {
            report.replayed += 1;

            let mut entry: SyncQueueEntry = match serde_json::from_str(&raw) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!(case_id = %case_id, error = %e, "Unreadable retry entry, dead-lettering");
                    cache.hash_move(&settings.queue_key, &settings.dead_letter_key, &case_id, &raw).await?;
                    metrics().sync_dead_lettered.inc();
                    report.dead_lettered += 1;
                    continue;
                }
            };

            // Queued under a higher limit, or by an older build.
            if entry.is_exhausted(settings.max_retry) {
                self.sync.dead_letter(&entry, &raw).await?;
                report.dead_lettered += 1;
                continue;
            }

            match self.sync.sync(&entry.org_id, &entry.case_id, entry.kind).await {
                Ok(()) => {
                    cache.hash_delete(&settings.queue_key, &case_id).await?;
                    report.succeeded += 1;
                    tracing::info!(case_id = %case_id, kind = %entry.kind, retries = entry.retry_count, "Queued work order synced");
                }
                Err(e) => {
                    entry.record_failure(e.to_string());
                    metrics().sync_failures.with_label_values(&[entry.kind.to_string().as_str()]).inc();
                    let value = serde_json::to_string(&entry)?;

                    if entry.is_exhausted(settings.max_retry) {
                        self.sync.dead_letter(&entry, &value).await?;
                        report.dead_lettered += 1;
                    } else {
                        cache.hash_set(&settings.queue_key, &case_id, &value).await?;
                        report.requeued += 1;
                        tracing::warn!(case_id = %case_id, retries = entry.retry_count, error = %e, "Work order sync retry failed");
                    }
                }
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl PeriodicJob for CaseSyncReconciler {
    fn name(&self) -> &'static str {
        "case_sync"
    }

    async fn tick(&self) -> TixResult<()> {
        self.replay().await.map(|_| ())
    }
}
