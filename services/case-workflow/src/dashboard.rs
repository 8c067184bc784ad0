//! Dashboard Case Summary
//!
//! Upsert-based counters in `d_case_summary`, bucketed by org, local date,
//! local hour, case-type group and geography, plus the periodic broadcast of
//! today's per-group totals.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use tix_database::{CaseStore, SummaryStore};
use tix_models::{bucket_date, Geography, Recipient, SummaryBucketKey, SummaryDelta};
use tix_utils::{TixError, TixResult};

use crate::lookup::GroupTypeCache;
use crate::notify::Notifier;
use crate::scheduler::PeriodicJob;

/// Today's totals for one org, as broadcast to dashboard clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub org_id: String,
    pub date: String,
    pub total: i64,
    /// One entry per group: `{"<prefix>_en", "<prefix>_th", "val"}`.
    pub groups: Vec<Value>,
}

#[derive(Clone)]
pub struct DashboardAggregator {
    summaries: Arc<dyn SummaryStore>,
    cases: Arc<dyn CaseStore>,
    groups: GroupTypeCache,
    notifier: Notifier,
    offset: FixedOffset,
}

/// In-SLA when the close took at most the SLA. A case without a positive SLA
/// cannot be late.
pub fn close_delta(duration_secs: i64, sla_minutes: Option<i32>) -> SummaryDelta {
    match sla_minutes.filter(|m| *m > 0) {
        Some(sla) if duration_secs > i64::from(sla) * 60 => SummaryDelta::closed_over_sla(),
        _ => SummaryDelta::closed_in_sla(duration_secs.max(0)),
    }
}

impl DashboardAggregator {
    pub fn new(
        summaries: Arc<dyn SummaryStore>,
        cases: Arc<dyn CaseStore>,
        groups: GroupTypeCache,
        notifier: Notifier,
        offset: FixedOffset,
    ) -> Self {
        Self { summaries, cases, groups, notifier, offset }
    }

    pub fn today(&self) -> String {
        bucket_date(Utc::now(), self.offset)
    }

    pub async fn record_case_opened(
        &self,
        org_id: &str,
        case_type_id: &str,
        geography: &Geography,
    ) -> TixResult<SummaryBucketKey> {
        self.record_case_opened_at(org_id, case_type_id, geography, Utc::now()).await
    }

    pub async fn record_case_opened_at(
        &self,
        org_id: &str,
        case_type_id: &str,
        geography: &Geography,
        at: DateTime<Utc>,
    ) -> TixResult<SummaryBucketKey> {
        let group = self.groups.group_for(org_id, case_type_id).await?;
        let key = SummaryBucketKey::at(org_id, &group.group_type_id, geography, at, self.offset);
        self.summaries.increment_summary(&key, SummaryDelta::opened()).await?;

        tracing::debug!(org_id, case_type_id, group = %group.group_type_id, date = %key.date, hour = %key.hour, "Case counted as opened");
        Ok(key)
    }

    /// Fold a closed case into today's bucket: in-SLA closes add their duration,
    /// over-SLA closes only bump the over-SLA count.
    pub async fn record_case_closed_with_sla(&self, org_id: &str, case_id: &str) -> TixResult<SummaryDelta> {
        let case = self
            .cases
            .find_case(org_id, case_id)
            .await?
            .ok_or_else(|| TixError::not_found(format!("case {}", case_id)))?;

        let now = Utc::now();
        let closed_at = case.closed_at.unwrap_or(now);
        let duration_secs = (closed_at - case.created_at).num_seconds();
        let delta = close_delta(duration_secs, case.case_sla);

        let group = self.groups.group_for(org_id, &case.case_type_id).await?;
        let key = SummaryBucketKey::at(org_id, &group.group_type_id, &case.geography(), now, self.offset);
        self.summaries.increment_summary(&key, delta).await?;

        tracing::info!(
            org_id,
            case_id,
            duration_secs,
            sla_minutes = ?case.case_sla,
            in_sla = delta.in_sla == 1,
            "Case close folded into summary"
        );
        Ok(delta)
    }

    pub async fn summary_for(&self, org_id: &str, date: &str) -> TixResult<DashboardSummary> {
        let totals = self.summaries.group_totals(org_id, date).await?;
        let groups = self.groups.groups_of(org_id).await?;

        let mut total = 0;
        let mut entries = Vec::with_capacity(groups.len());
        for group in &groups {
            let val = totals
                .iter()
                .find(|t| t.group_type_id == group.group_type_id)
                .map_or(0, |t| t.total);
            total += val;

            let mut entry = Map::new();
            entry.insert(format!("{}_en", group.prefix), json!(group.en));
            entry.insert(format!("{}_th", group.prefix), json!(group.th));
            entry.insert("val".to_string(), json!(val));
            entries.push(Value::Object(entry));
        }

        Ok(DashboardSummary { org_id: org_id.to_string(), date: date.to_string(), total, groups: entries })
    }

    /// Compute today's summary and push it as a hidden dashboard notification.
    pub async fn broadcast_summary(
        &self,
        org_id: &str,
        username: &str,
        recipients: Vec<Recipient>,
    ) -> TixResult<DashboardSummary> {
        let summary = self.summary_for(org_id, &self.today()).await?;
        let data = serde_json::to_value(&summary)?;
        self.notifier.dashboard_summary(org_id, username, recipients, data).await;
        Ok(summary)
    }
}

/// Periodic broadcast to every org with activity today.
pub struct DashboardReporter {
    aggregator: DashboardAggregator,
    sender: String,
}

impl DashboardReporter {
    pub fn new(aggregator: DashboardAggregator, sender: impl Into<String>) -> Self {
        Self { aggregator, sender: sender.into() }
    }
}

#[async_trait]
impl PeriodicJob for DashboardReporter {
    fn name(&self) -> &'static str {
        "dashboard_report"
    }

    async fn tick(&self) -> TixResult<()> {
        let date = self.aggregator.today();
        let orgs = self.aggregator.summaries.orgs_with_activity(&date).await?;

        for org_id in orgs {
            if let Err(e) = self
                .aggregator
                .broadcast_summary(&org_id, &self.sender, vec![Recipient::org(&org_id)])
                .await
            {
                tracing::warn!(org_id = %org_id, error = %e, "Dashboard broadcast failed");
            }
        }
        Ok(())
    }
}
