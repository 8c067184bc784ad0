//! SLA Monitor
//!
//! Each tick scans open cases whose current node SLA has elapsed since the
//! case was created, alerts the case's province and bumps the over-SLA
//! counter. Runs under the `sla_monitor` lease so one instance acts per tick.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use tix_database::{CaseStore, SlaScan};
use tix_models::SlaCandidate;
use tix_utils::{SlaConfig, TixResult};

use crate::engine::StageEngine;
use crate::scheduler::PeriodicJob;

/// Highest escalation level; later breaches stay at this level.
pub const MAX_ESCALATION_LEVEL: u8 = 2;

/// 1 on the first breach, 2 once the case was already alerted.
pub fn escalation_level(over_sla_count: i32) -> u8 {
    let next = over_sla_count.max(0).saturating_add(1);
    u8::try_from(next).unwrap_or(MAX_ESCALATION_LEVEL).min(MAX_ESCALATION_LEVEL)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SlaTickReport {
    pub scanned: usize,
    pub alerted: usize,
    pub failed: usize,
}

pub struct SlaMonitor {
    cases: Arc<dyn CaseStore>,
    engine: Arc<StageEngine>,
    config: SlaConfig,
}

impl SlaMonitor {
    pub fn new(cases: Arc<dyn CaseStore>, engine: Arc<StageEngine>, config: SlaConfig) -> Self {
        Self { cases, engine, config }
    }

    pub fn scan_at(&self, now: DateTime<Utc>) -> SlaScan {
        SlaScan {
            statuses: self.config.monitored_statuses.clone(),
            max_over_sla_count: self.config.max_over_sla_count,
            cooldown_cutoff: now - Duration::minutes(self.config.cooldown_minutes),
            now,
        }
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> TixResult<SlaTickReport> {
        let candidates = self.cases.sla_candidates(&self.scan_at(now)).await?;
        let mut report = SlaTickReport { scanned: candidates.len(), ..Default::default() };

        for candidate in &candidates {
            match self.escalate(candidate, now).await {
                Ok(count) => {
                    report.alerted += 1;
                    tracing::info!(
                        org_id = %candidate.org_id,
                        case_id = %candidate.case_id,
                        sla_minutes = candidate.node_sla_minutes,
                        over_sla_count = count,
                        "Case over SLA"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(case_id = %candidate.case_id, error = %e, "SLA escalation failed");
                }
            }
        }

        if report.scanned > 0 {
            tracing::debug!(scanned = report.scanned, alerted = report.alerted, failed = report.failed, "SLA scan done");
        }
        Ok(report)
    }

    /// Record the breach, then alert. An unrecorded breach is not alerted, so
    /// the next tick cannot repeat an alert at the same level.
    async fn escalate(&self, candidate: &SlaCandidate, now: DateTime<Utc>) -> TixResult<i32> {
        let level = escalation_level(candidate.over_sla_count);
        let count = self.cases.record_over_sla(&candidate.org_id, &candidate.case_id, now).await?;
        self.engine.emit_sla_alert(candidate, level).await;
        Ok(count)
    }
}

#[async_trait]
impl PeriodicJob for SlaMonitor {
    fn name(&self) -> &'static str {
        "sla_monitor"
    }

    async fn tick(&self) -> TixResult<()> {
        self.tick_at(Utc::now()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_is_bounded() {
        assert_eq!(escalation_level(0), 1);
        assert_eq!(escalation_level(1), 2);
        assert_eq!(escalation_level(7), 2);
        assert_eq!(escalation_level(i32::MAX), 2);
        assert_eq!(escalation_level(-3), 1);
    }
}
