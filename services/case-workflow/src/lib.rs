//! Tix Case Workflow
//!
//! Case lifecycle core shared by the HTTP service and the ESB workers:
//! intake, stage transitions over workflow graphs, SLA monitoring, dashboard
//! summaries and outbound work-order sync.

pub mod api;
pub mod dashboard;
pub mod engine;
pub mod graph;
pub mod intake;
pub mod lookup;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod sla_monitor;
pub mod state_machine;
pub mod sync;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tix_database::{
    CacheStore, CaseRepository, CaseStore, DirectoryRepository, DirectoryStore, NotificationRepository,
    NotificationSink, PostgresPool, RedisCache, RedisPool, SummaryRepository, SummaryStore,
};
use tix_utils::AppConfig;

use crate::dashboard::{DashboardAggregator, DashboardReporter};
use crate::engine::StageEngine;
use crate::graph::WorkflowGraphReader;
use crate::intake::CaseIntake;
use crate::lookup::GroupTypeCache;
use crate::notify::Notifier;
use crate::scheduler::{run_leased, Lease, PeriodicJob};
use crate::sla_monitor::SlaMonitor;
use crate::state_machine::StatusCatalog;
use crate::sync::{CaseSync, CaseSyncReconciler, SyncSettings, WorkOrderClient};

pub const NOTIFICATION_SENDER: &str = "system";

/// Persistence handles, one per store seam.
#[derive(Clone)]
pub struct Stores {
    pub cases: Arc<dyn CaseStore>,
    pub summaries: Arc<dyn SummaryStore>,
    pub directory: Arc<dyn DirectoryStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub cache: Arc<dyn CacheStore>,
}

impl Stores {
    pub fn postgres(pool: PostgresPool, redis: RedisPool) -> Self {
        Self {
            cases: Arc::new(CaseRepository::new(pool.clone())),
            summaries: Arc::new(SummaryRepository::new(pool.clone())),
            directory: Arc::new(DirectoryRepository::new(pool.clone())),
            notifications: Arc::new(NotificationRepository::new(pool)),
            cache: Arc::new(RedisCache::new(redis)),
        }
    }

    /// Every seam backed by the same object.
    pub fn from_single<S>(store: Arc<S>) -> Self
    where
        S: CaseStore + SummaryStore + DirectoryStore + NotificationSink + CacheStore + 'static,
    {
        Self {
            cases: store.clone(),
            summaries: store.clone(),
            directory: store.clone(),
            notifications: store.clone(),
            cache: store,
        }
    }
}

/// Wired case services for one process.
#[derive(Clone)]
pub struct CaseServices {
    pub config: AppConfig,
    pub stores: Stores,
    pub catalog: StatusCatalog,
    pub groups: GroupTypeCache,
    pub notifier: Notifier,
    pub dashboard: DashboardAggregator,
    pub engine: Arc<StageEngine>,
    pub intake: Arc<CaseIntake>,
    pub sync: Arc<CaseSync>,
}

impl CaseServices {
    pub fn new(config: &AppConfig, stores: Stores, client: Arc<dyn WorkOrderClient>) -> Self {
        let offset = config.dashboard.reporting_offset();
        let catalog = StatusCatalog::new(config.workflow.status_codes.clone());
        let groups = GroupTypeCache::new(
            stores.summaries.clone(),
            stores.cache.clone(),
            config.cache.key("case_type_groups"),
            config.cache.ttl(),
        );
        let notifier = Notifier::new(stores.notifications.clone(), NOTIFICATION_SENDER);
        let dashboard = DashboardAggregator::new(
            stores.summaries.clone(),
            stores.cases.clone(),
            groups.clone(),
            notifier.clone(),
            offset,
        );
        let graph = WorkflowGraphReader::new(stores.cases.clone(), config.workflow.dispatch_status.clone());
        let engine = Arc::new(StageEngine::new(
            stores.cases.clone(),
            graph,
            catalog.clone(),
            notifier.clone(),
            dashboard.clone(),
            config.workflow.sla_closing_statuses.clone(),
        ));
        let intake = Arc::new(CaseIntake::new(
            stores.cases.clone(),
            engine.clone(),
            notifier.clone(),
            dashboard.clone(),
            offset,
        ));
        let sync = Arc::new(CaseSync::new(
            stores.cases.clone(),
            stores.cache.clone(),
            client,
            catalog.clone(),
            SyncSettings {
                enabled: config.integration.sync_enabled,
                source_tag: config.integration.source_tag.clone(),
                priorities: config.integration.severity_priorities.clone(),
                queue_key: config.cache.key("case_sync:queue"),
                dead_letter_key: config.cache.key("case_sync:dead"),
                max_retry: config.integration.sync_max_retry,
            },
        ));

        Self {
            config: config.clone(),
            stores,
            catalog,
            groups,
            notifier,
            dashboard,
            engine,
            intake,
            sync,
        }
    }

    pub fn lease(&self, job: &str, ttl_seconds: u64) -> Lease {
        Lease::new(
            self.stores.cache.clone(),
            self.config.cache.key(&format!("lease:{}", job)),
            self.config.server.instance_id.clone(),
            Duration::from_secs(ttl_seconds),
        )
    }

    pub fn sla_monitor(&self) -> SlaMonitor {
        SlaMonitor::new(self.stores.cases.clone(), self.engine.clone(), self.config.sla.clone())
    }

    pub fn dashboard_reporter(&self) -> DashboardReporter {
        DashboardReporter::new(self.dashboard.clone(), NOTIFICATION_SENDER)
    }

    pub fn sync_reconciler(&self) -> CaseSyncReconciler {
        CaseSyncReconciler::new(self.sync.clone())
    }

    fn spawn_job(&self, job: Arc<dyn PeriodicJob>, ttl_seconds: u64, every_minutes: u64, cancel: &CancellationToken) -> JoinHandle<()> {
        let lease = self.lease(job.name(), ttl_seconds);
        let interval = Duration::from_secs(every_minutes.max(1) * 60);
        tokio::spawn(run_leased(job, lease, interval, cancel.clone()))
    }

    /// Start the SLA monitor and dashboard reporter loops, as enabled.
    pub fn spawn_workflow_jobs(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if self.config.sla.enabled {
            handles.push(self.spawn_job(
                Arc::new(self.sla_monitor()),
                self.config.sla.lease_ttl_seconds,
                self.config.sla.interval_minutes,
                cancel,
            ));
        }
        if self.config.dashboard.broadcast_enabled {
            handles.push(self.spawn_job(
                Arc::new(self.dashboard_reporter()),
                self.config.dashboard.lease_ttl_seconds,
                self.config.dashboard.broadcast_interval_minutes,
                cancel,
            ));
        }
        handles
    }

    /// Start the retry-queue reconciler loop, if sync is enabled.
    pub fn spawn_sync_job(&self, cancel: &CancellationToken) -> Option<JoinHandle<()>> {
        self.config.integration.sync_enabled.then(|| {
            self.spawn_job(
                Arc::new(self.sync_reconciler()),
                self.config.integration.sync_lease_ttl_seconds,
                self.config.integration.sync_interval_minutes,
                cancel,
            )
        })
    }
}
