//! Tix ESB Integration
//!
//! Topic workers that apply inbound work-order, user-account, unit-status
//! and notification messages, plus the outbound sync reconciler.

pub mod consumer;
pub mod handlers;
#[cfg(feature = "kafka")]
pub mod kafka;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use tix_case_workflow::CaseServices;
use tix_utils::{AppConfig, TixResult};

use crate::consumer::{consume_with_retry, ConsumerSettings, SourceConnector, TopicHandler};
use crate::handlers::{
    EsbContext, EsbNotified, UnitStatusChanged, UserAccountDeleted, UserAccountUpserted, WorkOrderCreated,
    WorkOrderUpdated,
};

pub const STAFF_USER_TYPE: &str = "staff";
pub const ADMIN_USER_TYPE: &str = "admin";

pub fn consumer_settings(config: &AppConfig) -> ConsumerSettings {
    ConsumerSettings {
        max_attempts: config.kafka.connect_max_attempts,
        retry_interval: Duration::from_secs(config.kafka.connect_retry_interval_seconds),
        source_tag: config.integration.source_tag.clone(),
    }
}

fn spawn_topic<H>(
    workers: &mut JoinSet<TixResult<()>>,
    topic: &str,
    handler: H,
    connector: &Arc<dyn SourceConnector>,
    settings: &ConsumerSettings,
    cancel: &CancellationToken,
) where
    H: TopicHandler + 'static,
{
    let topic = topic.to_string();
    let connector = connector.clone();
    let settings = settings.clone();
    let cancel = cancel.clone();
    workers.spawn(async move {
        let result = consume_with_retry(&topic, connector.as_ref(), &handler, &settings, &cancel).await;
        if let Err(e) = &result {
            tracing::error!(topic = %topic, error = %e, "Topic worker stopped");
        }
        result
    });
}

/// Spawn one worker per configured topic into `workers`.
pub fn spawn_consumers(
    workers: &mut JoinSet<TixResult<()>>,
    services: &CaseServices,
    connector: Arc<dyn SourceConnector>,
    cancel: &CancellationToken,
) {
    let config = &services.config;
    let topics = &config.kafka.topics;
    let settings = consumer_settings(config);
    let context = Arc::new(EsbContext::new(services.clone()));

    spawn_topic(workers, &topics.work_order_create, WorkOrderCreated(context.clone()), &connector, &settings, cancel);
    spawn_topic(workers, &topics.work_order_update, WorkOrderUpdated(context.clone()), &connector, &settings, cancel);

    for (topic, user_type) in [
        (&topics.user_staff_create, STAFF_USER_TYPE),
        (&topics.user_staff_update, STAFF_USER_TYPE),
        (&topics.user_admin_create, ADMIN_USER_TYPE),
        (&topics.user_admin_update, ADMIN_USER_TYPE),
    ] {
        let handler = UserAccountUpserted { context: context.clone(), user_type };
        spawn_topic(workers, topic, handler, &connector, &settings, cancel);
    }
    for topic in [&topics.user_staff_delete, &topics.user_admin_delete] {
        spawn_topic(workers, topic, UserAccountDeleted(context.clone()), &connector, &settings, cancel);
    }

    spawn_topic(workers, &topics.user_status, UnitStatusChanged(context.clone()), &connector, &settings, cancel);
    spawn_topic(workers, &topics.esb_notification, EsbNotified(context), &connector, &settings, cancel);

    tracing::info!(workers = workers.len(), "Topic workers started");
}
