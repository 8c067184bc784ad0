use prometheus::{IntCounter, IntCounterVec, Opts, TextEncoder};
use std::sync::OnceLock;

pub struct Metrics {
    pub transitions: IntCounterVec,
    pub cases_opened: IntCounter,
    pub sla_alerts: IntCounter,
    pub sync_failures: IntCounterVec,
    pub sync_dead_lettered: IntCounter,
    pub kafka_dropped: IntCounterVec,
    pub summary_failures: IntCounter,
}

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric definition is valid");
    register(Box::new(counter.clone()));
    counter
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).expect("metric definition is valid");
    register(Box::new(counter.clone()));
    counter
}

fn register(collector: Box<dyn prometheus::core::Collector>) {
    if let Err(e) = prometheus::register(collector) {
        tracing::warn!(error = %e, "Metric registration failed");
    }
}

/// Process-wide counters, registered with the default prometheus registry on first use.
pub fn metrics() -> &'static Metrics {
    static METRICS: OnceLock<Metrics> = OnceLock::new();
    METRICS.get_or_init(|| Metrics {
        transitions: counter_vec("tix_case_transitions_total", "Stage transitions by target status", &["status"]),
        cases_opened: counter("tix_cases_opened_total", "Cases opened"),
        sla_alerts: counter("tix_sla_alerts_total", "Over-SLA alerts emitted"),
        sync_failures: counter_vec("tix_case_sync_failures_total", "Outbound work-order sync failures", &["kind"]),
        sync_dead_lettered: counter("tix_case_sync_dead_lettered_total", "Sync entries moved to dead letter"),
        kafka_dropped: counter_vec("tix_kafka_dropped_total", "Kafka messages dropped", &["topic"]),
        summary_failures: counter("tix_summary_failures_total", "Dashboard summary updates that failed"),
    })
}

pub fn render() -> String {
    metrics();
    TextEncoder::new()
        .encode_to_string(&prometheus::gather())
        .unwrap_or_else(|_| "Error encoding metrics".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        metrics().transitions.with_label_values(&["S002"]).inc();
        metrics().sla_alerts.inc();
        let text = render();
        assert!(text.contains("tix_case_transitions_total"));
        assert!(text.contains("tix_sla_alerts_total"));
    }
}
