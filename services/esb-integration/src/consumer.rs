//! Topic consumption with connection retry.
//!
//! Every topic worker runs [`consume_with_retry`]: connect (retrying a
//! bounded number of times), then decode and dispatch each payload to a
//! [`TopicHandler`]. Malformed payloads and messages echoed back from our own
//! outbound sync are dropped without retry.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tix_case_workflow::metrics::metrics;
use tix_utils::{TixError, TixResult};

/// An open subscription to one topic.
#[async_trait]
pub trait MessageSource: Send {
    /// Next raw payload. `Ok(None)` means the stream has ended.
    async fn recv(&mut self) -> TixResult<Option<Vec<u8>>>;
}

/// Opens subscriptions; each call is one connection attempt.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect(&self, topic: &str) -> TixResult<Box<dyn MessageSource>>;
}

/// Typed handler for one topic's messages.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    type Message: DeserializeOwned + Send;

    /// Declared origin of the message, used for echo suppression.
    fn source(message: &Self::Message) -> Option<&str>;

    async fn handle(&self, message: Self::Message) -> TixResult<()>;
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub max_attempts: u32,
    pub retry_interval: Duration,
    /// Our own integration tag; inbound messages carrying it are skipped.
    pub source_tag: String,
}

/// What happened to a single payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Handled,
    Echo,
    Malformed,
    Failed,
}

/// Decode one payload and hand it to `handler`.
pub async fn dispatch<H: TopicHandler>(topic: &str, payload: &[u8], handler: &H, source_tag: &str) -> Disposition {
    let message: H::Message = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(e) => {
            let err = TixError::from(e);
            tracing::warn!(topic, error = %err, bytes = payload.len(), "Dropping malformed message");
            metrics().kafka_dropped.with_label_values(&[topic]).inc();
            return Disposition::Malformed;
        }
    };

    if H::source(&message).is_some_and(|source| !source.is_empty() && source == source_tag) {
        tracing::debug!(topic, source = source_tag, "Skipping echoed message");
        return Disposition::Echo;
    }

    match handler.handle(message).await {
        Ok(()) => Disposition::Handled,
        Err(e) => {
            tracing::error!(topic, code = e.error_code(), error = %e, "Message handling failed");
            Disposition::Failed
        }
    }
}

/// Connect, retrying up to `max_attempts` times. `Ok(None)` on cancellation.
async fn connect_with_retry(
    topic: &str,
    connector: &dyn SourceConnector,
    settings: &ConsumerSettings,
    cancel: &CancellationToken,
) -> TixResult<Option<Box<dyn MessageSource>>> {
    let max_attempts = settings.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            result = connector.connect(topic) => match result {
                Ok(source) => {
                    tracing::info!(topic, attempt, "Consumer connected");
                    return Ok(Some(source));
                }
                Err(e) => {
                    tracing::warn!(topic, attempt, max_attempts, error = %e, "Consumer connection attempt failed");
                }
            }
        }

        if attempt < max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(settings.retry_interval) => {}
            }
        }
    }

    Err(TixError::messaging(format!(
        "{}: no connection after {} attempts",
        topic, max_attempts
    )))
}

/// Run a topic worker until cancelled or the stream ends.
///
/// A receive error drops the connection and starts a fresh round of
/// connection attempts. Exhausting those attempts is fatal to the worker.
pub async fn consume_with_retry<H: TopicHandler>(
    topic: &str,
    connector: &dyn SourceConnector,
    handler: &H,
    settings: &ConsumerSettings,
    cancel: &CancellationToken,
) -> TixResult<()> {
    loop {
        let Some(mut source) = connect_with_retry(topic, connector, settings, cancel).await? else {
            tracing::info!(topic, "Consumer cancelled");
            return Ok(());
        };

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(topic, "Consumer cancelled");
                    return Ok(());
                }
                next = source.recv() => next,
            };

            match next {
                Ok(Some(payload)) => {
                    dispatch(topic, &payload, handler, &settings.source_tag).await;
                }
                Ok(None) => {
                    tracing::info!(topic, "Stream ended");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(topic, error = %e, "Receive failed, reconnecting");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Deserialize)]
    struct Ping {
        value: String,
        #[serde(default)]
        source: Option<String>,
    }

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TopicHandler for Collect {
        type Message = Ping;

        fn source(message: &Ping) -> Option<&str> {
            message.source.as_deref()
        }

        async fn handle(&self, message: Ping) -> TixResult<()> {
            if message.value == "boom" {
                return Err(TixError::validation("value", "boom"));
            }
            self.seen.lock().unwrap().push(message.value);
            Ok(())
        }
    }

    struct Queue(Vec<TixResult<Option<Vec<u8>>>>);

    #[async_trait]
    impl MessageSource for Queue {
        async fn recv(&mut self) -> TixResult<Option<Vec<u8>>> {
            if self.0.is_empty() {
                return Ok(None);
            }
            self.0.remove(0)
        }
    }

    /// Fails the first `failures` attempts, then serves `payloads` once per connection.
    struct Flaky {
        failures: u32,
        attempts: AtomicU32,
        payloads: Mutex<Vec<Vec<TixResult<Option<Vec<u8>>>>>>,
    }

    impl Flaky {
        fn new(failures: u32, connections: Vec<Vec<TixResult<Option<Vec<u8>>>>>) -> Self {
            Self { failures, attempts: AtomicU32::new(0), payloads: Mutex::new(connections) }
        }
    }

    #[async_trait]
    impl SourceConnector for Flaky {
        async fn connect(&self, _topic: &str) -> TixResult<Box<dyn MessageSource>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(TixError::messaging("broker unavailable"));
            }
            let mut connections = self.payloads.lock().unwrap();
            if connections.is_empty() {
                return Err(TixError::messaging("broker unavailable"));
            }
            Ok(Box::new(Queue(connections.remove(0))))
        }
    }

    fn settings(max_attempts: u32) -> ConsumerSettings {
        ConsumerSettings {
            max_attempts,
            retry_interval: Duration::from_millis(1),
            source_tag: "tix".into(),
        }
    }

    fn payload(raw: &str) -> TixResult<Option<Vec<u8>>> {
        Ok(Some(raw.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn test_dispatch_drops_malformed_and_echoed() {
        let handler = Collect::default();

        assert_eq!(dispatch("t", b"{not json", &handler, "tix").await, Disposition::Malformed);
        assert_eq!(dispatch("t", br#"{"value":"a","source":"tix"}"#, &handler, "tix").await, Disposition::Echo);
        assert_eq!(dispatch("t", br#"{"value":"b","source":"mettriq"}"#, &handler, "tix").await, Disposition::Handled);
        assert_eq!(dispatch("t", br#"{"value":"boom"}"#, &handler, "tix").await, Disposition::Failed);

        assert_eq!(*handler.seen.lock().unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_connects_after_transient_failures() {
        let handler = Collect::default();
        let connector = Flaky::new(2, vec![vec![payload(r#"{"value":"a"}"#), payload("garbage"), payload(r#"{"value":"c"}"#)]]);

        consume_with_retry("t", &connector, &handler, &settings(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(*handler.seen.lock().unwrap(), vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let handler = Collect::default();
        let connector = Flaky::new(u32::MAX, vec![]);

        let err = consume_with_retry("t", &connector, &handler, &settings(4), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "MESSAGING_ERROR");
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_receive_error_reconnects() {
        let handler = Collect::default();
        let connector = Flaky::new(
            0,
            vec![
                vec![payload(r#"{"value":"a"}"#), Err(TixError::messaging("connection reset"))],
                vec![payload(r#"{"value":"b"}"#)],
            ],
        );

        consume_with_retry("t", &connector, &handler, &settings(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(*handler.seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_worker_stops_cleanly() {
        let handler = Collect::default();
        let connector = Flaky::new(u32::MAX, vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        consume_with_retry("t", &connector, &handler, &settings(10), &cancel).await.unwrap();
    }
}
