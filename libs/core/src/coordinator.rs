use std::time::Duration;

use ptb_bus::DevicePublisher;
use ptb_correlation::{Correlations, Field};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::classify::{Classification, classify, with_final_status};
use crate::directory::SharedDirectory;
use crate::error::ExchangeError;
use crate::journal::{ExchangeLogEntry, LogKind, SharedExchangeLog};
use crate::{ExchangeConfig, correlation_id, participant_id};

pub const TIMEOUT_MESSAGE: &str = "No response from device";

/// Terminal result of [`ExchangeCoordinator::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The device replied. `reply` carries the numeric `final_Status` field.
    Answered {
        reply: Value,
        classification: Classification,
    },
    Timeout { body: Value },
    Disabled { body: Value },
    PublishFailed { body: Value, error: String },
}

impl SubmitOutcome {
    pub fn classification(&self) -> Classification {
        match self {
            SubmitOutcome::Answered { classification, .. } => *classification,
            SubmitOutcome::Timeout { .. } => Classification::Timeout,
            SubmitOutcome::Disabled { .. } => Classification::Disabled,
            SubmitOutcome::PublishFailed { .. } => Classification::Failed,
        }
    }

    /// JSON body returned to the caller.
    pub fn body(&self) -> &Value {
        match self {
            SubmitOutcome::Answered { reply, .. } => reply,
            SubmitOutcome::Timeout { body }
            | SubmitOutcome::Disabled { body }
            | SubmitOutcome::PublishFailed { body, .. } => body,
        }
    }

    pub fn into_body(self) -> Value {
        match self {
            SubmitOutcome::Answered { reply, .. } => reply,
            SubmitOutcome::Timeout { body }
            | SubmitOutcome::Disabled { body }
            | SubmitOutcome::PublishFailed { body, .. } => body,
        }
    }
}

/// Drives one exchange from submission to its terminal outcome.
///
/// Every submit that passes validation and destination lookup ends with
/// exactly one [`LogKind::Exchange`] entry and the correlation record deleted,
/// whichever outcome is reached.
#[derive(Clone)]
pub struct ExchangeCoordinator {
    correlations: Correlations,
    directory: SharedDirectory,
    publisher: DevicePublisher,
    journal: SharedExchangeLog,
    config: ExchangeConfig,
}

impl ExchangeCoordinator {
    pub fn new(
        correlations: Correlations,
        directory: SharedDirectory,
        publisher: DevicePublisher,
        journal: SharedExchangeLog,
        config: ExchangeConfig,
    ) -> Self {
        Self {
            correlations,
            directory,
            publisher,
            journal,
            config,
        }
    }

    pub async fn submit(&self, request: Value) -> Result<SubmitOutcome, ExchangeError> {
        let uuid =
            correlation_id(&request).ok_or_else(|| ExchangeError::invalid("UUID is required"))?;
        let user =
            participant_id(&request).ok_or_else(|| ExchangeError::invalid("User is required"))?;

        let span = info_span!("exchange", uuid = %uuid, user = %user);
        self.run(uuid, user, request).instrument(span).await
    }

    async fn run(
        &self,
        uuid: String,
        user: String,
        request: Value,
    ) -> Result<SubmitOutcome, ExchangeError> {
        self.correlations
            .open(&uuid, &request)
            .await
            .map_err(ExchangeError::Store)?;

        let route = match self.directory.resolve(&user).await {
            Ok(Some(route)) => route,
            Ok(None) => {
                self.discard(&uuid).await;
                return Err(ExchangeError::DestinationNotFound(user));
            }
            Err(err) => {
                self.discard(&uuid).await;
                return Err(ExchangeError::Directory(err));
            }
        };

        if !route.enabled {
            info!(topic = %route.topic, "terminal disabled; exchange not published");
            let body = json!({
                "status": "disabled",
                "message": format!("Device is not enabled for user {user}"),
                "uuid": uuid,
            });
            self.finish(&uuid, &request, None, &body, Classification::Disabled)
                .await;
            return Ok(SubmitOutcome::Disabled { body });
        }

        let report = self.publisher.publish(&route.topic, &request).await;
        self.store_audit(&uuid, &request, &report.message).await;

        if !report.is_sent() {
            let error = report.error.clone().unwrap_or_default();
            let body = json!({
                "status": "failed",
                "topic": report.topic,
                "message": report.message,
                "error": error,
                "uuid": uuid,
            });
            self.finish(
                &uuid,
                &request,
                Some(&report.message),
                &body,
                Classification::Failed,
            )
            .await;
            return Ok(SubmitOutcome::PublishFailed { body, error });
        }

        match self.await_reply(&uuid).await {
            Some(reply) => {
                let classification = classify(&reply);
                let reply = with_final_status(reply, classification);
                info!(%classification, "terminal replied");
                self.finish(
                    &uuid,
                    &request,
                    Some(&report.message),
                    &reply,
                    classification,
                )
                .await;
                Ok(SubmitOutcome::Answered {
                    reply,
                    classification,
                })
            }
            None => {
                info!(
                    timeout_secs = self.config.timeout.as_secs(),
                    "terminal did not reply in time"
                );
                let logged = json!({ "status": "timeout", "message": TIMEOUT_MESSAGE });
                self.finish(
                    &uuid,
                    &request,
                    Some(&report.message),
                    &logged,
                    Classification::Timeout,
                )
                .await;
                let body = json!({
                    "status": "timeout",
                    "message": TIMEOUT_MESSAGE,
                    "uuid": uuid,
                });
                Ok(SubmitOutcome::Timeout { body })
            }
        }
    }

    /// Polls the record until a response shows up or the budget runs out.
    /// Store read failures are retried on the next tick.
    async fn await_reply(&self, uuid: &str) -> Option<Value> {
        let deadline = Instant::now() + self.config.timeout;
        loop {
            match self.correlations.get_response(uuid).await {
                Ok(Some(reply)) => return Some(reply),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "correlation poll failed"),
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let pause: Duration = self.config.poll_interval.min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }

    async fn store_audit(&self, uuid: &str, input: &Value, output: &Value) {
        for (field, value) in [(Field::InputResponse, input), (Field::OutputResponse, output)] {
            match self.correlations.set_field(uuid, field, value).await {
                Ok(true) => {}
                Ok(false) => debug!(%field, "correlation record gone before audit write"),
                Err(err) => warn!(%field, error = %err, "correlation audit write failed"),
            }
        }
    }

    async fn finish(
        &self,
        uuid: &str,
        input: &Value,
        output: Option<&Value>,
        final_response: &Value,
        classification: Classification,
    ) {
        let entry = ExchangeLogEntry::new(
            LogKind::Exchange,
            uuid,
            Some(input.to_string()),
            output.map(Value::to_string),
            final_response,
            classification,
        );
        if let Err(err) = self.journal.record_exchange(entry).await {
            error!(error = %err, status = %classification, "exchange log write failed");
        }
        self.discard(uuid).await;
        ptb_telemetry::record_exchange_outcome(classification.as_str());
    }

    async fn discard(&self, uuid: &str) {
        if let Err(err) = self.correlations.delete(uuid).await {
            warn!(error = %err, "correlation record delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DeviceRoute, StaticDirectory};
    use crate::journal::MemoryExchangeLog;
    use crate::FINAL_STATUS_FIELD;
    use ptb_bus::{DEVICE_TOPIC_FIELD, InMemoryBusClient};
    use ptb_correlation::{DEFAULT_RECORD_TTL, MemoryCorrelationStore};
    use std::sync::Arc;
    use tracing_test::traced_test;

    struct Harness {
        store: Arc<MemoryCorrelationStore>,
        correlations: Correlations,
        bus: InMemoryBusClient,
        journal: Arc<MemoryExchangeLog>,
        coordinator: ExchangeCoordinator,
    }

    fn harness(bus: InMemoryBusClient, timeout_secs: u64) -> Harness {
        let store = Arc::new(MemoryCorrelationStore::new());
        let correlations = Correlations::new(store.clone(), DEFAULT_RECORD_TTL);
        let directory = StaticDirectory::new()
            .with_route("cashier-1", DeviceRoute::enabled("terminals/t-100"))
            .with_route("cashier-2", DeviceRoute::disabled("terminals/t-200"));
        let journal = Arc::new(MemoryExchangeLog::new());
        let coordinator = ExchangeCoordinator::new(
            correlations.clone(),
            Arc::new(directory),
            DevicePublisher::new(Arc::new(bus.clone())),
            journal.clone(),
            ExchangeConfig::with_timeout_secs(timeout_secs),
        );
        Harness {
            store,
            correlations,
            bus,
            journal,
            coordinator,
        }
    }

    fn reply_after(
        correlations: &Correlations,
        uuid: &str,
        after: Duration,
        reply: Value,
    ) -> tokio::task::JoinHandle<bool> {
        let correlations = correlations.clone();
        let uuid = uuid.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            correlations.answer(&uuid, &reply).await.unwrap()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn approved_reply_resolves_exchange() {
        let h = harness(InMemoryBusClient::default(), 30);
        let device = reply_after(
            &h.correlations,
            "u1",
            Duration::from_millis(2500),
            json!({"uuid": "u1", "result": "APPROVED_BY_BANK"}),
        );

        let outcome = h
            .coordinator
            .submit(json!({"uuid": "u1", "user": "cashier-1", "amount": 25}))
            .await
            .unwrap();
        assert!(device.await.unwrap());

        assert_eq!(outcome.classification(), Classification::Approved);
        assert_eq!(outcome.body()["result"], "APPROVED_BY_BANK");
        assert_eq!(outcome.body()[FINAL_STATUS_FIELD], 1);

        let published = h.bus.take_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "terminals/t-100");
        assert_eq!(published[0].1[DEVICE_TOPIC_FIELD], "terminals/t-100");
        assert_eq!(published[0].1["amount"], 25);

        let entries = h.journal.entries_for("u1", LogKind::Exchange).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Classification::Approved);
        assert!(entries[0].output_response.as_deref().unwrap().contains("device_topic"));
        assert!(!h.store.contains("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn declined_reply_sets_zero_final_status() {
        let h = harness(InMemoryBusClient::default(), 30);
        let device = reply_after(
            &h.correlations,
            "u2",
            Duration::from_secs(4),
            json!({"result": "declined"}),
        );

        let outcome = h
            .coordinator
            .submit(json!({"uuid": "u2", "user": "cashier-1"}))
            .await
            .unwrap();
        assert!(device.await.unwrap());

        match outcome {
            SubmitOutcome::Answered {
                reply,
                classification,
            } => {
                assert_eq!(classification, Classification::Declined);
                assert_eq!(reply, json!({"result": "declined", "final_Status": 0}));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(h.journal.entries().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out_after_budget() {
        let h = harness(InMemoryBusClient::default(), 5);
        let started = Instant::now();

        let outcome = h
            .coordinator
            .submit(json!({"uuid": "u3", "user": "cashier-1"}))
            .await
            .unwrap();

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
        assert_eq!(
            outcome.into_body(),
            json!({"status": "timeout", "message": TIMEOUT_MESSAGE, "uuid": "u3"})
        );
        assert!(!h.store.contains("u3"));

        let entries = h.journal.entries_for("u3", LogKind::Exchange).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Classification::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_landing_on_the_deadline_still_counts() {
        let h = harness(InMemoryBusClient::default(), 3);
        let device = reply_after(
            &h.correlations,
            "u4",
            Duration::from_millis(2999),
            json!({"result": "approved"}),
        );

        let outcome = h
            .coordinator
            .submit(json!({"uuid": "u4", "user": "cashier-1"}))
            .await
            .unwrap();
        assert!(device.await.unwrap());
        assert_eq!(outcome.classification(), Classification::Approved);
    }

    #[tokio::test]
    async fn disabled_device_is_never_published() {
        let h = harness(InMemoryBusClient::default(), 30);

        let outcome = h
            .coordinator
            .submit(json!({"uuid": 42, "user": "cashier-2"}))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SubmitOutcome::Disabled {
                body: json!({
                    "status": "disabled",
                    "message": "Device is not enabled for user cashier-2",
                    "uuid": "42",
                })
            }
        );
        assert_eq!(h.bus.published_count().await, 0);
        assert!(h.store.is_empty());

        let entries = h.journal.entries_for("42", LogKind::Exchange).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Classification::Disabled);
        assert!(entries[0].output_response.is_none());
    }

    #[tokio::test]
    async fn unknown_participant_leaves_no_record() {
        let h = harness(InMemoryBusClient::default(), 30);

        let err = h
            .coordinator
            .submit(json!({"uuid": "u5", "user": "ghost"}))
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::DestinationNotFound(ref user) if user == "ghost"));
        assert_eq!(err.to_string(), "No device mapping found for user ghost");
        assert!(h.store.is_empty());
        assert!(h.journal.entries().await.is_empty());
        assert_eq!(h.bus.published_count().await, 0);
    }

    #[tokio::test]
    async fn publish_failure_is_reported_without_polling() {
        let h = harness(InMemoryBusClient::failing("broker unreachable"), 30);

        let outcome = h
            .coordinator
            .submit(json!({"uuid": "u6", "user": "cashier-1"}))
            .await
            .unwrap();

        let SubmitOutcome::PublishFailed { body, error } = outcome else {
            panic!("expected publish failure");
        };
        assert!(error.contains("broker unreachable"));
        assert_eq!(body["status"], "failed");
        assert_eq!(body["topic"], "terminals/t-100");
        assert_eq!(body["uuid"], "u6");
        assert_eq!(body["message"][DEVICE_TOPIC_FIELD], "terminals/t-100");
        assert!(!h.store.contains("u6"));

        let entries = h.journal.entries_for("u6", LogKind::Exchange).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Classification::Failed);
    }

    #[tokio::test]
    async fn invalid_requests_touch_nothing() {
        let h = harness(InMemoryBusClient::default(), 30);

        for (request, message) in [
            (json!({"user": "cashier-1"}), "UUID is required"),
            (json!({"uuid": "", "user": "cashier-1"}), "UUID is required"),
            (json!({"uuid": "u7"}), "User is required"),
            (json!({"uuid": "u7", "user": "  "}), "User is required"),
            (json!("not an object"), "UUID is required"),
        ] {
            let err = h.coordinator.submit(request).await.unwrap_err();
            assert!(matches!(err, ExchangeError::InvalidInput(_)));
            assert_eq!(err.to_string(), message);
        }
        assert!(h.store.is_empty());
        assert_eq!(h.bus.published_count().await, 0);
        assert!(h.journal.entries().await.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn log_write_failure_keeps_the_outcome() {
        let h = harness(InMemoryBusClient::default(), 30);
        h.journal.reject_writes(true);

        let outcome = h
            .coordinator
            .submit(json!({"uuid": "u8", "user": "cashier-2"}))
            .await
            .unwrap();

        assert_eq!(outcome.classification(), Classification::Disabled);
        assert!(!h.store.contains("u8"));
        assert!(logs_contain("exchange log write failed"));
    }
}
