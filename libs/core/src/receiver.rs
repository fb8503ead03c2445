use ptb_correlation::{Correlations, Field};
use serde_json::{Value, json};
use tracing::{Instrument, error, info, info_span, warn};

use crate::classify::{Classification, classify};
use crate::correlation_id;
use crate::error::ExchangeError;
use crate::journal::{ExchangeLogEntry, LogKind, SharedExchangeLog};

pub const EXPIRED_MESSAGE: &str = "UUID not found or expired";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Accepted {
        uuid: String,
        classification: Classification,
    },
    /// No pending exchange exists for the id (never opened, finished or expired).
    Expired { uuid: String },
}

impl CallbackOutcome {
    pub fn uuid(&self) -> &str {
        match self {
            CallbackOutcome::Accepted { uuid, .. } | CallbackOutcome::Expired { uuid } => uuid,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            CallbackOutcome::Accepted { uuid, .. } => json!({ "status": "ok", "uuid": uuid }),
            CallbackOutcome::Expired { uuid } => json!({
                "status": "expired",
                "uuid": uuid,
                "message": EXPIRED_MESSAGE,
            }),
        }
    }
}

/// Accepts asynchronous device replies and hands them to the waiting exchange.
#[derive(Clone)]
pub struct CallbackReceiver {
    correlations: Correlations,
    journal: SharedExchangeLog,
}

impl CallbackReceiver {
    pub fn new(correlations: Correlations, journal: SharedExchangeLog) -> Self {
        Self {
            correlations,
            journal,
        }
    }

    /// Stores `reply` on the pending record for its `uuid`. Only the first
    /// callback for a pending exchange is accepted; the record is left for the
    /// coordinator to consume.
    pub async fn receive(&self, reply: Value) -> Result<CallbackOutcome, ExchangeError> {
        let uuid = correlation_id(&reply)
            .ok_or_else(|| ExchangeError::invalid("UUID is required in callback"))?;
        let span = info_span!("callback", uuid = %uuid);
        self.accept(uuid, reply).instrument(span).await
    }

    async fn accept(&self, uuid: String, reply: Value) -> Result<CallbackOutcome, ExchangeError> {
        let input = self.audit_field(&uuid, Field::InputResponse).await;
        let output = self.audit_field(&uuid, Field::OutputResponse).await;

        let accepted = self
            .correlations
            .answer(&uuid, &reply)
            .await
            .map_err(ExchangeError::Store)?;
        if !accepted {
            warn!("callback for unknown, answered or expired exchange");
            ptb_telemetry::record_callback("expired");
            return Ok(CallbackOutcome::Expired { uuid });
        }

        let classification = classify(&reply);
        info!(%classification, "terminal callback accepted");
        let entry = ExchangeLogEntry::new(
            LogKind::Callback,
            &uuid,
            input,
            output,
            &reply,
            classification,
        );
        if let Err(err) = self.journal.record_exchange(entry).await {
            error!(error = %err, "callback log write failed");
        }
        ptb_telemetry::record_callback("accepted");
        Ok(CallbackOutcome::Accepted {
            uuid,
            classification,
        })
    }

    async fn audit_field(&self, uuid: &str, field: Field) -> Option<String> {
        match self.correlations.get_field(uuid, field).await {
            Ok(value) => value,
            Err(err) => {
                warn!(%field, error = %err, "correlation audit read failed");
                None
            }
        }
    }
}
