//! Delivery of commands to payment terminals over a publish/subscribe broker.
//!
//! [`BusClient`] is the raw transport seam (NATS in production, an in-memory
//! recorder in tests). [`DevicePublisher`] sits on top of it: it injects the
//! destination topic into the payload, publishes exactly once and reports the
//! result as data instead of an error.

mod config;

use std::sync::Arc;
use std::time::Duration;

use async_nats::ConnectOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use config::{
    BrokerConfig, BrokerCredentials, DEFAULT_CONNECT_TIMEOUT, TransportSecurity,
};

/// Field injected into every published payload.
pub const DEVICE_TOPIC_FIELD: &str = "device_topic";

#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("publish to {subject}: {reason}")]
    Publish { subject: String, reason: String },
    #[error("broker did not answer within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait BusClient: Send + Sync {
    async fn publish_value(&self, subject: &str, payload: Value) -> Result<(), BusError>;
}

/// Publishes through a dedicated NATS connection per call.
///
/// Each publish connects (with credentials and TLS as configured), sends one
/// message, flushes and drains the connection. Nothing is pooled or reused.
pub struct NatsBusClient {
    config: BrokerConfig,
}

impl NatsBusClient {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new()
            .name("payment-terminal-bridge")
            .connection_timeout(self.config.connect_timeout);
        if let Some(creds) = &self.config.credentials {
            options = options.user_and_password(creds.username.clone(), creds.password.clone());
        }
        if self.config.security == TransportSecurity::Tls {
            options = options.require_tls(true);
            if let Some(ca) = &self.config.ca_path {
                options = options.add_root_certificates(ca.clone());
            }
        }
        options
    }
}

#[async_trait]
impl BusClient for NatsBusClient {
    async fn publish_value(&self, subject: &str, payload: Value) -> Result<(), BusError> {
        let bytes = serde_json::to_vec(&payload)?;
        let url = self.config.server_url();
        let connect = self.connect_options().connect(url.as_str());
        let client = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(err)) => {
                return Err(BusError::Connect {
                    url,
                    reason: err.to_string(),
                });
            }
            Err(_) => return Err(BusError::Timeout(self.config.connect_timeout)),
        };

        let publish_error = |reason: String| BusError::Publish {
            subject: subject.to_string(),
            reason,
        };
        let sent = tokio::time::timeout(self.config.connect_timeout, async {
            client
                .publish(subject.to_string(), bytes.into())
                .await
                .map_err(|err| publish_error(err.to_string()))?;
            client
                .flush()
                .await
                .map_err(|err| publish_error(err.to_string()))
        })
        .await
        .unwrap_or(Err(BusError::Timeout(self.config.connect_timeout)));

        if let Err(err) = client.drain().await {
            debug!(%subject, error = %err, "broker connection drain failed");
        }
        sent
    }
}

/// Records published messages; optionally fails every publish.
#[derive(Clone, Default)]
pub struct InMemoryBusClient {
    published: Arc<Mutex<Vec<(String, Value)>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl InMemoryBusClient {
    /// A client whose publishes all fail with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            published: Arc::default(),
            failure: Arc::new(Mutex::new(Some(reason.into()))),
        }
    }

    pub async fn take_published(&self) -> Vec<(String, Value)> {
        let mut guard = self.published.lock().await;
        std::mem::take(&mut *guard)
    }

    pub async fn published_count(&self) -> usize {
        self.published.lock().await.len()
    }
}

#[async_trait]
impl BusClient for InMemoryBusClient {
    async fn publish_value(&self, subject: &str, payload: Value) -> Result<(), BusError> {
        if let Some(reason) = self.failure.lock().await.clone() {
            return Err(BusError::Publish {
                subject: subject.to_string(),
                reason,
            });
        }
        let mut guard = self.published.lock().await;
        guard.push((subject.to_string(), payload));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Sent,
    Failed,
}

/// Outcome of one publish attempt, returned as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReport {
    pub status: PublishStatus,
    pub topic: String,
    /// The payload as published, including the injected topic field.
    pub message: Value,
    pub error: Option<String>,
}

impl PublishReport {
    pub fn is_sent(&self) -> bool {
        self.status == PublishStatus::Sent
    }
}

/// Publishes terminal commands to their device topic.
#[derive(Clone)]
pub struct DevicePublisher {
    bus: Arc<dyn BusClient>,
}

impl DevicePublisher {
    pub fn new(bus: Arc<dyn BusClient>) -> Self {
        Self { bus }
    }

    /// Sends `payload` plus the `device_topic` field to `topic`. Never fails;
    /// transport errors come back inside the report.
    pub async fn publish(&self, topic: &str, payload: &Value) -> PublishReport {
        let message = with_device_topic(payload, topic);
        let result = self.bus.publish_value(topic, message.clone()).await;
        ptb_telemetry::record_publish(result.is_ok());
        match result {
            Ok(()) => {
                debug!(%topic, "terminal command published");
                PublishReport {
                    status: PublishStatus::Sent,
                    topic: topic.to_string(),
                    message,
                    error: None,
                }
            }
            Err(err) => {
                warn!(%topic, error = %err, "terminal command publish failed");
                PublishReport {
                    status: PublishStatus::Failed,
                    topic: topic.to_string(),
                    message,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

/// Copies `payload` and adds the destination topic. Non-object payloads are
/// wrapped under `payload`.
pub fn with_device_topic(payload: &Value, topic: &str) -> Value {
    let mut object = match payload {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".into(), other.clone());
            map
        }
    };
    object.insert(DEVICE_TOPIC_FIELD.into(), Value::String(topic.to_string()));
    Value::Object(object)
}
