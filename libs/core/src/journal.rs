//! Durable record of finished exchanges and device error reports.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::Mutex;

use crate::Classification;

pub const DEVICE_ERROR_TITLE: &str = "Terminal Error";

/// Which side of the exchange produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Written once by the coordinator when the exchange reaches its terminal outcome.
    Exchange,
    /// Written by the receiver for every accepted device callback.
    Callback,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Exchange => "exchange",
            LogKind::Callback => "callback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeLogEntry {
    pub id: String,
    pub kind: LogKind,
    pub uuid: String,
    pub input_response: Option<String>,
    pub output_response: Option<String>,
    pub final_response: String,
    pub status: Classification,
    pub recorded_at: String,
}

impl ExchangeLogEntry {
    pub fn new(
        kind: LogKind,
        uuid: &str,
        input: Option<String>,
        output: Option<String>,
        final_response: &Value,
        status: Classification,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            uuid: uuid.to_string(),
            input_response: input,
            output_response: output,
            final_response: final_response.to_string(),
            status,
            recorded_at: now_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceErrorEntry {
    pub name: String,
    pub title: String,
    pub message: String,
    pub recorded_at: String,
}

impl DeviceErrorEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: uuid::Uuid::new_v4().to_string(),
            title: DEVICE_ERROR_TITLE.to_string(),
            message: message.into(),
            recorded_at: now_rfc3339(),
        }
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Sink for the durable exchange log.
#[async_trait]
pub trait ExchangeLog: Send + Sync {
    async fn record_exchange(&self, entry: ExchangeLogEntry) -> Result<()>;
    async fn record_device_error(&self, entry: DeviceErrorEntry) -> Result<()>;
}

pub type SharedExchangeLog = Arc<dyn ExchangeLog>;

/// Keeps entries in memory. Writes can be made to fail to exercise the
/// best-effort logging paths.
#[derive(Default)]
pub struct MemoryExchangeLog {
    exchanges: Mutex<Vec<ExchangeLogEntry>>,
    device_errors: Mutex<Vec<DeviceErrorEntry>>,
    reject_writes: AtomicBool,
}

impl MemoryExchangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<ExchangeLogEntry> {
        self.exchanges.lock().await.clone()
    }

    pub async fn entries_for(&self, uuid: &str, kind: LogKind) -> Vec<ExchangeLogEntry> {
        self.exchanges
            .lock()
            .await
            .iter()
            .filter(|entry| entry.uuid == uuid && entry.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn device_errors(&self) -> Vec<DeviceErrorEntry> {
        self.device_errors.lock().await.clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            bail!("exchange log is rejecting writes");
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeLog for MemoryExchangeLog {
    async fn record_exchange(&self, entry: ExchangeLogEntry) -> Result<()> {
        self.check_writable()?;
        self.exchanges.lock().await.push(entry);
        Ok(())
    }

    async fn record_device_error(&self, entry: DeviceErrorEntry) -> Result<()> {
        self.check_writable()?;
        self.device_errors.lock().await.push(entry);
        Ok(())
    }
}
