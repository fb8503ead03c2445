//! Request/correlate/await/resolve core for payment terminal exchanges.
//!
//! [`ExchangeCoordinator`] publishes a command to the terminal mapped to the
//! requesting participant, then polls the correlation record until the
//! [`CallbackReceiver`] stores the device reply or the budget runs out. Each
//! exchange yields exactly one [`SubmitOutcome`] and one durable log entry.

mod classify;
mod config;
mod coordinator;
mod device_errors;
mod directory;
mod error;
mod journal;
mod receiver;
#[cfg(feature = "store_sqlite")]
mod sqlite_log;

use serde_json::Value;

pub use classify::{Classification, FINAL_STATUS_FIELD, classify, with_final_status};
pub use config::{DEFAULT_EXCHANGE_TIMEOUT, DEFAULT_POLL_INTERVAL, ExchangeConfig};
pub use coordinator::{ExchangeCoordinator, SubmitOutcome, TIMEOUT_MESSAGE};
pub use device_errors::{DeviceErrorReporter, LOGGED_MESSAGE};
pub use directory::{DeviceDirectory, DeviceRoute, SharedDirectory, StaticDirectory};
pub use error::ExchangeError;
pub use journal::{
    DEVICE_ERROR_TITLE, DeviceErrorEntry, ExchangeLog, ExchangeLogEntry, LogKind,
    MemoryExchangeLog, SharedExchangeLog,
};
pub use receiver::{CallbackOutcome, CallbackReceiver, EXPIRED_MESSAGE};
#[cfg(feature = "store_sqlite")]
pub use sqlite_log::SqliteExchangeLog;

/// Correlation id carried under `uuid`: a non-empty string or a number.
pub fn correlation_id(payload: &Value) -> Option<String> {
    match payload.get("uuid")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Participant carried under `user`, trimmed.
pub(crate) fn participant_id(payload: &Value) -> Option<String> {
    payload
        .get("user")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(str::to_string)
}
