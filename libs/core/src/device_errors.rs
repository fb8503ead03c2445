use serde_json::{Value, json};
use tracing::{error, info};

use crate::journal::{DeviceErrorEntry, SharedExchangeLog};

pub const LOGGED_MESSAGE: &str = "Error logged successfully";

/// Persists free-form error reports sent by terminals.
#[derive(Clone)]
pub struct DeviceErrorReporter {
    journal: SharedExchangeLog,
}

impl DeviceErrorReporter {
    pub fn new(journal: SharedExchangeLog) -> Self {
        Self { journal }
    }

    /// String reports are stored verbatim; anything else as its JSON text.
    /// Always answers with a JSON body, store failures included.
    pub async fn report(&self, report: Value) -> Value {
        let message = match report {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let entry = DeviceErrorEntry::new(message);
        let name = entry.name.clone();
        match self.journal.record_device_error(entry).await {
            Ok(()) => {
                info!(%name, "terminal error report stored");
                json!({ "message": LOGGED_MESSAGE, "name": name })
            }
            Err(err) => {
                error!(error = %err, "terminal error report could not be stored");
                json!({ "status": "error", "message": format!("{err:#}") })
            }
        }
    }
}
