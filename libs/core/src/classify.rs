use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which the numeric classification is attached to returned replies.
pub const FINAL_STATUS_FIELD: &str = "final_Status";

/// Status token written to the exchange log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Approved,
    Declined,
    Timeout,
    Disabled,
    Failed,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Approved => "Approved",
            Classification::Declined => "Declined",
            Classification::Timeout => "Timeout",
            Classification::Disabled => "Disabled",
            Classification::Failed => "Failed",
        }
    }

    /// 1 for approved, 0 for declined; other tokens have no numeric form.
    pub fn numeric(&self) -> Option<u8> {
        match self {
            Classification::Approved => Some(1),
            Classification::Declined => Some(0),
            _ => None,
        }
    }
}

impl Display for Classification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approved when the serialized reply contains `approved` in any case,
/// anywhere (keys, values, nested strings). Declined otherwise.
pub fn classify(reply: &Value) -> Classification {
    if reply.to_string().to_lowercase().contains("approved") {
        Classification::Approved
    } else {
        Classification::Declined
    }
}

/// Attaches [`FINAL_STATUS_FIELD`] to the reply. Non-object replies are
/// wrapped under `response`.
pub fn with_final_status(reply: Value, classification: Classification) -> Value {
    let numeric = classification.numeric().unwrap_or(0);
    let mut object = match reply {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("response".into(), other);
            map
        }
    };
    object.insert(FINAL_STATUS_FIELD.into(), Value::from(numeric));
    Value::Object(object)
}
