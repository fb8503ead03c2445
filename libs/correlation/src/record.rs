use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hash fields held by a correlation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Status,
    CreatedAt,
    InputResponse,
    OutputResponse,
    Response,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Status,
        Field::CreatedAt,
        Field::InputResponse,
        Field::OutputResponse,
        Field::Response,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Status => "status",
            Field::CreatedAt => "created_at",
            Field::InputResponse => "input_response",
            Field::OutputResponse => "output_response",
            Field::Response => "response",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| format!("unknown correlation field `{value}`"))
    }
}

/// Lifecycle state stored in the `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStatus {
    Pending,
    Answered,
}

impl CorrelationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationStatus::Pending => "pending",
            CorrelationStatus::Answered => "answered",
        }
    }
}

impl Display for CorrelationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrelationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(CorrelationStatus::Pending),
            "answered" => Ok(CorrelationStatus::Answered),
            other => Err(format!("unknown correlation status `{other}`")),
        }
    }
}
