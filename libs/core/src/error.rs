use thiserror::Error;

/// Failures that stop an exchange before it reaches a terminal outcome.
///
/// Terminal results (reply, timeout, disabled device, publish failure,
/// expired callback) are not errors; see [`SubmitOutcome`](crate::SubmitOutcome)
/// and [`CallbackOutcome`](crate::CallbackOutcome).
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("No device mapping found for user {0}")]
    DestinationNotFound(String),
    #[error("device directory unavailable: {0:#}")]
    Directory(anyhow::Error),
    #[error("correlation store unavailable: {0:#}")]
    Store(anyhow::Error),
}

impl ExchangeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ExchangeError::InvalidInput(message.into())
    }
}
