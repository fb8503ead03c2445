use std::time::Duration;

use ptb_correlation::DEFAULT_RECORD_TTL;

pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Timing knobs for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Total time the coordinator waits for a device reply.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Lifetime of the correlation record, armed when the exchange starts.
    pub record_ttl: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            record_ttl: DEFAULT_RECORD_TTL,
        }
    }
}

impl ExchangeConfig {
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(secs),
            ..Self::default()
        }
    }
}
