use metrics::counter;

pub const EXCHANGE_COUNTER: &str = "terminal_exchange_total";
pub const CALLBACK_COUNTER: &str = "terminal_callback_total";
pub const PUBLISH_COUNTER: &str = "terminal_publish_total";

/// Counts a finished exchange by its status token (`Approved`, `Timeout`, ...).
pub fn record_exchange_outcome(outcome: &'static str) {
    counter!(EXCHANGE_COUNTER, "outcome" => outcome).increment(1);
}

/// Counts a device callback as `accepted` or `expired`.
pub fn record_callback(outcome: &'static str) {
    counter!(CALLBACK_COUNTER, "outcome" => outcome).increment(1);
}

pub fn record_publish(sent: bool) {
    let status = if sent { "sent" } else { "failed" };
    counter!(PUBLISH_COUNTER, "status" => status).increment(1);
}
