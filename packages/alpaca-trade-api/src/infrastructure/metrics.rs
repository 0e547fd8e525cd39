//! Metrics
//!
//! Counters and gauges recorded through the `metrics` facade. The library
//! installs no recorder; an embedding application that installs one (for
//! example a Prometheus exporter) picks these up automatically.
//!
//! # Metrics
//!
//! | Name | Kind | Labels |
//! |------|------|--------|
//! | `alpaca_api_requests_total` | counter | `method`, `status` |
//! | `alpaca_api_retries_total` | counter | `method` |
//! | `alpaca_stream_messages_total` | counter | `channel` |
//! | `alpaca_stream_reconnects_total` | counter | |
//! | `alpaca_stream_state` | gauge | |

use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::infrastructure::stream::ConnectionState;

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        "alpaca_api_requests_total",
        "Total REST requests by method and HTTP status"
    );
    describe_counter!(
        "alpaca_api_retries_total",
        "Total REST retries after rate limiting"
    );
    describe_counter!(
        "alpaca_stream_messages_total",
        "Total streaming messages dispatched by channel"
    );
    describe_counter!(
        "alpaca_stream_reconnects_total",
        "Total streaming reconnect attempts"
    );
    describe_gauge!(
        "alpaca_stream_state",
        "Current streaming connection state (0 = disconnected .. 5 = closed)"
    );
}

/// Record one completed HTTP attempt.
pub fn record_request(method: &str, status: u16) {
    counter!(
        "alpaca_api_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a rate-limit retry.
pub fn record_retry(method: &str) {
    counter!("alpaca_api_retries_total", "method" => method.to_string()).increment(1);
}

/// Record a dispatched streaming message.
///
/// Only the channel prefix is used as a label to keep cardinality bounded.
pub fn record_stream_message(channel: &str) {
    let prefix = channel.split('.').next().unwrap_or(channel);
    counter!("alpaca_stream_messages_total", "channel" => prefix.to_string()).increment(1);
}

/// Record a reconnect attempt.
pub fn record_reconnect() {
    counter!("alpaca_stream_reconnects_total").increment(1);
}

/// Publish the connection state.
pub fn set_stream_state(state: ConnectionState) {
    gauge!("alpaca_stream_state").set(f64::from(state.as_index()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        describe_metrics();
        record_request("GET", 200);
        record_retry("GET");
        record_stream_message("T.AAPL");
        record_reconnect();
        set_stream_state(ConnectionState::Ready);
    }
}
