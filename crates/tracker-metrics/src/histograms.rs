use metrics::{describe_histogram, histogram};
use std::time::Duration;

/// Initialize histogram descriptions
pub fn init() {
    describe_histogram!(
        "tracker_ws_request_duration_seconds",
        "Round trip of a correlated websocket request"
    );
    describe_histogram!(
        "tracker_snapshot_duration_seconds",
        "Time to assemble a token snapshot"
    );
    describe_histogram!(
        "tracker_rpc_request_duration_seconds",
        "Time for HTTP RPC requests"
    );
}

pub fn ws_request_duration(method: &str, duration: Duration) {
    histogram!("tracker_ws_request_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}

pub fn snapshot_duration(duration: Duration) {
    histogram!("tracker_snapshot_duration_seconds").record(duration.as_secs_f64());
}

pub fn rpc_request_duration(method: &str, duration: Duration) {
    histogram!("tracker_rpc_request_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}
