use metrics::{counter, describe_counter};

/// Initialize counter descriptions
pub fn init() {
    describe_counter!(
        "tracker_notifications_received_total",
        "Total number of websocket notifications received"
    );
    describe_counter!(
        "tracker_notifications_dropped_total",
        "Notifications dropped because a listener buffer was full"
    );
    describe_counter!(
        "tracker_subscriptions_confirmed_total",
        "Subscribe requests confirmed by the remote endpoint"
    );
    describe_counter!(
        "tracker_subscriptions_failed_total",
        "Subscribe requests that were rejected, timed out or cancelled"
    );
    describe_counter!(
        "tracker_reconnects_total",
        "Successful websocket reconnections"
    );
    describe_counter!(
        "tracker_swaps_detected_total",
        "Swap events inferred from tracked wallet transactions"
    );
    describe_counter!(
        "tracker_token_snapshots_total",
        "Token snapshots served"
    );
    describe_counter!(
        "tracker_persistence_failures_total",
        "Best-effort token persistence failures"
    );
    describe_counter!(
        "tracker_errors_total",
        "Total number of errors"
    );
}

pub fn notifications_received(count: u64) {
    counter!("tracker_notifications_received_total").increment(count);
}

pub fn notifications_dropped(count: u64) {
    counter!("tracker_notifications_dropped_total").increment(count);
}

pub fn subscriptions_confirmed(count: u64) {
    counter!("tracker_subscriptions_confirmed_total").increment(count);
}

pub fn subscriptions_failed(count: u64, reason: &str) {
    counter!("tracker_subscriptions_failed_total", "reason" => reason.to_string()).increment(count);
}

pub fn reconnects(count: u64) {
    counter!("tracker_reconnects_total").increment(count);
}

pub fn swaps_detected(count: u64) {
    counter!("tracker_swaps_detected_total").increment(count);
}

pub fn token_snapshots(count: u64) {
    counter!("tracker_token_snapshots_total").increment(count);
}

pub fn persistence_failures(count: u64) {
    counter!("tracker_persistence_failures_total").increment(count);
}

/// Increment errors counter
pub fn errors(count: u64, error_type: &str) {
    counter!("tracker_errors_total", "type" => error_type.to_string()).increment(count);
}
