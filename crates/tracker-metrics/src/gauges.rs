use metrics::{describe_gauge, gauge};

/// Initialize gauge descriptions
pub fn init() {
    describe_gauge!(
        "tracker_listeners",
        "Listener channels registered for notifications"
    );
    describe_gauge!(
        "tracker_pending_requests",
        "Requests awaiting a correlated response"
    );
    describe_gauge!(
        "tracker_live_subscriptions",
        "Confirmed live wallet subscriptions"
    );
    describe_gauge!(
        "tracker_connection_state",
        "0 = disconnected, 1 = connected, 2 = reconnecting"
    );
}

pub fn set_listeners(count: usize) {
    gauge!("tracker_listeners").set(count as f64);
}

pub fn set_pending_requests(count: usize) {
    gauge!("tracker_pending_requests").set(count as f64);
}

pub fn set_live_subscriptions(count: usize) {
    gauge!("tracker_live_subscriptions").set(count as f64);
}

pub fn set_connection_state(state: u8) {
    gauge!("tracker_connection_state").set(state as f64);
}
