//! Multiplexed JSON-RPC over websocket: one socket, correlated requests and
//! broadcast notifications.

mod channel;
mod connection;
mod correlation;
mod fanout;
pub mod messages;
mod supervisor;

pub use channel::{ConnectionState, LiveSubscription, SubscriptionChannel};
pub use connection::{Connection, DisconnectReason};
pub use correlation::{CorrelationTable, Waiter};
pub use fanout::{BroadcastReport, FanoutRegistry, Listener};
pub use messages::{InboundMessage, LogsUpdate, Notification, RpcRequest, RpcResponse};
pub use supervisor::{Backoff, Supervisor};

#[cfg(any(test, feature = "test-util"))]
pub use channel::test_server;
