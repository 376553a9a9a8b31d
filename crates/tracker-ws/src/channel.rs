use crate::connection::Connection;
use crate::correlation::CorrelationTable;
use crate::fanout::{FanoutRegistry, Listener};
use crate::messages::{Notification, RpcRequest, RpcResponse};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracker_core::{Result, TrackerError, WalletFeed, WsConfig};
use tracker_metrics::{counters, gauges, histograms};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    fn gauge_value(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connected => 1,
            ConnectionState::Reconnecting => 2,
        }
    }
}

/// A wallet subscription confirmed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSubscription {
    pub wallet: String,
    pub request_id: u64,
    pub subscription_id: u64,
}

/// Wallet log subscriptions multiplexed over one websocket.
///
/// Requests get ids from a monotonic counter and are matched to responses
/// through the correlation table. Notifications reach every registered
/// listener. The wallet and subscription side tables only ever hold
/// confirmed subscriptions.
pub struct SubscriptionChannel {
    config: WsConfig,
    pending: CorrelationTable,
    fanout: Arc<FanoutRegistry<Notification>>,
    connection: RwLock<Option<Arc<Connection>>>,
    next_request_id: AtomicU64,
    by_wallet: DashMap<String, LiveSubscription>,
    by_subscription: DashMap<u64, String>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl SubscriptionChannel {
    pub fn new(config: WsConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            pending: CorrelationTable::new(),
            fanout: Arc::new(FanoutRegistry::new()),
            connection: RwLock::new(None),
            next_request_id: AtomicU64::new(1),
            by_wallet: DashMap::new(),
            by_subscription: DashMap::new(),
            state,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Open a new socket, replacing any previous one
    pub async fn connect(&self) -> Result<Arc<Connection>> {
        if self.shutdown.is_cancelled() {
            return Err(TrackerError::Cancelled("channel is closed".to_string()));
        }
        let connection =
            Connection::connect(&self.config, self.pending.clone(), self.fanout.clone()).await?;
        if let Some(previous) = self.connection.write().replace(connection.clone()) {
            previous.close();
        }
        self.set_state(ConnectionState::Connected);
        Ok(connection)
    }

    /// The current socket, if it is still open
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .read()
            .as_ref()
            .filter(|c| !c.is_closed())
            .cloned()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        gauges::set_connection_state(state.gauge_value());
        self.state.send_replace(state);
    }

    /// Forget the dead socket after the read loop has stopped
    pub(crate) fn mark_disconnected(&self) {
        self.connection.write().take();
        self.set_state(ConnectionState::Disconnected);
    }

    fn next_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for its correlated response, bounded by the
    /// request timeout and the channel's lifetime
    async fn request(&self, method: &'static str, params: Value) -> Result<(u64, Value)> {
        let connection = self.connection().ok_or(TrackerError::NotConnected)?;
        let id = self.next_id();
        let waiter = self.pending.register(id)?;
        gauges::set_pending_requests(self.pending.len());

        let started = Instant::now();
        let outcome = match connection.send_json(&RpcRequest::new(id, method, params)).await {
            Err(e) => Err(e),
            Ok(()) => {
                tokio::select! {
                    response = waiter.recv() => response.and_then(RpcResponse::into_result),
                    _ = tokio::time::sleep(self.config.request_timeout) => Err(TrackerError::Timeout(
                        format!("{method} request {id} after {:?}", self.config.request_timeout),
                    )),
                    _ = self.shutdown.cancelled() => {
                        Err(TrackerError::Cancelled(format!("{method} request {id}")))
                    }
                }
            }
        };

        histograms::ws_request_duration(method, started.elapsed());
        gauges::set_pending_requests(self.pending.len());
        outcome.map(|value| (id, value))
    }

    /// Subscribe to logs mentioning `wallet`; returns the server subscription id
    pub async fn subscribe(&self, wallet: &str) -> Result<u64> {
        let request = RpcRequest::logs_subscribe(0, wallet, &self.config.commitment);
        let result = self
            .request(request.method, request.params)
            .await
            .and_then(|(request_id, value)| {
                value
                    .as_u64()
                    .map(|subscription_id| (request_id, subscription_id))
                    .ok_or_else(|| {
                        TrackerError::Decode(format!("subscription id is not an integer: {value}"))
                    })
            });

        match result {
            Ok((request_id, subscription_id)) => {
                let live = LiveSubscription {
                    wallet: wallet.to_string(),
                    request_id,
                    subscription_id,
                };
                if let Some(previous) = self.by_wallet.insert(wallet.to_string(), live) {
                    if previous.subscription_id != subscription_id {
                        self.by_subscription.remove(&previous.subscription_id);
                    }
                }
                self.by_subscription
                    .insert(subscription_id, wallet.to_string());

                counters::subscriptions_confirmed(1);
                gauges::set_live_subscriptions(self.by_wallet.len());
                info!(wallet, subscription_id, request_id, "Subscribed to wallet logs");
                Ok(subscription_id)
            }
            Err(e) => {
                counters::subscriptions_failed(1, e.kind());
                warn!(wallet, error = %e, "Wallet subscription failed");
                Err(e)
            }
        }
    }

    /// Drop the wallet's subscription; returns the server acknowledgement
    pub async fn unsubscribe(&self, wallet: &str) -> Result<bool> {
        let subscription_id = self
            .by_wallet
            .get(wallet)
            .map(|live| live.subscription_id)
            .ok_or_else(|| TrackerError::NotSubscribed(wallet.to_string()))?;

        let request = RpcRequest::logs_unsubscribe(0, subscription_id);
        let (_, value) = self.request(request.method, request.params).await?;
        let acknowledged = value
            .as_bool()
            .ok_or_else(|| TrackerError::Decode(format!("unsubscribe result is not a bool: {value}")))?;

        // The server no longer routes for this id either way
        self.forget(wallet);
        info!(wallet, subscription_id, acknowledged, "Unsubscribed from wallet logs");
        Ok(acknowledged)
    }

    fn forget(&self, wallet: &str) {
        if let Some((_, live)) = self.by_wallet.remove(wallet) {
            self.by_subscription.remove(&live.subscription_id);
        }
        gauges::set_live_subscriptions(self.by_wallet.len());
    }

    /// Register a notification listener
    pub fn listen(&self) -> Listener<Notification> {
        let listener = self.fanout.register(self.config.listener_capacity);
        gauges::set_listeners(self.fanout.len());
        debug!(listener = listener.id(), "Listener registered");
        listener
    }

    pub fn listener_count(&self) -> usize {
        self.fanout.len()
    }

    pub fn stop_listening(&self, listener_id: u64) -> bool {
        let removed = self.fanout.remove(listener_id);
        gauges::set_listeners(self.fanout.len());
        removed
    }

    pub fn wallet_for(&self, subscription_id: u64) -> Option<String> {
        self.by_subscription
            .get(&subscription_id)
            .map(|wallet| wallet.clone())
    }

    pub fn is_subscribed(&self, wallet: &str) -> bool {
        self.by_wallet.contains_key(wallet)
    }

    pub fn live_subscriptions(&self) -> Vec<LiveSubscription> {
        self.by_wallet.iter().map(|e| e.value().clone()).collect()
    }

    /// Re-issue every known subscription on the current socket. Server ids from
    /// the previous socket are discarded first. Returns how many succeeded.
    pub async fn resubscribe_all(&self) -> usize {
        let wallets: Vec<String> = self.by_wallet.iter().map(|e| e.key().clone()).collect();
        self.clear_subscriptions();

        let mut restored = 0;
        for wallet in &wallets {
            match self.subscribe(wallet).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(wallet = %wallet, error = %e, "Failed to restore subscription"),
            }
        }
        info!(restored, total = wallets.len(), "Resubscribed after reconnect");
        restored
    }

    /// Drop all subscription bookkeeping without contacting the server
    pub fn clear_subscriptions(&self) {
        self.by_wallet.clear();
        self.by_subscription.clear();
        gauges::set_live_subscriptions(0);
    }

    /// Close the socket, every listener and the live subscriptions. The
    /// channel stays usable: a later `connect` starts from scratch.
    pub fn disconnect(&self) {
        if let Some(connection) = self.connection.write().take() {
            connection.close();
        }
        self.fanout.clear();
        gauges::set_listeners(0);
        self.clear_subscriptions();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Disconnect for good, cancelling in-flight requests. `connect` fails
    /// with `Cancelled` afterwards.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.disconnect();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[async_trait]
impl WalletFeed for SubscriptionChannel {
    async fn subscribe(&self, wallet: &str) -> Result<u64> {
        SubscriptionChannel::subscribe(self, wallet).await
    }

    async fn unsubscribe(&self, wallet: &str) -> Result<bool> {
        SubscriptionChannel::unsubscribe(self, wallet).await
    }

    fn is_subscribed(&self, wallet: &str) -> bool {
        SubscriptionChannel::is_subscribed(self, wallet)
    }
}

/// In-process websocket server for tests, here and in dependent crates
#[cfg(any(test, feature = "test-util"))]
pub mod test_server {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::future::Future;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::protocol::Message;
    use tokio_tungstenite::WebSocketStream;

    pub type ServerSocket = WebSocketStream<TcpStream>;

    /// Accept `connections` sockets in order, handing each to `handler` with its index
    pub async fn spawn<F, Fut>(connections: usize, handler: F) -> String
    where
        F: Fn(usize, ServerSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for index in 0..connections {
                let (stream, _) = listener.accept().await.unwrap();
                let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
                handler(index, socket).await;
            }
        });
        format!("ws://{addr}")
    }

    pub async fn next_request(socket: &mut ServerSocket) -> Option<Value> {
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).ok();
            }
        }
        None
    }

    pub async fn reply(socket: &mut ServerSocket, id: &Value, result: Value) {
        let frame = json!({ "jsonrpc": "2.0", "id": id, "result": result });
        socket.send(Message::Text(frame.to_string().into())).await.unwrap();
    }

    pub async fn notify(socket: &mut ServerSocket, subscription: u64, signature: &str) {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "subscription": subscription,
                "result": {
                    "context": { "slot": 100 },
                    "value": { "signature": signature, "err": null, "logs": ["Program log: Instruction: Swap"] }
                }
            }
        });
        socket.send(Message::Text(frame.to_string().into())).await.unwrap();
    }

    /// Keep the socket open until the client goes away
    pub async fn drain(socket: &mut ServerSocket) {
        while let Some(Ok(_)) = socket.next().await {}
    }
}

#[cfg(test)]
mod tests {
    use super::test_server::{self, drain, next_request, notify, reply};
    use super::*;
    use futures_util::SinkExt;
    use serde_json::json;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::protocol::Message;

    const WALLET: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

    fn config(url: String) -> WsConfig {
        let mut config = WsConfig::with_url(url);
        config.request_timeout = Duration::from_millis(500);
        config
    }

    #[tokio::test]
    async fn test_request_without_connection() {
        let channel = SubscriptionChannel::new(WsConfig::with_url("ws://127.0.0.1:1"));
        assert!(matches!(
            channel.subscribe(WALLET).await,
            Err(TrackerError::NotConnected)
        ));
        assert!(matches!(
            channel.unsubscribe(WALLET).await,
            Err(TrackerError::NotSubscribed(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_and_fan_out_notifications() {
        let url = test_server::spawn(1, |_, mut socket| async move {
            let request = next_request(&mut socket).await.unwrap();
            assert_eq!(request["method"], "logsSubscribe");
            assert_eq!(request["params"][0]["mentions"][0], WALLET);
            reply(&mut socket, &request["id"], json!(42)).await;
            notify(&mut socket, 42, "sig-1").await;
            drain(&mut socket).await;
        })
        .await;

        let channel = SubscriptionChannel::new(config(url));
        let mut first = channel.listen();
        let mut second = channel.listen();
        channel.connect().await.unwrap();
        assert_eq!(channel.state(), ConnectionState::Connected);

        let subscription_id = channel.subscribe(WALLET).await.unwrap();
        assert_eq!(subscription_id, 42);
        assert!(channel.is_subscribed(WALLET));
        assert_eq!(channel.wallet_for(42).as_deref(), Some(WALLET));

        for listener in [&mut first, &mut second] {
            let notification = tokio::time::timeout(Duration::from_secs(2), listener.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(notification.subscription, 42);
            assert_eq!(notification.logs().unwrap().signature, "sig-1");
        }

        channel.close();
        assert_eq!(first.recv().await, None);
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced() {
        let url = test_server::spawn(1, |_, mut socket| async move {
            let request = next_request(&mut socket).await.unwrap();
            let frame = json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": { "code": -32602, "message": "Invalid param: Invalid pubkey" }
            });
            socket.send(Message::Text(frame.to_string().into())).await.unwrap();
            drain(&mut socket).await;
        })
        .await;

        let channel = SubscriptionChannel::new(config(url));
        channel.connect().await.unwrap();
        match channel.subscribe("not-a-wallet").await {
            Err(TrackerError::Remote { code, .. }) => assert_eq!(code, -32602),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!channel.is_subscribed("not-a-wallet"));
        channel.close();
    }

    #[tokio::test]
    async fn test_request_times_out_and_cleans_up() {
        let url = test_server::spawn(1, |_, mut socket| async move {
            drain(&mut socket).await;
        })
        .await;

        let channel = SubscriptionChannel::new(config(url));
        channel.connect().await.unwrap();
        assert!(matches!(
            channel.subscribe(WALLET).await,
            Err(TrackerError::Timeout(_))
        ));
        assert!(channel.pending.is_empty());
        channel.close();
    }

    #[tokio::test]
    async fn test_unsubscribe_forgets_wallet() {
        let url = test_server::spawn(1, |_, mut socket| async move {
            let subscribe = next_request(&mut socket).await.unwrap();
            reply(&mut socket, &subscribe["id"], json!(7)).await;
            let unsubscribe = next_request(&mut socket).await.unwrap();
            assert_eq!(unsubscribe["method"], "logsUnsubscribe");
            assert_eq!(unsubscribe["params"], json!([7]));
            reply(&mut socket, &unsubscribe["id"], json!(true)).await;
            drain(&mut socket).await;
        })
        .await;

        let channel = SubscriptionChannel::new(config(url));
        channel.connect().await.unwrap();
        channel.subscribe(WALLET).await.unwrap();
        assert!(channel.unsubscribe(WALLET).await.unwrap());
        assert!(!channel.is_subscribed(WALLET));
        assert_eq!(channel.wallet_for(7), None);
        channel.close();
    }

    #[tokio::test]
    async fn test_connection_loss_fails_pending_requests() {
        let url = test_server::spawn(1, |_, mut socket| async move {
            let _ = next_request(&mut socket).await;
            socket.close(None).await.ok();
        })
        .await;

        let channel = SubscriptionChannel::new(config(url));
        let connection = channel.connect().await.unwrap();
        assert!(matches!(
            channel.subscribe(WALLET).await,
            Err(TrackerError::WebSocketDisconnected)
        ));

        let reason = tokio::time::timeout(Duration::from_secs(2), connection.wait_closed())
            .await
            .unwrap();
        assert_ne!(reason, crate::DisconnectReason::Closed);
        assert!(channel.connection().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_allows_reconnect_but_close_is_final() {
        let url = test_server::spawn(2, |_, mut socket| async move {
            let request = next_request(&mut socket).await.unwrap();
            reply(&mut socket, &request["id"], json!(5)).await;
            drain(&mut socket).await;
        })
        .await;

        let channel = SubscriptionChannel::new(config(url));
        let mut listener = channel.listen();
        channel.connect().await.unwrap();
        channel.subscribe(WALLET).await.unwrap();

        channel.disconnect();
        assert_eq!(listener.recv().await, None);
        assert!(!channel.is_subscribed(WALLET));
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert!(!channel.is_shut_down());

        channel.connect().await.unwrap();
        assert_eq!(channel.subscribe(WALLET).await.unwrap(), 5);

        channel.close();
        assert!(matches!(
            channel.connect().await,
            Err(TrackerError::Cancelled(_))
        ));
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_request() {
        let url = test_server::spawn(1, |_, mut socket| async move {
            drain(&mut socket).await;
        })
        .await;

        let mut cfg = config(url);
        cfg.request_timeout = Duration::from_secs(10);
        let channel = Arc::new(SubscriptionChannel::new(cfg));
        channel.connect().await.unwrap();

        let pending = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.subscribe(WALLET).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        channel.close();

        let result = pending.await.unwrap();
        assert!(matches!(
            result,
            Err(TrackerError::Cancelled(_)) | Err(TrackerError::WebSocketDisconnected)
        ));
    }
}
