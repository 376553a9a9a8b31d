use crate::correlation::CorrelationTable;
use crate::fanout::FanoutRegistry;
use crate::messages::{InboundMessage, Notification};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tracker_core::config::redact;
use tracker_core::{Result, TrackerError, WsConfig};
use tracker_metrics::counters;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Why a connection's read loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed locally
    Closed,
    /// Close frame from the server
    RemoteClosed(Option<String>),
    ReadError(String),
    WriteError(String),
    /// No pong within the deadline
    LivenessTimeout(Duration),
    StreamEnded,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed => write!(f, "closed locally"),
            DisconnectReason::RemoteClosed(Some(reason)) => write!(f, "server closed: {reason}"),
            DisconnectReason::RemoteClosed(None) => write!(f, "server closed"),
            DisconnectReason::ReadError(e) => write!(f, "read error: {e}"),
            DisconnectReason::WriteError(e) => write!(f, "write error: {e}"),
            DisconnectReason::LivenessTimeout(after) => write!(f, "no pong after {after:?}"),
            DisconnectReason::StreamEnded => write!(f, "stream ended"),
        }
    }
}

/// One live websocket.
///
/// Writes are serialized behind an async mutex. A single spawned read loop
/// routes responses into the correlation table and notifications into the
/// fan-out registry; it also owns the keepalive.
pub struct Connection {
    writer: tokio::sync::Mutex<WsSink>,
    write_timeout: Duration,
    pending: CorrelationTable,
    shutdown: CancellationToken,
    terminated: CancellationToken,
    reason: parking_lot::Mutex<Option<DisconnectReason>>,
}

impl Connection {
    pub async fn connect(
        config: &WsConfig,
        pending: CorrelationTable,
        fanout: Arc<FanoutRegistry<Notification>>,
    ) -> Result<Arc<Self>> {
        info!(url = %redact(&config.url), "Connecting to websocket endpoint");

        let (stream, _response) =
            tokio::time::timeout(config.request_timeout, connect_async(config.url.as_str()))
                .await
                .map_err(|_| TrackerError::Timeout("websocket handshake".to_string()))?
                .map_err(|e| TrackerError::WebSocket(format!("connect failed: {e}")))?;

        let (sink, source) = stream.split();
        let connection = Arc::new(Self {
            writer: tokio::sync::Mutex::new(sink),
            write_timeout: config.write_timeout,
            pending,
            shutdown: CancellationToken::new(),
            terminated: CancellationToken::new(),
            reason: parking_lot::Mutex::new(None),
        });

        tokio::spawn(read_loop(
            connection.clone(),
            source,
            fanout,
            config.ping_interval,
            config.pong_timeout,
        ));

        info!("Websocket connected");
        Ok(connection)
    }

    /// Serialize and send one text frame
    pub async fn send_json<T: Serialize>(&self, message: &T) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        self.send(Message::Text(payload.into())).await
    }

    async fn send(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(TrackerError::WebSocketDisconnected);
        }
        let mut writer = self.writer.lock().await;
        match tokio::time::timeout(self.write_timeout, writer.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TrackerError::WebSocket(format!("write failed: {e}"))),
            Err(_) => Err(TrackerError::Timeout(format!(
                "websocket write after {:?}",
                self.write_timeout
            ))),
        }
    }

    /// Stop the read loop and close the socket. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.terminated.is_cancelled()
    }

    /// Resolves once the read loop has exited and every waiter was failed
    pub async fn wait_closed(&self) -> DisconnectReason {
        self.terminated.cancelled().await;
        self.reason
            .lock()
            .clone()
            .unwrap_or(DisconnectReason::Closed)
    }

    pub fn pending(&self) -> &CorrelationTable {
        &self.pending
    }
}

async fn read_loop(
    connection: Arc<Connection>,
    mut source: WsSource,
    fanout: Arc<FanoutRegistry<Notification>>,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let mut idle_deadline = Instant::now() + ping_interval;
    let mut pong_deadline = Instant::now() + FAR_FUTURE;
    let mut awaiting_pong = false;

    let reason = loop {
        let idle_sleep = tokio::time::sleep_until(idle_deadline);
        tokio::pin!(idle_sleep);
        let pong_sleep = tokio::time::sleep_until(pong_deadline);
        tokio::pin!(pong_sleep);

        tokio::select! {
            biased;

            _ = connection.shutdown.cancelled() => break DisconnectReason::Closed,

            _ = &mut pong_sleep, if awaiting_pong => {
                warn!(timeout = ?pong_timeout, "Pong timeout, server unresponsive");
                break DisconnectReason::LivenessTimeout(pong_timeout);
            }

            _ = &mut idle_sleep, if !awaiting_pong => {
                if let Err(e) = connection.send(Message::Ping(Default::default())).await {
                    warn!(error = %e, "Keepalive ping failed");
                    break DisconnectReason::WriteError(e.to_string());
                }
                trace!("Keepalive ping sent");
                awaiting_pong = true;
                pong_deadline = Instant::now() + pong_timeout;
                idle_deadline = Instant::now() + ping_interval;
            }

            frame = source.next() => {
                // Any inbound frame proves the peer is alive
                idle_deadline = Instant::now() + ping_interval;
                if awaiting_pong {
                    awaiting_pong = false;
                    pong_deadline = Instant::now() + FAR_FUTURE;
                }

                match frame {
                    Some(Ok(Message::Text(text))) => dispatch(text.as_str(), &connection.pending, &fanout),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => dispatch(text, &connection.pending, &fanout),
                        Err(_) => debug!(len = data.len(), "Ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = connection.send(Message::Pong(payload)).await {
                            break DisconnectReason::WriteError(e.to_string());
                        }
                    }
                    Some(Ok(Message::Pong(_))) => trace!("Keepalive pong received"),
                    Some(Ok(Message::Close(frame))) => {
                        break DisconnectReason::RemoteClosed(frame.map(|f| f.reason.to_string()));
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => break DisconnectReason::ReadError(e.to_string()),
                    None => break DisconnectReason::StreamEnded,
                }
            }
        }
    };

    connection.shutdown.cancel();
    let failed = connection.pending.fail_all();
    {
        let mut writer = connection.writer.lock().await;
        let _ = tokio::time::timeout(connection.write_timeout, writer.close()).await;
    }
    *connection.reason.lock() = Some(reason.clone());
    connection.terminated.cancel();

    if reason == DisconnectReason::Closed {
        info!(failed_requests = failed, "Websocket closed");
    } else {
        warn!(reason = %reason, failed_requests = failed, "Websocket connection lost");
    }
}

fn dispatch(
    text: &str,
    pending: &CorrelationTable,
    fanout: &FanoutRegistry<Notification>,
) {
    match InboundMessage::decode(text) {
        InboundMessage::Response(response) => {
            let id = response.id;
            if !pending.resolve(id, response) {
                debug!(id, "Response for a request nobody is waiting on");
            }
        }
        InboundMessage::Notification(notification) => {
            counters::notifications_received(1);
            let report = fanout.broadcast(&notification);
            if report.dropped > 0 {
                counters::notifications_dropped(report.dropped as u64);
            }
            trace!(
                subscription = notification.subscription,
                delivered = report.delivered,
                "Notification fanned out"
            );
        }
        InboundMessage::Unknown(reason) => debug!(reason = %reason, "Ignoring frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_routes_by_frame_kind() {
        let pending = CorrelationTable::new();
        let fanout = FanoutRegistry::new();
        let mut listener = fanout.register(4);
        let _waiter = pending.register(1).unwrap();

        dispatch(r#"{"jsonrpc":"2.0","result":5,"id":1}"#, &pending, &fanout);
        assert!(pending.is_empty());
        assert!(listener.try_recv().is_none());

        dispatch(
            r#"{"jsonrpc":"2.0","method":"logsNotification","params":{"result":{},"subscription":5}}"#,
            &pending,
            &fanout,
        );
        let notification = listener.try_recv().unwrap();
        assert_eq!(notification.subscription, 5);
        assert_eq!(notification.result, json!({}));

        dispatch("garbage", &pending, &fanout);
        assert!(listener.try_recv().is_none());
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::Closed.to_string(), "closed locally");
        assert_eq!(
            DisconnectReason::RemoteClosed(Some("bye".into())).to_string(),
            "server closed: bye"
        );
    }
}
