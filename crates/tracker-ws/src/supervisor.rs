use crate::channel::{ConnectionState, SubscriptionChannel};
use crate::connection::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracker_core::{ReconnectConfig, Result, TrackerError};
use tracker_metrics::counters;

/// Exponential delay: initial, 2x, 4x, ... capped at `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Watches the channel's socket and re-establishes it when it drops
pub struct Supervisor {
    channel: Arc<SubscriptionChannel>,
    config: ReconnectConfig,
}

impl Supervisor {
    pub fn new(channel: Arc<SubscriptionChannel>) -> Self {
        let config = channel.config().reconnect.clone();
        Self { channel, config }
    }

    /// Runs until `cancel` fires. Returns an error when the connection is lost
    /// and reconnecting is disabled or has exhausted its attempts.
    ///
    /// Either way the channel is left disconnected but not closed, so the
    /// caller may connect it again.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        loop {
            let connection = match self.channel.connection() {
                Some(connection) => connection,
                None if self.config.enabled => match self.reconnect(&cancel).await {
                    Ok(connection) => connection,
                    Err(_) if cancel.is_cancelled() => return Ok(()),
                    Err(e) => return Err(e),
                },
                None => {
                    self.channel.disconnect();
                    return Err(TrackerError::WebSocket(
                        "not connected and reconnect is disabled".to_string(),
                    ));
                }
            };

            let reason = tokio::select! {
                _ = cancel.cancelled() => {
                    self.channel.disconnect();
                    return Ok(());
                }
                reason = connection.wait_closed() => reason,
            };

            if cancel.is_cancelled() || self.channel.is_shut_down() {
                return Ok(());
            }

            warn!(reason = %reason, "Subscription socket dropped");
            if !self.config.enabled {
                self.channel.disconnect();
                return Err(TrackerError::WebSocket(format!("connection lost: {reason}")));
            }
            self.channel.mark_disconnected();
        }
    }

    async fn reconnect(&self, cancel: &CancellationToken) -> Result<Arc<Connection>> {
        self.channel.set_state(ConnectionState::Reconnecting);
        let mut backoff = Backoff::new(self.config.initial_delay, self.config.max_delay);

        loop {
            if self.config.max_attempts > 0 && backoff.attempts() >= self.config.max_attempts {
                error!(attempts = backoff.attempts(), "Giving up on reconnecting");
                self.channel.disconnect();
                return Err(TrackerError::WebSocket(format!(
                    "gave up reconnecting after {} attempts",
                    backoff.attempts()
                )));
            }

            let delay = backoff.next_delay();
            info!(
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.channel.disconnect();
                    return Err(TrackerError::Cancelled("reconnect".to_string()));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.channel.connect().await {
                Ok(connection) => {
                    counters::reconnects(1);
                    if self.config.resubscribe {
                        self.channel.resubscribe_all().await;
                    } else {
                        self.channel.clear_subscriptions();
                    }
                    return Ok(connection);
                }
                Err(e) => warn!(attempt = backoff.attempts(), error = %e, "Reconnect attempt failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_server::{self, drain, next_request, reply};
    use serde_json::json;
    use tracker_core::WsConfig;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.attempts(), 5);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_survives_many_attempts() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(30));
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(30));
        }
    }

    fn config(url: String, enabled: bool) -> WsConfig {
        let mut config = WsConfig::with_url(url);
        config.request_timeout = Duration::from_secs(2);
        config.reconnect = ReconnectConfig {
            enabled,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            max_attempts: 5,
            resubscribe: true,
        };
        config
    }

    #[tokio::test]
    async fn test_reconnect_restores_subscriptions() {
        let url = test_server::spawn(2, |index, mut socket| async move {
            let request = next_request(&mut socket).await.unwrap();
            reply(&mut socket, &request["id"], json!(index as u64 + 1)).await;
            if index == 0 {
                socket.close(None).await.ok();
                tokio::spawn(async move { drain(&mut socket).await });
            } else {
                tokio::spawn(async move { drain(&mut socket).await });
            }
        })
        .await;

        let channel = Arc::new(SubscriptionChannel::new(config(url, true)));
        channel.connect().await.unwrap();
        assert_eq!(channel.subscribe("wallet-a").await.unwrap(), 1);

        let cancel = CancellationToken::new();
        let supervisor = Supervisor::new(channel.clone());
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { supervisor.run(cancel).await })
        };

        let restored = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if channel.wallet_for(2).is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(restored.is_ok(), "subscription was not restored");
        assert_eq!(channel.wallet_for(1), None);
        assert_eq!(channel.state(), ConnectionState::Connected);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disabled_reconnect_reports_loss_and_allows_restart() {
        let url = test_server::spawn(2, |index, mut socket| async move {
            let request = next_request(&mut socket).await.unwrap();
            reply(&mut socket, &request["id"], json!(index as u64 + 1)).await;
            if index == 0 {
                socket.close(None).await.ok();
            }
            drain(&mut socket).await;
        })
        .await;

        let channel = Arc::new(SubscriptionChannel::new(config(url, false)));
        let mut listener = channel.listen();
        channel.connect().await.unwrap();
        assert_eq!(channel.subscribe("wallet-a").await.unwrap(), 1);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Supervisor::new(channel.clone()).run(CancellationToken::new()),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(TrackerError::WebSocket(_))));
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert_eq!(listener.recv().await, None);
        assert!(!channel.is_subscribed("wallet-a"));

        // The same channel serves a fresh run
        channel.connect().await.unwrap();
        assert_eq!(channel.subscribe("wallet-a").await.unwrap(), 2);
        assert_eq!(channel.state(), ConnectionState::Connected);
    }
}
