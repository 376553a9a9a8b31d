use crate::account::AccountService;
use crate::monitor::ActivityMonitor;
use crate::token::TokenAggregator;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracker_core::types::{TokenSnapshot, WalletActivity};
use tracker_core::{
    AccountStore, Result, TokenDataProvider, TokenStore, TrackerConfig, TransactionSource,
};
use tracker_rpc::SolanaRpcProvider;
use tracker_ws::{ConnectionState, SubscriptionChannel};

/// Entry point tying the live feed, account bookkeeping and token data together
pub struct WalletTracker {
    channel: Arc<SubscriptionChannel>,
    accounts: Arc<AccountService>,
    tokens: TokenAggregator,
    monitor: Arc<ActivityMonitor>,
    activity: broadcast::Sender<WalletActivity>,
    shutdown: CancellationToken,
}

impl WalletTracker {
    pub fn new(
        channel: Arc<SubscriptionChannel>,
        provider: Arc<dyn TokenDataProvider>,
        source: Arc<dyn TransactionSource>,
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn TokenStore>,
        activity_capacity: usize,
    ) -> Self {
        let (activity, _) = broadcast::channel(activity_capacity.max(1));
        let accounts = Arc::new(AccountService::new(accounts, channel.clone()));
        let monitor = Arc::new(ActivityMonitor::new(
            channel.clone(),
            accounts.clone(),
            source,
            provider.clone(),
            activity.clone(),
        ));

        Self {
            channel,
            accounts,
            tokens: TokenAggregator::new(provider, tokens),
            monitor,
            activity,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wire the RPC provider and websocket channel from configuration
    pub fn from_config(
        config: &TrackerConfig,
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let provider = Arc::new(SolanaRpcProvider::from_config(&config.rpc)?);
        let channel = Arc::new(SubscriptionChannel::new(config.ws.clone()));
        Ok(Self::new(
            channel,
            provider.clone(),
            provider,
            accounts,
            tokens,
            config.activity_capacity,
        ))
    }

    pub async fn create_user(&self, external_id: i64) -> Result<i64> {
        self.accounts.create_user(external_id).await
    }

    pub async fn track_wallet(&self, address: &str, external_id: i64) -> Result<()> {
        self.accounts.track_wallet(address, external_id).await
    }

    pub async fn untrack_wallet(&self, address: &str, external_id: i64) -> Result<()> {
        self.accounts.untrack_wallet(address, external_id).await
    }

    /// Aggregate token data. A failed lookup comes back as
    /// `TrackerError::TokenLookup` naming the attribute; the lookup's own
    /// error is its `source` and [`TrackerError::root_cause`].
    pub async fn get_token_snapshot(&self, address: &str) -> Result<TokenSnapshot> {
        self.tokens.snapshot(address, &self.shutdown).await
    }

    pub async fn delete_token(&self, address: &str) -> Result<()> {
        self.tokens.delete(address).await
    }

    /// Connect and start turning notifications into activity.
    /// See [`ActivityMonitor::start`].
    pub async fn monitor(&self, cancel: CancellationToken) -> Result<JoinHandle<Result<()>>> {
        self.monitor.start(cancel).await
    }

    /// Receive decoded swap activity. Slow receivers lose the oldest items.
    pub fn activity(&self) -> broadcast::Receiver<WalletActivity> {
        self.activity.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    /// Abort in-flight snapshots and close the live feed
    pub fn close(&self) {
        self.shutdown.cancel();
        self.channel.close();
        info!("Wallet tracker closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeProvider, FakeSource, MINT_M, WALLET};
    use tracker_core::{TrackerError, WsConfig};
    use tracker_db::{MemoryAccountStore, MemoryTokenStore};

    fn tracker() -> (WalletTracker, Arc<MemoryTokenStore>) {
        let channel = Arc::new(SubscriptionChannel::new(WsConfig::with_url(
            "ws://127.0.0.1:1",
        )));
        let tokens = Arc::new(MemoryTokenStore::new());
        let tracker = WalletTracker::new(
            channel,
            Arc::new(FakeProvider::default()),
            Arc::new(FakeSource::default()),
            Arc::new(MemoryAccountStore::new()),
            tokens.clone(),
            8,
        );
        (tracker, tokens)
    }

    #[tokio::test]
    async fn test_snapshot_then_delete() {
        let (tracker, tokens) = tracker();
        let snapshot = tracker.get_token_snapshot(MINT_M).await.unwrap();
        assert_eq!(snapshot.fdv, 2000.0);
        assert_eq!(tokens.len(), 1);

        tracker.delete_token(MINT_M).await.unwrap();
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn test_missing_price_surfaces_through_lookup_error() {
        let channel = Arc::new(SubscriptionChannel::new(WsConfig::with_url(
            "ws://127.0.0.1:1",
        )));
        let provider = FakeProvider {
            price: Err(TrackerError::PriceNotFound(MINT_M.to_string())),
            ..FakeProvider::default()
        };
        let tokens = Arc::new(MemoryTokenStore::new());
        let tracker = WalletTracker::new(
            channel,
            Arc::new(provider),
            Arc::new(FakeSource::default()),
            Arc::new(MemoryAccountStore::new()),
            tokens.clone(),
            8,
        );

        let err = tracker.get_token_snapshot(MINT_M).await.unwrap_err();
        assert!(matches!(err, TrackerError::TokenLookup { attribute: "price", .. }));
        assert!(matches!(err.root_cause(), TrackerError::PriceNotFound(a) if a == MINT_M));
        assert!(err.is_not_found());
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn test_track_without_connection_fails_and_rolls_back() {
        let (tracker, _) = tracker();
        assert!(matches!(
            tracker.track_wallet(WALLET, 1).await,
            Err(TrackerError::NotConnected)
        ));
        assert_eq!(tracker.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_closed_tracker_cancels_snapshots() {
        let (tracker, _) = tracker();
        tracker.close();
        assert!(matches!(
            tracker.get_token_snapshot(MINT_M).await,
            Err(TrackerError::Cancelled(_))
        ));
    }
}
