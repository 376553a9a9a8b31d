use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracker_core::{AccountStore, Result, TrackerError, WalletFeed};
use tracker_rpc::token::parse_address;

/// Track/untrack flows keeping stored subscriptions and the live feed in step.
///
/// Operations on the same wallet are serialized so two concurrent first
/// subscribers cannot both open a live subscription.
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    feed: Arc<dyn WalletFeed>,
    wallet_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, feed: Arc<dyn WalletFeed>) -> Self {
        Self {
            store,
            feed,
            wallet_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, address: &str) -> Arc<Mutex<()>> {
        self.wallet_locks
            .entry(address.to_string())
            .or_default()
            .clone()
    }

    pub async fn create_user(&self, external_id: i64) -> Result<i64> {
        self.store.create_user(external_id).await
    }

    /// Subscribe `external_id` to the wallet, opening a live subscription
    /// when the wallet is not already being watched.
    pub async fn track_wallet(&self, address: &str, external_id: i64) -> Result<()> {
        parse_address(address)?;

        let user_id = match self.store.resolve_user_id(external_id).await {
            Ok(id) => id,
            Err(TrackerError::UserNotFound(_)) => {
                info!(external_id, "Creating user on first track");
                self.store.create_user(external_id).await?
            }
            Err(e) => return Err(e),
        };

        let lock = self.lock_for(address);
        let _guard = lock.lock().await;

        let wallet_id = self.store.resolve_wallet_id(address).await?;
        let was_active = self.store.is_active(wallet_id).await?;
        let inserted = self
            .store
            .add_subscription(address, user_id, wallet_id)
            .await?;

        if self.feed.is_subscribed(address) {
            info!(wallet = address, user_id, "Wallet already live, subscription added");
            return Ok(());
        }

        match self.feed.subscribe(address).await {
            Ok(subscription_id) => {
                info!(wallet = address, user_id, subscription_id, was_active, "Wallet tracked");
                Ok(())
            }
            Err(e) if inserted => {
                warn!(wallet = address, user_id, error = %e, "Live subscribe failed, rolling back");
                if let Err(rollback) = self.store.remove_subscription(address, user_id).await {
                    error!(wallet = address, user_id, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
            // The row predates this call and stays
            Err(e) => {
                warn!(wallet = address, user_id, error = %e, "Live subscribe failed for existing subscription");
                Err(e)
            }
        }
    }

    /// Drop the wallet's lock entry unless another caller holds or awaits it
    fn release_lock(&self, address: &str) {
        self.wallet_locks
            .remove_if(address, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Remove the user's subscription; the live subscription is dropped once
    /// nobody else is watching the wallet.
    pub async fn untrack_wallet(&self, address: &str, external_id: i64) -> Result<()> {
        let user_id = self.store.resolve_user_id(external_id).await?;

        let lock = self.lock_for(address);
        let guard = lock.lock().await;
        let result = self.untrack_locked(address, user_id).await;
        drop(guard);
        drop(lock);

        if matches!(result, Ok(false)) {
            self.release_lock(address);
        }
        result.map(|_| ())
    }

    /// Returns whether other subscribers remain
    async fn untrack_locked(&self, address: &str, user_id: i64) -> Result<bool> {
        let others_remain = self.store.remove_subscription(address, user_id).await?;
        if others_remain {
            info!(wallet = address, user_id, "Subscription removed, wallet still watched");
            return Ok(true);
        }
        if !self.feed.is_subscribed(address) {
            return Ok(false);
        }

        let acknowledged = self.feed.unsubscribe(address).await?;
        if !acknowledged {
            warn!(wallet = address, "Server did not acknowledge unsubscribe");
        }
        info!(wallet = address, user_id, "Wallet untracked");
        Ok(false)
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.wallet_locks.len()
    }

    /// Re-open live subscriptions for every wallet the store marks active.
    /// Returns how many succeeded.
    pub async fn restore_subscriptions(&self) -> Result<usize> {
        let wallets = self.store.active_wallets().await?;
        let mut restored = 0;
        for wallet in &wallets {
            let lock = self.lock_for(wallet);
            let _guard = lock.lock().await;
            if self.feed.is_subscribed(wallet) {
                restored += 1;
                continue;
            }
            match self.feed.subscribe(wallet).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(wallet = %wallet, error = %e, "Failed to restore subscription"),
            }
        }
        info!(restored, total = wallets.len(), "Restored stored subscriptions");
        Ok(restored)
    }
}
