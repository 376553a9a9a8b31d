//! In-process stores used when no database is configured, and by tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracker_core::types::{Subscription, TokenSnapshot, User, Wallet};
use tracker_core::{AccountStore, Result, TokenStore, TrackerError};

#[derive(Default)]
struct AccountState {
    /// Keyed by external id
    users: HashMap<i64, User>,
    wallets: HashMap<i64, Wallet>,
    wallet_ids: HashMap<String, i64>,
    /// Keyed by (user_id, wallet_id)
    subscriptions: HashMap<(i64, i64), Subscription>,
    next_user_id: i64,
    next_wallet_id: i64,
}

impl AccountState {
    fn subscriber_count(&self, wallet_id: i64) -> usize {
        self.subscriptions
            .values()
            .filter(|s| s.wallet_id == wallet_id)
            .count()
    }
}

/// Account store held behind one lock, so each operation is atomic
#[derive(Default)]
pub struct MemoryAccountStore {
    state: Mutex<AccountState>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wallet(&self, address: &str) -> Option<Wallet> {
        let state = self.state.lock();
        state
            .wallet_ids
            .get(address)
            .and_then(|id| state.wallets.get(id))
            .cloned()
    }

    pub fn subscriber_count(&self, address: &str) -> usize {
        let state = self.state.lock();
        state
            .wallet_ids
            .get(address)
            .map(|id| state.subscriber_count(*id))
            .unwrap_or(0)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn resolve_wallet_id(&self, address: &str) -> Result<i64> {
        let mut state = self.state.lock();
        if let Some(id) = state.wallet_ids.get(address) {
            return Ok(*id);
        }
        state.next_wallet_id += 1;
        let id = state.next_wallet_id;
        state.wallet_ids.insert(address.to_string(), id);
        state.wallets.insert(
            id,
            Wallet {
                id,
                address: address.to_string(),
                subscription_active: false,
            },
        );
        Ok(id)
    }

    async fn is_active(&self, wallet_id: i64) -> Result<bool> {
        self.state
            .lock()
            .wallets
            .get(&wallet_id)
            .map(|w| w.subscription_active)
            .ok_or_else(|| TrackerError::WalletNotFound(wallet_id.to_string()))
    }

    async fn add_subscription(&self, address: &str, user_id: i64, wallet_id: i64) -> Result<bool> {
        let mut state = self.state.lock();
        if !state.users.values().any(|user| user.id == user_id) {
            return Err(TrackerError::Database(format!("unknown user id {user_id}")));
        }
        let wallet = state
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| TrackerError::WalletNotFound(address.to_string()))?;
        wallet.subscription_active = true;
        if state.subscriptions.contains_key(&(user_id, wallet_id)) {
            return Ok(false);
        }
        state.subscriptions.insert(
            (user_id, wallet_id),
            Subscription {
                user_id,
                wallet_id,
                wallet_address: address.to_string(),
            },
        );
        Ok(true)
    }

    async fn remove_subscription(&self, address: &str, user_id: i64) -> Result<bool> {
        let mut state = self.state.lock();
        let wallet_id = *state
            .wallet_ids
            .get(address)
            .ok_or_else(|| TrackerError::WalletNotFound(address.to_string()))?;

        state.subscriptions.remove(&(user_id, wallet_id));
        let remaining = state.subscriber_count(wallet_id);
        if remaining == 0 {
            if let Some(wallet) = state.wallets.get_mut(&wallet_id) {
                wallet.subscription_active = false;
            }
        }
        Ok(remaining > 0)
    }

    async fn set_wallet_active(&self, wallet_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        let wallet = state
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| TrackerError::WalletNotFound(wallet_id.to_string()))?;
        wallet.subscription_active = true;
        Ok(())
    }

    async fn create_user(&self, external_id: i64) -> Result<i64> {
        let mut state = self.state.lock();
        if let Some(user) = state.users.get(&external_id) {
            return Ok(user.id);
        }
        state.next_user_id += 1;
        let id = state.next_user_id;
        state.users.insert(external_id, User { id, external_id });
        Ok(id)
    }

    async fn resolve_user_id(&self, external_id: i64) -> Result<i64> {
        self.state
            .lock()
            .users
            .get(&external_id)
            .map(|user| user.id)
            .ok_or(TrackerError::UserNotFound(external_id))
    }

    async fn active_wallets(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        let mut wallets: Vec<&Wallet> = state
            .wallets
            .values()
            .filter(|w| w.subscription_active)
            .collect();
        wallets.sort_by_key(|w| w.id);
        Ok(wallets.into_iter().map(|w| w.address.clone()).collect())
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, TokenSnapshot>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<TokenSnapshot> {
        self.tokens.lock().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create_token(&self, token: &TokenSnapshot) -> Result<()> {
        self.tokens
            .lock()
            .insert(token.address.clone(), token.clone());
        Ok(())
    }

    async fn delete_token(&self, address: &str) -> Result<()> {
        self.tokens
            .lock()
            .remove(address)
            .map(|_| ())
            .ok_or_else(|| TrackerError::TokenNotFound(address.to_string()))
    }
}
