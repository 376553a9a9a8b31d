use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{NameAndSymbol, TokenSnapshot, TransactionRecord};
use crate::Result;

/// Remote lookups the token aggregator and swap diff depend on
#[async_trait]
pub trait TokenDataProvider: Send + Sync {
    /// Name and symbol from the token's metadata account
    async fn name_and_symbol(&self, address: &str) -> Result<NameAndSymbol>;

    /// Circulating supply, UI scaled
    async fn supply(&self, address: &str) -> Result<f64>;

    /// Current USD price. A missing quote is `PriceNotFound`
    async fn price(&self, address: &str) -> Result<f64>;

    /// Block time of the earliest transaction touching the token's metadata
    async fn creation_time(&self, address: &str) -> Result<DateTime<Utc>>;
}

/// Full transaction lookup by signature
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn get_transaction(&self, signature: &str) -> Result<TransactionRecord>;
}

/// Live wallet subscriptions on the remote feed
#[async_trait]
pub trait WalletFeed: Send + Sync {
    /// Subscribe to the wallet's logs, returning the server subscription id
    async fn subscribe(&self, wallet: &str) -> Result<u64>;

    /// Drop the wallet's live subscription; returns the server acknowledgement
    async fn unsubscribe(&self, wallet: &str) -> Result<bool>;

    /// Whether a confirmed live subscription exists for the wallet
    fn is_subscribed(&self, wallet: &str) -> bool;
}

/// Users, wallets and subscriptions with reference-counted activation.
///
/// Implementations keep `wallet.subscription_active == (rows > 0)` inside the
/// same transaction as every subscription row mutation.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up a wallet by address, inserting it when absent
    async fn resolve_wallet_id(&self, address: &str) -> Result<i64>;

    /// Read the active flag. A missing wallet is `WalletNotFound`
    async fn is_active(&self, wallet_id: i64) -> Result<bool>;

    /// Insert the (user, wallet) row and flag the wallet active. Inserting an
    /// existing pair is a no-op; returns whether a row was inserted.
    async fn add_subscription(&self, address: &str, user_id: i64, wallet_id: i64) -> Result<bool>;

    /// Delete the (user, wallet) row and deactivate the wallet when it was the
    /// last one. Returns whether other subscribers remain.
    async fn remove_subscription(&self, address: &str, user_id: i64) -> Result<bool>;

    async fn set_wallet_active(&self, wallet_id: i64) -> Result<()>;

    /// Create a user for the external id, returning the internal id
    async fn create_user(&self, external_id: i64) -> Result<i64>;

    /// A missing user is `UserNotFound`
    async fn resolve_user_id(&self, external_id: i64) -> Result<i64>;

    /// Addresses of every wallet currently flagged active
    async fn active_wallets(&self) -> Result<Vec<String>>;
}

/// Persisted token rows
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create_token(&self, token: &TokenSnapshot) -> Result<()>;

    /// A missing row is `TokenNotFound`
    async fn delete_token(&self, address: &str) -> Result<()>;
}
