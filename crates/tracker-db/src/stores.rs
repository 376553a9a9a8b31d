use crate::pool::DatabasePool;
use crate::repositories::{SubscriptionRepository, TokenRepository, UserRepository, WalletRepository};
use crate::DatabaseError;
use async_trait::async_trait;
use tracing::{debug, info};
use tracker_core::types::TokenSnapshot;
use tracker_core::{AccountStore, Result, TokenStore, TrackerError};

/// Postgres-backed users, wallets and subscriptions
#[derive(Clone)]
pub struct PgAccountStore {
    pool: DatabasePool,
}

impl PgAccountStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn resolve_wallet_id(&self, address: &str) -> Result<i64> {
        Ok(WalletRepository::upsert(self.pool.inner(), address).await?)
    }

    async fn is_active(&self, wallet_id: i64) -> Result<bool> {
        WalletRepository::is_active(self.pool.inner(), wallet_id)
            .await?
            .ok_or_else(|| TrackerError::WalletNotFound(wallet_id.to_string()))
    }

    async fn add_subscription(&self, address: &str, user_id: i64, wallet_id: i64) -> Result<bool> {
        let mut tx = self.pool.inner().begin().await.map_err(DatabaseError::from)?;

        let wallet = WalletRepository::lock_by_id(&mut tx, wallet_id)
            .await?
            .ok_or_else(|| TrackerError::WalletNotFound(address.to_string()))?;
        let inserted =
            SubscriptionRepository::insert_if_not_exists(&mut tx, user_id, wallet_id, address)
                .await?;
        if !wallet.subscription_active {
            WalletRepository::set_active(&mut tx, wallet_id, true).await?;
        }

        tx.commit().await.map_err(DatabaseError::from)?;
        debug!(user_id, wallet_id, inserted, "Subscription stored");
        Ok(inserted)
    }

    async fn remove_subscription(&self, address: &str, user_id: i64) -> Result<bool> {
        let mut tx = self.pool.inner().begin().await.map_err(DatabaseError::from)?;

        let wallet = WalletRepository::lock_by_address(&mut tx, address)
            .await?
            .ok_or_else(|| TrackerError::WalletNotFound(address.to_string()))?;
        let deleted = SubscriptionRepository::delete(&mut tx, user_id, wallet.id).await?;
        let remaining = SubscriptionRepository::count_for_wallet(&mut tx, wallet.id).await?;
        if remaining == 0 && wallet.subscription_active {
            WalletRepository::set_active(&mut tx, wallet.id, false).await?;
            info!(wallet = address, "Wallet has no subscribers left, deactivated");
        }

        tx.commit().await.map_err(DatabaseError::from)?;
        debug!(user_id, wallet_id = wallet.id, deleted, remaining, "Subscription removed");
        Ok(remaining > 0)
    }

    async fn set_wallet_active(&self, wallet_id: i64) -> Result<()> {
        let mut conn = self.pool.inner().acquire().await.map_err(DatabaseError::from)?;
        if !WalletRepository::set_active(&mut conn, wallet_id, true).await? {
            return Err(TrackerError::WalletNotFound(wallet_id.to_string()));
        }
        Ok(())
    }

    async fn create_user(&self, external_id: i64) -> Result<i64> {
        Ok(UserRepository::upsert(self.pool.inner(), external_id).await?)
    }

    async fn resolve_user_id(&self, external_id: i64) -> Result<i64> {
        UserRepository::get_id(self.pool.inner(), external_id)
            .await?
            .ok_or(TrackerError::UserNotFound(external_id))
    }

    async fn active_wallets(&self) -> Result<Vec<String>> {
        let wallets = WalletRepository::get_active(self.pool.inner()).await?;
        Ok(wallets.into_iter().map(|w| w.address).collect())
    }
}

/// Postgres-backed token rows
#[derive(Clone)]
pub struct PgTokenStore {
    pool: DatabasePool,
}

impl PgTokenStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn create_token(&self, token: &TokenSnapshot) -> Result<()> {
        Ok(TokenRepository::upsert(self.pool.inner(), token).await?)
    }

    async fn delete_token(&self, address: &str) -> Result<()> {
        if TokenRepository::delete(self.pool.inner(), address).await? {
            Ok(())
        } else {
            Err(TrackerError::TokenNotFound(address.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use chrono::Utc;

    // Requires a disposable Postgres at DATABASE_URL
    async fn pool() -> DatabasePool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        DatabasePool::connect(&DatabaseConfig::new(url)).await.unwrap()
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}{}", tracker_core::types::now_millis())
    }

    #[tokio::test]
    #[ignore]
    async fn test_reference_counted_activation() {
        let store = PgAccountStore::new(pool().await);
        let address = unique("wallet-");
        let base = tracker_core::types::now_millis() as i64;

        let alice = store.create_user(base).await.unwrap();
        let bob = store.create_user(base + 1).await.unwrap();
        assert_eq!(store.create_user(base).await.unwrap(), alice);

        let wallet_id = store.resolve_wallet_id(&address).await.unwrap();
        assert!(!store.is_active(wallet_id).await.unwrap());

        assert!(store.add_subscription(&address, alice, wallet_id).await.unwrap());
        assert!(store.add_subscription(&address, bob, wallet_id).await.unwrap());
        assert!(!store.add_subscription(&address, bob, wallet_id).await.unwrap());
        assert!(store.is_active(wallet_id).await.unwrap());
        assert!(store.active_wallets().await.unwrap().contains(&address));

        assert!(store.remove_subscription(&address, alice).await.unwrap());
        assert!(store.is_active(wallet_id).await.unwrap());
        assert!(!store.remove_subscription(&address, bob).await.unwrap());
        assert!(!store.is_active(wallet_id).await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn test_token_delete_reports_missing_row() {
        let store = PgTokenStore::new(pool().await);
        let token = TokenSnapshot {
            address: unique("token-"),
            name: "Test".into(),
            symbol: "TST".into(),
            supply: 1000.0,
            price: 2.0,
            created_at: Utc::now(),
            fdv: 2000.0,
            socials: None,
        };

        store.create_token(&token).await.unwrap();
        store.create_token(&token).await.unwrap();
        store.delete_token(&token.address).await.unwrap();
        assert!(matches!(
            store.delete_token(&token.address).await,
            Err(TrackerError::TokenNotFound(_))
        ));
    }
}
