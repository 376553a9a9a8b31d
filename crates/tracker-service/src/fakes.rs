//! Hand-written trait fakes shared by the service tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracker_core::types::{NameAndSymbol, TransactionRecord};
use tracker_core::{
    AccountStore, Result, TokenDataProvider, TrackerError, TransactionSource, WalletFeed,
};

pub const WALLET: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
pub const MINT_M: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const MINT_N: &str = "So11111111111111111111111111111111111111112";

/// Sets its flag when dropped, to observe cancelled lookups
pub struct DropFlag(pub Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct FakeProvider {
    pub symbols: HashMap<String, String>,
    pub supply: Result<f64>,
    pub price: Result<f64>,
    pub created_at: DateTime<Utc>,
    /// Delay before creation_time answers
    pub creation_delay: Duration,
    pub creation_dropped: Arc<AtomicBool>,
    pub symbol_lookups: AtomicUsize,
}

impl Default for FakeProvider {
    fn default() -> Self {
        let symbols = [(MINT_M, "USDC"), (MINT_N, "SOL")]
            .into_iter()
            .map(|(m, s)| (m.to_string(), s.to_string()))
            .collect();
        Self {
            symbols,
            supply: Ok(1000.0),
            price: Ok(2.0),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            creation_delay: Duration::ZERO,
            creation_dropped: Arc::new(AtomicBool::new(false)),
            symbol_lookups: AtomicUsize::new(0),
        }
    }
}

fn clone_result(result: &Result<f64>) -> Result<f64> {
    match result {
        Ok(v) => Ok(*v),
        Err(TrackerError::PriceNotFound(a)) => Err(TrackerError::PriceNotFound(a.clone())),
        Err(e) => Err(TrackerError::Rpc(e.to_string())),
    }
}

#[async_trait]
impl TokenDataProvider for FakeProvider {
    async fn name_and_symbol(&self, address: &str) -> Result<NameAndSymbol> {
        self.symbol_lookups.fetch_add(1, Ordering::SeqCst);
        let symbol = self
            .symbols
            .get(address)
            .cloned()
            .ok_or_else(|| TrackerError::TokenNotFound(address.to_string()))?;
        Ok(NameAndSymbol {
            name: format!("{symbol} token"),
            symbol,
        })
    }

    async fn supply(&self, _address: &str) -> Result<f64> {
        clone_result(&self.supply)
    }

    async fn price(&self, _address: &str) -> Result<f64> {
        clone_result(&self.price)
    }

    async fn creation_time(&self, _address: &str) -> Result<DateTime<Utc>> {
        let _flag = DropFlag(self.creation_dropped.clone());
        tokio::time::sleep(self.creation_delay).await;
        Ok(self.created_at)
    }
}

#[derive(Default)]
pub struct FakeFeed {
    pub live: Mutex<HashSet<String>>,
    pub fail_subscribe: AtomicBool,
    pub subscribe_calls: AtomicUsize,
    pub unsubscribe_calls: AtomicUsize,
}

#[async_trait]
impl WalletFeed for FakeFeed {
    async fn subscribe(&self, wallet: &str) -> Result<u64> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TrackerError::Timeout("logsSubscribe".to_string()));
        }
        let mut live = self.live.lock().unwrap();
        live.insert(wallet.to_string());
        Ok(live.len() as u64)
    }

    async fn unsubscribe(&self, wallet: &str) -> Result<bool> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.live.lock().unwrap().remove(wallet) {
            Ok(true)
        } else {
            Err(TrackerError::NotSubscribed(wallet.to_string()))
        }
    }

    fn is_subscribed(&self, wallet: &str) -> bool {
        self.live.lock().unwrap().contains(wallet)
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub transactions: HashMap<String, TransactionRecord>,
}

#[async_trait]
impl TransactionSource for FakeSource {
    async fn get_transaction(&self, signature: &str) -> Result<TransactionRecord> {
        self.transactions
            .get(signature)
            .cloned()
            .ok_or_else(|| TrackerError::Rpc(format!("transaction {signature} is not available")))
    }
}

/// Account store whose database is unreachable
pub struct UnreachableStore;

fn unreachable_db<T>() -> Result<T> {
    Err(TrackerError::Database("connection refused".to_string()))
}

#[async_trait]
impl AccountStore for UnreachableStore {
    async fn resolve_wallet_id(&self, _address: &str) -> Result<i64> {
        unreachable_db()
    }

    async fn is_active(&self, _wallet_id: i64) -> Result<bool> {
        unreachable_db()
    }

    async fn add_subscription(&self, _address: &str, _user_id: i64, _wallet_id: i64) -> Result<bool> {
        unreachable_db()
    }

    async fn remove_subscription(&self, _address: &str, _user_id: i64) -> Result<bool> {
        unreachable_db()
    }

    async fn set_wallet_active(&self, _wallet_id: i64) -> Result<()> {
        unreachable_db()
    }

    async fn create_user(&self, _external_id: i64) -> Result<i64> {
        unreachable_db()
    }

    async fn resolve_user_id(&self, _external_id: i64) -> Result<i64> {
        unreachable_db()
    }

    async fn active_wallets(&self) -> Result<Vec<String>> {
        unreachable_db()
    }
}
