use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracker_core::types::{NameAndSymbol, TokenSnapshot};
use tracker_core::{Result, TokenDataProvider, TokenStore, TrackerError};
use tracker_metrics::{counters, histograms};

/// Builds token snapshots from four concurrent lookups
pub struct TokenAggregator {
    provider: Arc<dyn TokenDataProvider>,
    store: Arc<dyn TokenStore>,
}

impl TokenAggregator {
    pub fn new(provider: Arc<dyn TokenDataProvider>, store: Arc<dyn TokenStore>) -> Self {
        Self { provider, store }
    }

    /// Fetch name/symbol, supply, price and creation time concurrently.
    ///
    /// The first failing lookup cancels the others and is returned wrapped in
    /// `TokenLookup`. Cancelling `cancel` returns `Cancelled`. A successful
    /// snapshot is persisted best-effort.
    pub async fn snapshot(&self, address: &str, cancel: &CancellationToken) -> Result<TokenSnapshot> {
        let started = Instant::now();
        let lookups = cancel.child_token();

        let mut name_rx = spawn_lookup(&lookups, {
            let (provider, address) = (self.provider.clone(), address.to_string());
            async move { provider.name_and_symbol(&address).await }
        });
        let mut supply_rx = spawn_lookup(&lookups, {
            let (provider, address) = (self.provider.clone(), address.to_string());
            async move { provider.supply(&address).await }
        });
        let mut price_rx = spawn_lookup(&lookups, {
            let (provider, address) = (self.provider.clone(), address.to_string());
            async move { provider.price(&address).await }
        });
        let mut created_rx = spawn_lookup(&lookups, {
            let (provider, address) = (self.provider.clone(), address.to_string());
            async move { provider.creation_time(&address).await }
        });

        let mut name: Option<NameAndSymbol> = None;
        let mut supply: Option<f64> = None;
        let mut price: Option<f64> = None;
        let mut created_at: Option<DateTime<Utc>> = None;

        let collected: Result<()> = loop {
            if name.is_some() && supply.is_some() && price.is_some() && created_at.is_some() {
                break Ok(());
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break Err(TrackerError::Cancelled(format!("token snapshot for {address}")));
                }
                result = &mut name_rx, if name.is_none() => match flatten(result) {
                    Ok(value) => name = Some(value),
                    Err(e) => break Err(TrackerError::lookup("name and symbol", e)),
                },
                result = &mut supply_rx, if supply.is_none() => match flatten(result) {
                    Ok(value) => supply = Some(value),
                    Err(e) => break Err(TrackerError::lookup("supply", e)),
                },
                result = &mut price_rx, if price.is_none() => match flatten(result) {
                    Ok(value) => price = Some(value),
                    Err(e) => break Err(TrackerError::lookup("price", e)),
                },
                result = &mut created_rx, if created_at.is_none() => match flatten(result) {
                    Ok(value) => created_at = Some(value),
                    Err(e) => break Err(TrackerError::lookup("creation time", e)),
                },
            }
        };
        // Stops whatever is still in flight after an early return
        lookups.cancel();

        if let Err(e) = collected {
            counters::errors(1, e.kind());
            debug!(address, error = %e, "Token snapshot failed");
            return Err(e);
        }

        let (Some(name), Some(supply), Some(price), Some(created_at)) =
            (name, supply, price, created_at)
        else {
            return Err(TrackerError::Internal("snapshot collector exited early".to_string()));
        };

        let snapshot = TokenSnapshot {
            address: address.to_string(),
            name: name.name,
            symbol: name.symbol,
            supply,
            price,
            created_at,
            fdv: price * supply,
            socials: Some(TokenSnapshot::socials_link(address)),
        };

        if let Err(e) = self.store.create_token(&snapshot).await {
            counters::persistence_failures(1);
            warn!(address, error = %e, "Failed to persist token snapshot");
        }

        counters::token_snapshots(1);
        histograms::snapshot_duration(started.elapsed());
        Ok(snapshot)
    }

    pub async fn delete(&self, address: &str) -> Result<()> {
        self.store.delete_token(address).await
    }
}

/// Run one lookup on its own task, delivering into a single-slot channel.
/// The task drops its lookup when `token` is cancelled.
fn spawn_lookup<T, F>(token: &CancellationToken, lookup: F) -> oneshot::Receiver<Result<T>>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = lookup => {
                let _ = tx.send(result);
            }
        }
    });
    rx
}

fn flatten<T>(received: std::result::Result<Result<T>, oneshot::error::RecvError>) -> Result<T> {
    received.unwrap_or_else(|_| Err(TrackerError::Internal("lookup task ended without a result".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeProvider, MINT_M};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tracker_db::MemoryTokenStore;

    fn build(provider: FakeProvider) -> (TokenAggregator, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        (TokenAggregator::new(Arc::new(provider), store.clone()), store)
    }

    #[tokio::test]
    async fn test_snapshot_computes_fdv_and_persists() {
        let (aggregator, store) = build(FakeProvider::default());

        let snapshot = aggregator
            .snapshot(MINT_M, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(snapshot.symbol, "USDC");
        assert_eq!(snapshot.supply, 1000.0);
        assert_eq!(snapshot.price, 2.0);
        assert_eq!(snapshot.fdv, 2000.0);
        assert_eq!(
            snapshot.socials.as_deref(),
            Some("https://x.com/search?q=EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
        );
        assert_eq!(store.get(MINT_M), Some(snapshot));
    }

    #[tokio::test]
    async fn test_zero_price_gives_zero_fdv() {
        let (aggregator, _) = build(FakeProvider {
            price: Ok(0.0),
            ..FakeProvider::default()
        });
        let snapshot = aggregator
            .snapshot(MINT_M, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(snapshot.fdv, 0.0);
    }

    #[tokio::test]
    async fn test_snapshot_is_idempotent() {
        let (aggregator, store) = build(FakeProvider::default());
        let cancel = CancellationToken::new();
        let first = aggregator.snapshot(MINT_M, &cancel).await.unwrap();
        let second = aggregator.snapshot(MINT_M, &cancel).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_first_error_wins_and_cancels_slow_lookups() {
        let provider = FakeProvider {
            price: Err(TrackerError::PriceNotFound(MINT_M.to_string())),
            creation_delay: Duration::from_secs(30),
            ..FakeProvider::default()
        };
        let dropped = provider.creation_dropped.clone();
        let (aggregator, store) = build(provider);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            aggregator.snapshot(MINT_M, &CancellationToken::new()),
        )
        .await
        .expect("snapshot should not wait for the slow lookup");

        match result {
            Err(TrackerError::TokenLookup { attribute, source }) => {
                assert_eq!(attribute, "price");
                assert!(matches!(*source, TrackerError::PriceNotFound(_)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(store.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(dropped.load(Ordering::SeqCst), "slow lookup was not cancelled");
    }

    #[tokio::test]
    async fn test_parent_cancellation() {
        let provider = FakeProvider {
            creation_delay: Duration::from_secs(30),
            ..FakeProvider::default()
        };
        let (aggregator, _) = build(provider);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        assert!(matches!(
            aggregator.snapshot(MINT_M, &cancel).await,
            Err(TrackerError::Cancelled(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_token() {
        let (aggregator, _) = build(FakeProvider::default());
        assert!(matches!(
            aggregator.delete(MINT_M).await,
            Err(TrackerError::TokenNotFound(_))
        ));
    }
}
