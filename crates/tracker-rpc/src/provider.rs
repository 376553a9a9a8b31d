use crate::client::RpcClient;
use crate::price::PriceOracle;
use crate::{token, transactions};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracker_core::types::{NameAndSymbol, TransactionRecord};
use tracker_core::{Result, RpcConfig, TokenDataProvider, TransactionSource};

/// Token data and transaction lookups backed by a Solana RPC node and a
/// price endpoint
pub struct SolanaRpcProvider {
    client: RpcClient,
    oracle: PriceOracle,
}

impl SolanaRpcProvider {
    pub fn new(client: RpcClient, oracle: PriceOracle) -> Self {
        Self { client, oracle }
    }

    pub fn from_config(config: &RpcConfig) -> Result<Self> {
        Ok(Self::new(
            RpcClient::new(config.rpc_url.clone(), config.timeout)?,
            PriceOracle::new(config.price_api_url.clone(), config.timeout)?,
        ))
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

#[async_trait]
impl TokenDataProvider for SolanaRpcProvider {
    async fn name_and_symbol(&self, address: &str) -> Result<NameAndSymbol> {
        token::name_and_symbol(&self.client, address).await
    }

    async fn supply(&self, address: &str) -> Result<f64> {
        token::supply(&self.client, address).await
    }

    async fn price(&self, address: &str) -> Result<f64> {
        token::parse_address(address)?;
        self.oracle.price(address).await
    }

    async fn creation_time(&self, address: &str) -> Result<DateTime<Utc>> {
        token::creation_time(&self.client, address).await
    }
}

#[async_trait]
impl TransactionSource for SolanaRpcProvider {
    async fn get_transaction(&self, signature: &str) -> Result<TransactionRecord> {
        transactions::get_transaction(&self.client, signature).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracker_core::TrackerError;

    #[tokio::test]
    async fn test_invalid_address_rejected_before_any_request() {
        let config = RpcConfig {
            rpc_url: "http://127.0.0.1:1".to_string(),
            price_api_url: "http://127.0.0.1:1/price".to_string(),
            timeout: Duration::from_millis(500),
        };
        let provider = SolanaRpcProvider::from_config(&config).unwrap();

        assert!(matches!(
            provider.price("definitely not base58").await,
            Err(TrackerError::InvalidAddress(_))
        ));
        assert!(matches!(
            provider.supply("0OIl").await,
            Err(TrackerError::InvalidAddress(_))
        ));
    }
}
