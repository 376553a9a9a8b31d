use crate::client::transport_error;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracker_core::{Result, TrackerError};
use tracker_metrics::histograms;

/// USD spot prices from a Jupiter-style price endpoint:
/// `GET {url}?ids={address}` answering `{"data": {"<address>": {"price": ..}}}`
pub struct PriceOracle {
    http: reqwest::Client,
    url: String,
}

impl PriceOracle {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::Internal(format!("failed building http client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub async fn price(&self, address: &str) -> Result<f64> {
        let started = Instant::now();
        let response = self
            .http
            .get(&self.url)
            .query(&[("ids", address)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| transport_error("price request", e));
        histograms::rpc_request_duration("price", started.elapsed());

        let body: Value = response?
            .json()
            .await
            .map_err(|e| TrackerError::Decode(format!("price response: {e}")))?;
        parse_price(&body, address)
    }
}

/// Extract `data.<address>.price`, which the API sends as a string or a number
pub fn parse_price(body: &Value, address: &str) -> Result<f64> {
    let price = body
        .get("data")
        .and_then(|data| data.get(address))
        .and_then(|entry| entry.get("price"))
        .filter(|price| !price.is_null())
        .ok_or_else(|| TrackerError::PriceNotFound(address.to_string()))?;

    match price {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| TrackerError::Decode(format!("price for {address} is not numeric: {price}")))
}
