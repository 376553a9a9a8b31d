use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use tracker_core::config::redact;
use tracker_core::{Result, TrackerError};
use tracker_metrics::{counters, histograms};

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: i64,
    message: String,
}

/// Request/response JSON-RPC client for a Solana HTTP endpoint
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::Internal(format!("failed building http client: {e}")))?;
        Ok(Self::with_client(http, url))
    }

    pub fn with_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and decode its `result`. A JSON `null` result decodes
    /// into `T` as-is, so callers that can see null ask for an `Option`.
    pub async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let started = Instant::now();
        let outcome = self.send(method, &request).await;
        histograms::rpc_request_duration(method, started.elapsed());

        let envelope = outcome.inspect_err(|e| {
            counters::errors(1, e.kind());
            warn!(method, url = %redact(&self.url), error = %e, "RPC request failed");
        })?;

        if let Some(error) = envelope.error {
            debug!(method, code = error.code, message = %error.message, "RPC returned error");
            return Err(TrackerError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        let result = envelope.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| TrackerError::Decode(format!("{method} result: {e}")))
    }

    async fn send(&self, method: &str, request: &Value) -> Result<Envelope> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?
            .error_for_status()
            .map_err(|e| transport_error(method, e))?;

        response
            .json::<Envelope>()
            .await
            .map_err(|e| TrackerError::Decode(format!("{method} response: {e}")))
    }
}

pub(crate) fn transport_error(what: &str, err: reqwest::Error) -> TrackerError {
    if err.is_timeout() {
        TrackerError::Timeout(what.to_string())
    } else {
        TrackerError::Rpc(format!("{what}: {err}"))
    }
}
