use crate::error::{Result, TrackerError};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PRICE_API_URL: &str = "https://api.jup.ag/price/v2";

/// Websocket connection and subscription settings
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    /// Interval between keepalive pings
    pub ping_interval: Duration,
    /// Max time to wait for a pong before the connection is considered dead
    pub pong_timeout: Duration,
    /// Deadline for a single socket write
    pub write_timeout: Duration,
    /// Deadline for a subscribe/unsubscribe round trip
    pub request_timeout: Duration,
    /// Buffer size of each listener channel
    pub listener_capacity: usize,
    /// Commitment level sent with logsSubscribe
    pub commitment: String,
    pub reconnect: ReconnectConfig,
}

impl WsConfig {
    pub fn from_env(url: String) -> Self {
        Self {
            url,
            ping_interval: Duration::from_secs(env_or("WS_PING_INTERVAL_SECS", 30)),
            pong_timeout: Duration::from_secs(env_or("WS_PONG_TIMEOUT_SECS", 45)),
            write_timeout: Duration::from_secs(env_or("WS_WRITE_TIMEOUT_SECS", 10)),
            request_timeout: Duration::from_secs(env_or("WS_REQUEST_TIMEOUT_SECS", 30)),
            listener_capacity: env_or("WS_LISTENER_CAPACITY", 10usize).max(1),
            commitment: env::var("WS_COMMITMENT").unwrap_or_else(|_| "finalized".to_string()),
            reconnect: ReconnectConfig::from_env(),
        }
    }

    /// Defaults without reading the environment
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(45),
            write_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            listener_capacity: 10,
            commitment: "finalized".to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect policy for the websocket supervisor
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// 0 means retry forever
    pub max_attempts: u32,
    /// Re-issue every confirmed subscription after reconnecting
    pub resubscribe: bool,
}

impl ReconnectConfig {
    pub fn from_env() -> Self {
        let initial_ms: u64 = env_or("WS_RECONNECT_INITIAL_MS", 500);
        let max_ms: u64 = env_or("WS_RECONNECT_MAX_MS", 30_000);
        Self {
            enabled: env_flag("WS_RECONNECT_ENABLED", true),
            initial_delay: Duration::from_millis(initial_ms.max(50)),
            max_delay: Duration::from_millis(max_ms.max(initial_ms.max(50))),
            max_attempts: env_or("WS_RECONNECT_MAX_ATTEMPTS", 10),
            resubscribe: env_flag("WS_RESUBSCRIBE_ON_RECONNECT", true),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            resubscribe: true,
        }
    }
}

/// HTTP endpoints for transaction lookups, token data and prices
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub rpc_url: String,
    pub price_api_url: String,
    pub timeout: Duration,
}

impl RpcConfig {
    pub fn from_env(rpc_url: String) -> Self {
        Self {
            rpc_url,
            price_api_url: env::var("PRICE_API_URL")
                .map(sanitize_url)
                .unwrap_or_else(|_| DEFAULT_PRICE_API_URL.to_string()),
            timeout: Duration::from_millis(env_or("RPC_TIMEOUT_MS", 10_000u64).max(500)),
        }
    }
}

/// Complete tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub ws: WsConfig,
    pub rpc: RpcConfig,
    /// Capacity of the decoded activity broadcast channel
    pub activity_capacity: usize,
}

impl TrackerConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        let ws_url = sanitize_url(
            env::var("WS_URL").map_err(|_| TrackerError::MissingEnvVar("WS_URL".to_string()))?,
        );
        let rpc_url = sanitize_url(
            env::var("RPC_URL").map_err(|_| TrackerError::MissingEnvVar("RPC_URL".to_string()))?,
        );

        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(TrackerError::InvalidConfig(format!(
                "WS_URL must use ws:// or wss://, got {}",
                redact(&ws_url)
            )));
        }
        if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
            return Err(TrackerError::InvalidConfig(format!(
                "RPC_URL must use http:// or https://, got {}",
                redact(&rpc_url)
            )));
        }

        Ok(Self {
            ws: WsConfig::from_env(ws_url),
            rpc: RpcConfig::from_env(rpc_url),
            activity_capacity: env_or("ACTIVITY_CHANNEL_CAPACITY", 256usize).max(1),
        })
    }
}

/// Sanitize URL by removing surrounding quotes and whitespace
pub fn sanitize_url(url: String) -> String {
    let trimmed = url.trim();
    let without_quotes = if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"')
    {
        &trimmed[1..trimmed.len() - 1]
    } else if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    without_quotes.to_string()
}

/// Strip the query string so API keys never reach the logs
pub fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?<redacted>", base),
        None => url.to_string(),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
        .unwrap_or(default)
}
