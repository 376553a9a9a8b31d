use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Postgres settings for the account and token stores
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Max wait for a pooled connection
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Apply the embedded schema on connect
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// `None` when DATABASE_URL is unset; the tracker then keeps state in memory
    pub fn from_env() -> Option<Self> {
        let url = env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty())?;
        let defaults = Self::new(url.trim());

        let max_connections = env_or("DATABASE_MAX_CONNECTIONS", defaults.max_connections).max(1);
        Some(Self {
            max_connections,
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", defaults.min_connections)
                .min(max_connections),
            acquire_timeout: Duration::from_secs(env_or(
                "DATABASE_CONNECT_TIMEOUT",
                defaults.acquire_timeout.as_secs(),
            )),
            idle_timeout: Duration::from_secs(env_or(
                "DATABASE_IDLE_TIMEOUT",
                defaults.idle_timeout.as_secs(),
            )),
            run_migrations: env::var("DATABASE_RUN_MIGRATIONS")
                .map(|s| !matches!(s.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.run_migrations),
            ..defaults
        })
    }

    /// Host and database name without credentials, for logs
    pub fn display_target(&self) -> String {
        let without_scheme = self.url.split_once("://").map_or(self.url.as_str(), |(_, rest)| rest);
        let host = without_scheme.rsplit_once('@').map_or(without_scheme, |(_, host)| host);
        host.split('?').next().unwrap_or(host).to_string()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
