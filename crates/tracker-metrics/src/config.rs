use std::env;
use std::net::SocketAddr;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 9090;

/// Prometheus endpoint settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub host: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl MetricsConfig {
    /// `None` unless `METRICS_PORT` is set or `METRICS_ENABLED` is truthy
    pub fn from_env() -> Option<Self> {
        let port = env::var("METRICS_PORT").ok().and_then(|s| s.trim().parse().ok());
        let enabled = env::var("METRICS_ENABLED")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        if port.is_none() && !enabled {
            return None;
        }

        Some(Self {
            host: env::var("METRICS_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: port.unwrap_or(DEFAULT_PORT),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> crate::Result<SocketAddr> {
        self.address()
            .parse()
            .map_err(|e| crate::MetricsError::Server(format!("invalid metrics address: {e}")))
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_address() {
        let config = MetricsConfig::default();
        assert_eq!(config.address(), "0.0.0.0:9090");
        assert_eq!(config.socket_addr().unwrap().port(), 9090);
    }

    #[test]
    fn test_bad_host_is_rejected() {
        let config = MetricsConfig {
            host: "not a host".to_string(),
            port: 1,
        };
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy(" TRUE "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
