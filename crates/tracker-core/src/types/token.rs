use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name and symbol read from a token's metadata account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameAndSymbol {
    pub name: String,
    pub symbol: String,
}

/// Enriched token metadata assembled per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    #[serde(rename = "token_address")]
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub supply: f64,
    /// USD spot price
    pub price: f64,
    pub created_at: DateTime<Utc>,
    /// Fully diluted value: price * supply
    pub fdv: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socials: Option<String>,
}

impl TokenSnapshot {
    /// Search link used as the token's social entry point
    pub fn socials_link(address: &str) -> String {
        format!("https://x.com/search?q={}", address)
    }
}
