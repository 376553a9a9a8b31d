use serde::{Deserialize, Serialize};

/// A token balance that moved in one direction for the observed wallet
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceChange {
    pub mint: String,
    /// Magnitude of the change, always positive
    pub amount: f64,
}

/// An inferred exchange of one token for another within a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapEvent {
    #[serde(rename = "sentAddress")]
    pub sent_mint: String,
    pub sent_amount: f64,
    pub sent_symbol: String,
    #[serde(rename = "receivedAddress")]
    pub received_mint: String,
    pub received_amount: f64,
    pub received_symbol: String,
}
