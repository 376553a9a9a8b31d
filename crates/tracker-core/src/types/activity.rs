use crate::types::SwapEvent;
use serde::{Deserialize, Serialize};

/// Decoded activity for a tracked wallet, published by the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletActivity {
    pub signature: String,
    /// Wallet the notification was issued for, when the subscription is known
    pub wallet: Option<String>,
    pub subscription_id: u64,
    pub slot: u64,
    pub swaps: Vec<SwapEvent>,
}
