mod account;
mod activity;
mod swap;
mod token;
mod transaction;

pub use account::{Subscription, User, Wallet};
pub use activity::WalletActivity;
pub use swap::{BalanceChange, SwapEvent};
pub use token::{NameAndSymbol, TokenSnapshot};
pub use transaction::{TokenBalance, TransactionRecord, UiTokenAmount};

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
