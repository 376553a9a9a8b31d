use serde::{Deserialize, Serialize};

/// A tracked on-chain address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub address: String,
    /// True while at least one subscription row references this wallet
    pub subscription_active: bool,
}

/// A user identified by an external account id (e.g. a chat platform id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub external_id: i64,
}

/// One user's interest in one wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: i64,
    pub wallet_id: i64,
    pub wallet_address: String,
}
