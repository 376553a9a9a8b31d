use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database model for wallets table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbWallet {
    pub id: i64,
    pub address: String,
    pub subscription_active: bool,
    pub created_at: DateTime<Utc>,
}
