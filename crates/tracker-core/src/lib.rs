pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{ReconnectConfig, RpcConfig, TrackerConfig, WsConfig};
pub use error::{Result, TrackerError};
pub use traits::{AccountStore, TokenDataProvider, TokenStore, TransactionSource, WalletFeed};
