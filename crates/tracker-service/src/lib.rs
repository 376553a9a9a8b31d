//! Wallet tracking on top of the subscription channel, the RPC clients and
//! the stores.

pub mod account;
pub mod monitor;
pub mod swap;
pub mod token;
pub mod tracker;

#[cfg(test)]
pub(crate) mod fakes;

pub use account::AccountService;
pub use monitor::ActivityMonitor;
pub use token::TokenAggregator;
pub use tracker::WalletTracker;
