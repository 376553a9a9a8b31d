//! Solana JSON-RPC over HTTP and the spot price oracle

pub mod client;
pub mod price;
pub mod provider;
pub mod token;
pub mod transactions;

pub use client::RpcClient;
pub use price::PriceOracle;
pub use provider::SolanaRpcProvider;
