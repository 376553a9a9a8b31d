mod wallet;

pub use wallet::DbWallet;
