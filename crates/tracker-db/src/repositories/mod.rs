mod subscription;
mod token;
mod user;
mod wallet;

pub use subscription::SubscriptionRepository;
pub use token::TokenRepository;
pub use user::UserRepository;
pub use wallet::WalletRepository;
