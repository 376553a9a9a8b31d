use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Price not found: {0}")]
    PriceNotFound(String),

    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Request id {0} is already outstanding")]
    DuplicateRequestId(u64),

    #[error("Wallet is not subscribed: {0}")]
    NotSubscribed(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("WebSocket disconnected")]
    WebSocketDisconnected,

    #[error("WebSocket not connected")]
    NotConnected,

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Failed to fetch token {attribute}: {source}")]
    TokenLookup {
        attribute: &'static str,
        #[source]
        source: Box<TrackerError>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    /// Wrap a lookup failure with the attribute that was being fetched
    pub fn lookup(attribute: &'static str, source: TrackerError) -> Self {
        TrackerError::TokenLookup {
            attribute,
            source: Box::new(source),
        }
    }

    /// The error beneath any `TokenLookup` wrapping
    pub fn root_cause(&self) -> &TrackerError {
        match self {
            TrackerError::TokenLookup { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True for the recoverable "row does not exist" family, looking through
    /// `TokenLookup`
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root_cause(),
            TrackerError::WalletNotFound(_)
                | TrackerError::UserNotFound(_)
                | TrackerError::TokenNotFound(_)
                | TrackerError::PriceNotFound(_)
        )
    }

    /// Short label used for the errors-by-type metric
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::MissingEnvVar(_) | TrackerError::InvalidConfig(_) => "config",
            TrackerError::InvalidAddress(_) => "invalid_address",
            TrackerError::WalletNotFound(_)
            | TrackerError::UserNotFound(_)
            | TrackerError::TokenNotFound(_)
            | TrackerError::PriceNotFound(_) => "not_found",
            TrackerError::Remote { .. } => "remote",
            TrackerError::Timeout(_) => "timeout",
            TrackerError::Cancelled(_) => "cancelled",
            TrackerError::DuplicateRequestId(_) | TrackerError::NotSubscribed(_) => "protocol",
            TrackerError::WebSocket(_)
            | TrackerError::WebSocketDisconnected
            | TrackerError::NotConnected => "transport",
            TrackerError::Rpc(_) => "rpc",
            TrackerError::Decode(_) => "decode",
            TrackerError::TokenLookup { .. } => "token_lookup",
            TrackerError::Database(_) => "database",
            TrackerError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
