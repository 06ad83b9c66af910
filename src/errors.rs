use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] ethers::providers::WsClientError),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Wallet error: {0}")]
    Wallet(#[from] ethers::signers::WalletError),

    #[error("Other: {0}")]
    Other(String),
}

/// Failure while preparing a transaction, raised before any nonce is reserved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("target address is zero")]
    ZeroTarget,

    #[error("system clock is before the unix epoch")]
    Clock,

    #[error("calldata encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("signing failed: {0}")]
pub struct SignError(pub String);

/// Per-endpoint submission failure. Both variants count as one lost lane in
/// the broadcast race and are never escalated on their own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

/// One lost lane of a broadcast race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    pub endpoint_id: usize,
    pub cause: FailureCause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Transport(String),
    Rejected(String),
    Timeout { after_ms: u64 },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Transport(e) => write!(f, "transport error: {e}"),
            FailureCause::Rejected(e) => write!(f, "rejected: {e}"),
            FailureCause::Timeout { after_ms } => write!(f, "timed out after {after_ms}ms"),
        }
    }
}

impl From<SubmitError> for FailureCause {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Transport(msg) => FailureCause::Transport(msg),
            SubmitError::Rejected(msg) => FailureCause::Rejected(msg),
        }
    }
}

/// Every endpoint failed before any accepted the transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("all {} endpoints failed: {}", .causes.len(), summarize(.causes))]
pub struct AggregateBroadcastFailure {
    pub causes: Vec<EndpointFailure>,
}

fn summarize(causes: &[EndpointFailure]) -> String {
    causes
        .iter()
        .map(|c| format!("#{}: {}", c.endpoint_id, c.cause))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal failure of one dispatch instance.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error("broadcast failed, nonce {nonce} stranded: {source}")]
    Broadcast {
        nonce: u64,
        #[source]
        source: AggregateBroadcastFailure,
    },
}
