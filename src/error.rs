//! Error type shared by the chain client, the exercise script, and the gateway.

use thiserror::Error;

/// Errors raised while talking to the ballot and token contracts.
#[derive(Debug, Error)]
pub enum BallotError {
    #[error("transport error: {0}")]
    /// HTTP or network failure reaching the JSON-RPC endpoint.
    Transport(String),
    #[error("rpc error {code}: {message}")]
    /// JSON-RPC error object returned by the node (reverts land here).
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Node-supplied error message.
        message: String,
    },
    #[error("abi error: {0}")]
    /// Call encoding, result decoding, or unknown function.
    Abi(String),
    #[error("invalid address: {0}")]
    /// Address string was not 20 bytes of `0x` hex.
    InvalidAddress(String),
    #[error("invalid amount: {0}")]
    /// Amount was not an unsigned base-unit integer, or failed validation.
    InvalidAmount(String),
    #[error("invalid input: {0}")]
    /// Request failed validation before any remote call.
    InvalidInput(String),
    #[error("signer error: {0}")]
    /// Private key could not be parsed or used.
    Signer(String),
    #[error("{0} is not set")]
    /// Required configuration value was absent when a call needed it.
    MissingConfig(&'static str),
    #[error("artifact error: {0}")]
    /// Contract artifact could not be loaded or lacks bytecode.
    Artifact(String),
    #[error("transaction {hash} reverted")]
    /// Receipt reported `status == 0`.
    TxFailed {
        /// Hash of the failed transaction.
        hash: String,
    },
    #[error("receipt for {hash} not available after {polls} polls")]
    /// Receipt wait gave up after the configured poll bound.
    ReceiptTimeout {
        /// Hash of the pending transaction.
        hash: String,
        /// Number of polls performed.
        polls: u32,
    },
    #[error("io error: {0}")]
    /// Filesystem failure.
    Io(#[from] std::io::Error),
}

impl BallotError {
    /// True when the error stems from caller input rather than the chain or config.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_) | Self::InvalidAmount(_) | Self::InvalidInput(_)
        )
    }
}

impl From<alloy_dyn_abi::Error> for BallotError {
    fn from(err: alloy_dyn_abi::Error) -> Self {
        Self::Abi(err.to_string())
    }
}

impl From<alloy_primitives::utils::UnitsError> for BallotError {
    fn from(err: alloy_primitives::utils::UnitsError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}

impl From<reqwest::Error> for BallotError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, BallotError>;
