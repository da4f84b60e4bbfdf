//! Error types for the bridge core.

use ethers::types::{TxHash, U256};
use thiserror::Error;

use crate::chains::ChainId;
use crate::types::format_amount;

/// Result alias used throughout the crate.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while orchestrating a bridge transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    // ═══════════════════════════════════════════════════════════════════════════════
    // WALLET ERRORS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("no compatible wallet is available")]
    WalletUnavailable,

    #[error("request rejected by the user")]
    UserRejected,

    #[error("wallet exposed no accounts")]
    NoAccounts,

    #[error("wallet is not connected")]
    NotConnected,

    #[error("wrong network: expected chain id {expected}, wallet is on {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("wallet error: {0}")]
    Wallet(String),

    // ═══════════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("a transfer is already in progress for this address")]
    SubmissionInProgress,

    // ═══════════════════════════════════════════════════════════════════════════════
    // CHAIN ERRORS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("query on {chain} failed: {message}")]
    ChainQuery { chain: ChainId, message: String },

    #[error("transaction could not be submitted: {0}")]
    SubmissionFailed(String),

    #[error("transaction {hash:#x} reverted")]
    SubmissionReverted { hash: TxHash },

    #[error("transaction {hash:#x} was dropped before confirmation")]
    TransactionDropped { hash: TxHash },

    #[error("no confirmation for {hash:#x} after {timeout_secs}s")]
    ConfirmationTimeout { hash: TxHash, timeout_secs: u64 },

    // ═══════════════════════════════════════════════════════════════════════════════
    // STORAGE / CONFIG ERRORS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("missing required config: {0}")]
    MissingConfig(String),
}

impl BridgeError {
    pub fn chain_query(chain: ChainId, err: impl std::fmt::Display) -> Self {
        Self::ChainQuery {
            chain,
            message: err.to_string(),
        }
    }

    /// Whether the error was raised before anything reached the chain.
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self,
            Self::WalletUnavailable
                | Self::UserRejected
                | Self::NoAccounts
                | Self::NotConnected
                | Self::WrongNetwork { .. }
                | Self::Validation(_)
                | Self::SubmissionInProgress
                | Self::SubmissionFailed(_)
        )
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Storage(err.to_string())
    }
}

/// Reasons a transfer request is refused before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("source and destination chains must be different (both {})", .0.label())]
    SameChain(ChainId),

    #[error("invalid amount {0:?}")]
    InvalidAmount(String),

    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error(
        "amount {} RUPX exceeds the maximum transfer limit of {} RUPX",
        format_amount(*.amount),
        format_amount(*.max)
    )]
    OverLimit { amount: U256, max: U256 },

    #[error("transfer limit for {} is unknown", .0.label())]
    UnknownLimit(ChainId),
}
