//! Error types for the Creditcoin SDK

use rust_decimal::Decimal;
use thiserror::Error;

/// Root error for every SDK operation
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Invalid address: {address}")]
    InvalidAddress { address: String },

    #[error("Transaction error: {0}")]
    Transaction(#[from] TxError),

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Keypair error: {0}")]
    Keypair(#[from] KeypairError),

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Node connection and RPC errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Node unreachable at {url}")]
    Unreachable { url: String },

    #[error("Node returned error: {message}")]
    Rpc { message: String },

    #[error("Node request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Failed to decode node response: {0}")]
    Decode(String),
}

/// Extrinsic signing and submission errors
#[derive(Debug, Error)]
pub enum TxError {
    /// The chain rejected the extrinsic or its dispatch failed. `message` is
    /// the chain's own text, unmodified.
    #[error("Transaction rejected: {message}")]
    Rejected { message: String },

    #[error("Failed to sign extrinsic: {message}")]
    Signing { message: String },

    #[error("Extrinsic {tx_hash} reported as included without a block hash")]
    MissingInclusion { tx_hash: String },
}

/// Mnemonic and key derivation errors
#[derive(Debug, Error)]
pub enum KeypairError {
    #[error("Unsupported mnemonic word count {0} (expected 12, 15, 18, 21 or 24)")]
    InvalidWordCount(usize),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid secret URI: {0}")]
    InvalidUri(String),

    #[error("Cannot decode address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Marketplace model errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to decode {record} record {key}: {message}")]
    RecordDecode {
        record: &'static str,
        key: String,
        message: String,
    },

    #[error("Invalid loan terms: {reason}")]
    InvalidTerms { reason: String },
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable, machine-friendly error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network_error",
            Self::InvalidAddress { .. } => "invalid_address",
            Self::Transaction(_) => "transaction_error",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::Keypair(_) => "keypair_error",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::Protocol(ProtocolError::RecordDecode { .. }) => "record_decode",
            Self::Protocol(ProtocolError::InvalidTerms { .. }) => "invalid_terms",
            Self::Config(_) => "config_error",
        }
    }

    /// Whether retrying the same request after a backoff can succeed.
    ///
    /// Only connectivity failures qualify. Resubmitting a signed extrinsic is
    /// never considered retryable since nonces are not tracked across attempts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::InvalidAmount {
            message: message.into(),
        }
    }

    pub fn invalid_terms(reason: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InvalidTerms {
            reason: reason.into(),
        })
    }
}
