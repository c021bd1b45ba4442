//! Error types for the blob relayer

use thiserror::Error;

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum SubmitterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Empty input to {component}")]
    EmptyInput { component: &'static str },

    #[error("Payload of {payload_len} bytes needs {required} blobs, limit is {max_blobs}")]
    PayloadTooLarge {
        payload_len: usize,
        required: usize,
        max_blobs: usize,
    },

    #[error("Invalid commitment: expected {expected} bytes, got {actual}")]
    InvalidCommitment { expected: usize, actual: usize },

    #[error("Chain query {query} failed: {message}")]
    ChainQuery { query: &'static str, message: String },

    #[error("Fee overflow computing {field}")]
    FeeOverflow { field: &'static str },

    #[error("Sidecar mismatch: {0}")]
    SidecarMismatch(String),

    #[error("KZG commitment error for blob {blob_index}: {message}")]
    Commitment { blob_index: usize, message: String },

    #[error("Submission of tx {tx_hash} failed: {message}")]
    Submission { tx_hash: String, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SubmitterError {
    /// Check if error is retryable by an outer caller.
    ///
    /// The pipeline itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitterError::ChainQuery { .. } | SubmitterError::Timeout { .. }
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            SubmitterError::SidecarMismatch(_)
                | SubmitterError::FeeOverflow { .. }
                | SubmitterError::Wallet(_)
        )
    }
}

/// Result type for relayer operations
pub type SubmitterResult<T> = Result<T, SubmitterError>;
