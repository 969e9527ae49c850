use thiserror::Error;

/// Low-level errors from the cryptographic and hashing primitives.
///
/// Ledger-level validation failures (bad signatures in context, double
/// spends, consensus rule violations) live in `ledger_core::error::LedgerError`
/// and wrap these where a lower-level primitive failed underneath them.
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("invalid hash encoding")]
    InvalidHash,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("cryptographic error: {0}")]
    CryptographicError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
