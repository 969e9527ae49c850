use shared::BlockchainError;
use thiserror::Error;

/// Typed error kinds surfaced at the ledger API boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid transaction format: {0}")]
    InvalidFormat(String),

    #[error("amount below minimum transaction amount")]
    DustAmount,

    #[error("signature verification failed")]
    BadSignature,

    #[error("public key does not derive to the declared sender address")]
    AddressMismatch,

    #[error("nonce {actual} does not match expected {expected}")]
    BadNonce { expected: u64, actual: u64 },

    #[error("sender address is protected and does not allow this transaction type")]
    ProtectedAddressViolation,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("mempool is full")]
    MempoolFull,

    #[error("duplicate transaction id")]
    DuplicateTxid,

    #[error("coinbase transaction misuse: {0}")]
    CoinbaseMisuse(String),

    #[error("block does not link to the current tip")]
    InvalidBlockLink,

    #[error("block hash does not satisfy the declared proof of work")]
    InvalidPoW,

    #[error("merkle root does not match block transactions")]
    BadMerkleRoot,

    #[error("block timestamp is too far in the future")]
    FutureTimestamp,

    #[error("block timestamp does not exceed previous block's timestamp")]
    NonMonotonicTimestamp,

    #[error("applying this block would exceed the maximum supply")]
    SupplyCapExceeded,

    #[error("reorg would replace a suffix deeper than the allowed bound")]
    ReorgTooDeep,

    #[error("genesis payload hash does not match the pinned safe hash")]
    GenesisHashMismatch,

    #[error("operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Crypto(#[from] CryptoErrorShim),
}

/// Wraps `shared::BlockchainError` so it can derive `Clone`/`PartialEq`,
/// which the underlying `thiserror`-derived type does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoErrorShim(pub String);

impl std::fmt::Display for CryptoErrorShim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BlockchainError> for LedgerError {
    fn from(err: BlockchainError) -> Self {
        Self::Crypto(CryptoErrorShim(err.to_string()))
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
