pub mod address;
pub mod crypto;
pub mod error;
pub mod hash;

pub use address::Address;
pub use crypto::{public_key_from_bytes, sign_message, verify_message, KeyPair, PrivateKey, PublicKey, Signature};
pub use error::BlockchainError;
pub use hash::Hash256;

pub type Result<T> = std::result::Result<T, BlockchainError>;
