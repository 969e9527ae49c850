use crate::hash::Hash256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network-specific address prefix
pub const MAINNET_PREFIX: &str = "AXN";
pub const TESTNET_PREFIX: &str = "TXN";
const COINBASE_SUFFIX: &str = "COINBASE0000000000000000000000000000000";

/// An account address: `prefix ∥ first 40 hex chars of SHA-256(public key hex)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Derives an address from an uncompressed/compressed public key's hex encoding
    #[must_use]
    pub fn from_public_key_hex(prefix: &str, public_key_hex: &str) -> Self {
        let digest = Hash256::sha256(public_key_hex.as_bytes()).to_hex();
        Self(format!("{prefix}{}", &digest[..40]))
    }

    /// Sentinel address used as the sender of coinbase (block reward) transactions
    #[must_use]
    pub fn coinbase(prefix: &str) -> Self {
        Self(format!("{prefix}{COINBASE_SUFFIX}"))
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.0.ends_with(COINBASE_SUFFIX)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the network prefix this address was derived under. Both
    /// `MAINNET_PREFIX` and `TESTNET_PREFIX` are 3 ASCII characters.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.0[..3]
    }

    /// Wraps an already-formatted address string (e.g. loaded from storage or genesis)
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
