//! Genesis loader (`spec.md` §4.10): hashes the genesis payload, checks it
//! against the network's pinned `safe_genesis_hash`, and builds the chain.

use crate::block::Block;
use crate::chain::Chain;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::validator::ProtectedPolicy;
use serde::{Deserialize, Serialize};
use shared::Address;
use std::collections::HashMap;

/// On-disk genesis file shape (`spec.md` §6): a pre-mined genesis block plus
/// the set of addresses that should start out protected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisFile {
    pub block: Block,
    #[serde(default)]
    pub protected_addresses: HashMap<Address, ProtectedPolicy>,
}

/// Parses `raw` as a `GenesisFile`, verifies its SHA-256 against
/// `config.safe_genesis_hash`, and builds a fresh `Chain` plus the protected
/// address table to register with the ledger.
///
/// # Errors
///
/// Returns `LedgerError::GenesisHashMismatch` if `raw`'s hash doesn't match
/// the pinned hash, `LedgerError::InvalidFormat` if it doesn't parse, or
/// whatever `Chain::from_genesis` rejects about the block's own shape.
pub fn load(
    config: LedgerConfig,
    raw: &[u8],
) -> Result<(Chain, HashMap<Address, ProtectedPolicy>), LedgerError> {
    let computed_hash = shared::Hash256::sha256(raw).to_hex();
    if computed_hash != config.safe_genesis_hash {
        return Err(LedgerError::GenesisHashMismatch);
    }

    let genesis_file: GenesisFile =
        serde_json::from_slice(raw).map_err(|e| LedgerError::InvalidFormat(e.to_string()))?;

    let protected_addresses = genesis_file.protected_addresses.clone();
    let chain = Chain::from_genesis(config, genesis_file.block)?;
    Ok((chain, protected_addresses))
}

/// Serializes `genesis` the same way `load` expects to read it back,
/// primarily for building fixtures and the `safe_genesis_hash` pin.
///
/// # Errors
///
/// Returns an error if the genesis file cannot be serialized.
pub fn encode(genesis_file: &GenesisFile) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(genesis_file).map_err(|e| LedgerError::InvalidFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Transaction, TransactionType};
    use rust_decimal_macros::dec;
    use shared::address::TESTNET_PREFIX;
    use shared::Hash256;
    use std::collections::BTreeMap;

    fn sample_genesis_file() -> GenesisFile {
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02genesis");
        let tx = Transaction::new(
            Address::coinbase(TESTNET_PREFIX),
            recipient,
            dec!(1000.0),
            rust_decimal::Decimal::ZERO,
            1_700_000_000,
            None,
            TransactionType::Coinbase,
            BTreeMap::new(),
        );
        let block = Block::new(0, 1_700_000_000, Hash256::zero(), vec![tx], 1, 0);

        let mut protected_addresses = HashMap::new();
        let reserve = Address::from_public_key_hex(TESTNET_PREFIX, "02timecapsule");
        protected_addresses.insert(reserve, ProtectedPolicy::time_capsule_only());

        GenesisFile {
            block,
            protected_addresses,
        }
    }

    #[test]
    fn loads_successfully_when_hash_matches() {
        let genesis_file = sample_genesis_file();
        let raw = encode(&genesis_file).unwrap();
        let mut config = LedgerConfig::testnet();
        config.safe_genesis_hash = Hash256::sha256(&raw).to_hex();

        let (chain, protected) = load(config, &raw).unwrap();
        assert_eq!(chain.height(), 0);
        assert_eq!(protected.len(), 1);
    }

    #[test]
    fn rejects_tampered_genesis_payload() {
        let genesis_file = sample_genesis_file();
        let raw = encode(&genesis_file).unwrap();
        let mut config = LedgerConfig::testnet();
        config.safe_genesis_hash = Hash256::sha256(&raw).to_hex();

        let mut tampered = raw;
        tampered.push(b' ');

        assert_eq!(load(config, &tampered).unwrap_err(), LedgerError::GenesisHashMismatch);
    }
}
