//! On-disk persistence (`spec.md` §6): one JSON file per block, a UTXO set
//! snapshot, and the pending-transaction list. Startup re-derives the UTXO
//! set by replaying blocks when the snapshot is absent or inconsistent.

use crate::block::Block;
use crate::chain::Chain;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::mempool::PendingTransaction;
use crate::utxo::UtxoSet;
use crate::validator::ProtectedPolicy;
use rust_decimal::Decimal;
use shared::{Address, Hash256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory layout root. `blocks/`, `checkpoints/`, `utxo_set.json`, and
/// `pending_transactions.json` all live under this path.
pub struct Store {
    root: PathBuf,
}

impl Store {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blocks_dir(&self) -> PathBuf {
        self.root.join("blocks")
    }

    fn block_path(&self, index: u64) -> PathBuf {
        self.blocks_dir().join(format!("{index}.json"))
    }

    fn utxo_snapshot_path(&self) -> PathBuf {
        self.root.join("utxo_set.json")
    }

    fn pending_path(&self) -> PathBuf {
        self.root.join("pending_transactions.json")
    }

    /// Writes `block` to `blocks/<index>.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn persist_block(&self, block: &Block) -> Result<(), LedgerError> {
        let dir = self.blocks_dir();
        fs::create_dir_all(&dir).map_err(|e| LedgerError::InvalidFormat(e.to_string()))?;
        let bytes = serde_json::to_vec_pretty(block).map_err(|e| LedgerError::InvalidFormat(e.to_string()))?;
        fs::write(self.block_path(block.index), bytes).map_err(|e| LedgerError::InvalidFormat(e.to_string()))
    }

    /// Overwrites the UTXO set snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist_utxo_snapshot(&self, utxo_set: &UtxoSet) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec_pretty(utxo_set).map_err(|e| LedgerError::InvalidFormat(e.to_string()))?;
        fs::write(self.utxo_snapshot_path(), bytes).map_err(|e| LedgerError::InvalidFormat(e.to_string()))
    }

    /// Overwrites the pending-transaction list.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist_pending(&self, pending: &[PendingTransaction]) -> Result<(), LedgerError> {
        let transactions: Vec<_> = pending.iter().map(|p| &p.transaction).collect();
        let bytes = serde_json::to_vec_pretty(&transactions).map_err(|e| LedgerError::InvalidFormat(e.to_string()))?;
        fs::write(self.pending_path(), bytes).map_err(|e| LedgerError::InvalidFormat(e.to_string()))
    }

    /// Reads every `blocks/<index>.json` in order, starting from genesis.
    ///
    /// # Errors
    ///
    /// Returns an error if a block file exists but fails to parse.
    pub fn load_blocks(&self) -> Result<Vec<Block>, LedgerError> {
        let dir = self.blocks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut indices = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| LedgerError::InvalidFormat(e.to_string()))? {
            let entry = entry.map_err(|e| LedgerError::InvalidFormat(e.to_string()))?;
            if let Some(index) = parse_block_index(&entry.path()) {
                indices.push(index);
            }
        }
        indices.sort_unstable();

        indices
            .into_iter()
            .map(|index| {
                let bytes = fs::read(self.block_path(index)).map_err(|e| LedgerError::InvalidFormat(e.to_string()))?;
                serde_json::from_slice(&bytes).map_err(|e| LedgerError::InvalidFormat(e.to_string()))
            })
            .collect()
    }

    fn load_utxo_snapshot(&self) -> Option<UtxoSet> {
        let bytes = fs::read(self.utxo_snapshot_path()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Rebuilds a `Chain` from disk: tries the UTXO snapshot first, and only
    /// falls back to replaying every persisted block from genesis if the
    /// snapshot is missing or its implied supply disagrees with the blocks'
    /// own recorded supply.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidFormat` if no genesis block is on disk,
    /// or any error the chain replay itself rejects.
    pub fn rebuild_chain(
        &self,
        config: LedgerConfig,
        protected_addresses: &HashMap<Address, ProtectedPolicy>,
    ) -> Result<Chain, LedgerError> {
        let blocks = self.load_blocks()?;
        if blocks.is_empty() {
            return Err(LedgerError::InvalidFormat("no persisted genesis block found".to_string()));
        }
        let recorded_supply = blocks_supply(&blocks);

        if let Some(snapshot) = self.load_utxo_snapshot() {
            if snapshot.total_unspent() == recorded_supply {
                info!("UTXO snapshot consistent with persisted blocks; skipping replay");
                return Chain::from_trusted_snapshot(config, blocks, snapshot, recorded_supply);
            }
            warn!("UTXO snapshot disagreed with persisted blocks; replaying from genesis");
        } else {
            info!("no UTXO snapshot found; rebuilding from block replay");
        }

        let (genesis, rest) = blocks.split_first().expect("checked non-empty above");
        let mut chain = Chain::from_genesis(config, genesis.clone())?;
        for block in rest {
            chain.append(block.clone(), protected_addresses, block.timestamp + chain.config().max_future_drift_seconds)?;
        }
        Ok(chain)
    }
}

fn parse_block_index(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// Supply implied by `blocks` alone: every genesis transaction's amount plus
/// each later block's coinbase amount, mirroring how `Chain` itself tallies
/// `supply` as it appends blocks.
fn blocks_supply(blocks: &[Block]) -> Decimal {
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            if i == 0 {
                block.transactions.iter().map(|tx| tx.amount).sum()
            } else {
                block.coinbase().map_or(Decimal::ZERO, |tx| tx.amount)
            }
        })
        .sum()
}

/// Loads the persisted pending-transaction list, if any, without validating it.
///
/// # Errors
///
/// Returns an error if the file exists but fails to parse.
pub fn load_pending_unvalidated(store: &Store) -> Result<Vec<crate::transaction::Transaction>, LedgerError> {
    let path = store.pending_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path).map_err(|e| LedgerError::InvalidFormat(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| LedgerError::InvalidFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Transaction, TransactionType};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use shared::address::TESTNET_PREFIX;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn genesis_block(recipient: &Address, amount: Decimal) -> Block {
        let tx = Transaction::new(
            Address::coinbase(TESTNET_PREFIX),
            recipient.clone(),
            amount,
            Decimal::ZERO,
            1_700_000_000,
            None,
            TransactionType::Coinbase,
            BTreeMap::new(),
        );
        Block::new(0, 1_700_000_000, Hash256::zero(), vec![tx], 1, 0)
    }

    #[test]
    fn persisted_block_round_trips() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02genesis");
        let block = genesis_block(&recipient, dec!(1000.0));

        store.persist_block(&block).unwrap();
        let loaded = store.load_blocks().unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hash, block.hash);
    }

    #[test]
    fn rebuild_chain_replays_from_genesis_when_no_snapshot_exists() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02genesis");
        let block = genesis_block(&recipient, dec!(1000.0));
        store.persist_block(&block).unwrap();

        let mut config = LedgerConfig::testnet();
        config.initial_difficulty = 1;
        let chain = store.rebuild_chain(config, &HashMap::new()).unwrap();

        assert_eq!(chain.height(), 0);
        assert_eq!(chain.supply(), dec!(1000.0));
    }

    #[test]
    fn rebuild_chain_trusts_a_consistent_snapshot_without_replaying() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02genesis");
        let block = genesis_block(&recipient, dec!(1000.0));
        store.persist_block(&block).unwrap();

        let mut utxo_set = UtxoSet::new();
        utxo_set.credit(recipient.clone(), block.transactions[0].txid, dec!(1000.0), 0);
        store.persist_utxo_snapshot(&utxo_set).unwrap();

        let mut config = LedgerConfig::testnet();
        config.initial_difficulty = 1;
        let chain = store.rebuild_chain(config, &HashMap::new()).unwrap();

        assert_eq!(chain.height(), 0);
        assert_eq!(chain.supply(), dec!(1000.0));
        assert_eq!(chain.utxo_set().balance(&recipient, 0), dec!(1000.0));
    }

    #[test]
    fn rebuild_chain_falls_back_to_replay_when_snapshot_disagrees() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02genesis");
        let block = genesis_block(&recipient, dec!(1000.0));
        store.persist_block(&block).unwrap();

        let mut stale_snapshot = UtxoSet::new();
        stale_snapshot.credit(recipient.clone(), block.transactions[0].txid, dec!(1.0), 0);
        store.persist_utxo_snapshot(&stale_snapshot).unwrap();

        let mut config = LedgerConfig::testnet();
        config.initial_difficulty = 1;
        let chain = store.rebuild_chain(config, &HashMap::new()).unwrap();

        assert_eq!(chain.supply(), dec!(1000.0));
        assert_eq!(chain.utxo_set().balance(&recipient, 0), dec!(1000.0));
    }
}
