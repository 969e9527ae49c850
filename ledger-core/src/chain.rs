//! Chain manager (`spec.md` §4.8): append preconditions, historical
//! replay, and bounded reorgs.

use crate::block::Block;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::nonce::NonceTracker;
use crate::supply::{clip_to_supply_cap, reward_schedule};
use crate::utxo::UtxoSet;
use crate::validator::{self, ProtectedPolicy, ValidationContext};
use rust_decimal::Decimal;
use shared::Hash256;
use std::collections::HashMap;
use tracing::{info, warn};

/// A sparsely-populated, append-only checkpoint: once recorded, a reorg may
/// not cross behind it.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    pub height: u64,
    pub hash: Hash256,
}

/// The canonical chain plus the committed UTXO/nonce state it implies.
/// Mempool and reservation-map state live one layer up, in `Ledger`.
pub struct Chain {
    blocks: Vec<Block>,
    block_index: HashMap<Hash256, usize>,
    utxo_set: UtxoSet,
    nonces: NonceTracker,
    checkpoints: Vec<Checkpoint>,
    supply: Decimal,
    config: LedgerConfig,
}

impl Chain {
    /// Bootstraps the chain from a vetted genesis block: every genesis
    /// transaction mints its `amount` directly to `recipient` (there is
    /// nothing to spend from at height 0).
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::GenesisHashMismatch` semantics are the caller's
    /// responsibility (see `genesis.rs`); this constructor only checks the
    /// block's internal shape.
    pub fn from_genesis(config: LedgerConfig, genesis: Block) -> Result<Self, LedgerError> {
        if genesis.index != 0 {
            return Err(LedgerError::InvalidFormat("genesis block must have index 0".to_string()));
        }
        if genesis.previous_hash != Hash256::zero() {
            return Err(LedgerError::InvalidFormat(
                "genesis block must have a zero previous_hash".to_string(),
            ));
        }
        if genesis.hash != genesis.compute_hash() {
            return Err(LedgerError::InvalidPoW);
        }
        if genesis.merkle_root != genesis.compute_merkle_root() {
            return Err(LedgerError::BadMerkleRoot);
        }

        let mut utxo_set = UtxoSet::new();
        let mut supply = Decimal::ZERO;
        for tx in &genesis.transactions {
            utxo_set.credit(tx.recipient.clone(), tx.txid, tx.amount, 0);
            supply += tx.amount;
        }

        let mut block_index = HashMap::new();
        block_index.insert(genesis.hash, 0);

        Ok(Self {
            blocks: vec![genesis],
            block_index,
            utxo_set,
            nonces: NonceTracker::new(),
            checkpoints: Vec::new(),
            supply,
            config,
        })
    }

    /// Reconstructs a chain from blocks already known-valid (e.g. blocks
    /// read back from persistence) plus a trusted UTXO snapshot, skipping
    /// the per-block replay `validate_against` would otherwise redo. Only
    /// the nonce table and checkpoint list are recomputed, both cheap scans
    /// with no cryptographic re-verification.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidFormat` if `blocks` is empty or its
    /// first entry isn't a genesis block.
    pub fn from_trusted_snapshot(
        config: LedgerConfig,
        blocks: Vec<Block>,
        utxo_set: UtxoSet,
        supply: Decimal,
    ) -> Result<Self, LedgerError> {
        let Some(genesis) = blocks.first() else {
            return Err(LedgerError::InvalidFormat("no blocks to rebuild from".to_string()));
        };
        if !genesis.is_genesis() {
            return Err(LedgerError::InvalidFormat("first block is not genesis".to_string()));
        }

        let mut nonces = NonceTracker::new();
        let mut block_index = HashMap::new();
        let mut checkpoints = Vec::new();
        for block in &blocks {
            block_index.insert(block.hash, block_index.len());
            for tx in &block.transactions {
                if let Some(nonce) = tx.nonce {
                    nonces.commit(tx.sender.clone(), nonce);
                }
            }
            if block.index != 0 && block.index % config.checkpoint_interval == 0 {
                checkpoints.push(Checkpoint {
                    height: block.index,
                    hash: block.hash,
                });
            }
        }

        Ok(Self {
            blocks,
            block_index,
            utxo_set,
            nonces,
            checkpoints,
            supply,
            config,
        })
    }

    #[must_use]
    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("genesis always present")
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.tip().index
    }

    #[must_use]
    pub fn supply(&self) -> Decimal {
        self.supply
    }

    #[must_use]
    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    #[must_use]
    pub fn nonces(&self) -> &NonceTracker {
        &self.nonces
    }

    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    #[must_use]
    pub fn block_by_height(&self, height: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(height).ok()?)
    }

    #[must_use]
    pub fn block_by_hash(&self, hash: &Hash256) -> Option<&Block> {
        self.block_index.get(hash).map(|&i| &self.blocks[i])
    }

    /// Validates and appends `block`, per the nine preconditions of
    /// `spec.md` §4.8. On success, commits the resulting UTXO set, nonce
    /// table, and supply atomically; on failure, leaves all state untouched.
    ///
    /// # Errors
    ///
    /// Returns the first violated precondition's error kind.
    pub fn append(
        &mut self,
        block: Block,
        protected_addresses: &HashMap<shared::Address, ProtectedPolicy>,
        now: i64,
    ) -> Result<(), LedgerError> {
        let height = self.height() + 1;
        let (new_utxo_set, new_nonces, new_supply) =
            self.validate_against(&block, height, protected_addresses, now)?;

        let hash = block.hash;
        let index = self.blocks.len();
        self.utxo_set = new_utxo_set;
        self.nonces = new_nonces;
        self.supply = new_supply;
        self.blocks.push(block);
        self.block_index.insert(hash, index);

        if height % self.config.checkpoint_interval == 0 {
            self.checkpoints.push(Checkpoint { height, hash });
        }

        info!(height, %hash, "appended block");
        Ok(())
    }

    /// Runs the §4.8 preconditions against `self`'s *committed* state
    /// without mutating it, returning the state the block would produce.
    fn validate_against(
        &self,
        block: &Block,
        expected_height: u64,
        protected_addresses: &HashMap<shared::Address, ProtectedPolicy>,
        now: i64,
    ) -> Result<(UtxoSet, NonceTracker, Decimal), LedgerError> {
        let tip = self.tip();

        if block.index != expected_height {
            return Err(LedgerError::InvalidBlockLink);
        }
        if block.previous_hash != tip.hash {
            return Err(LedgerError::InvalidBlockLink);
        }
        if block.timestamp < tip.timestamp {
            return Err(LedgerError::NonMonotonicTimestamp);
        }
        if block.timestamp > now + self.config.max_future_drift_seconds {
            return Err(LedgerError::FutureTimestamp);
        }
        if block.hash != block.compute_hash() {
            return Err(LedgerError::InvalidPoW);
        }
        if !block.hash.meets_difficulty(block.difficulty) {
            return Err(LedgerError::InvalidPoW);
        }
        if block.merkle_root != block.compute_merkle_root() {
            return Err(LedgerError::BadMerkleRoot);
        }

        let [coinbase, body @ ..] = block.transactions.as_slice() else {
            return Err(LedgerError::CoinbaseMisuse("block has no transactions".to_string()));
        };
        if !coinbase.is_coinbase() {
            return Err(LedgerError::CoinbaseMisuse("first transaction is not coinbase".to_string()));
        }
        if body.iter().any(|tx| tx.is_coinbase()) {
            return Err(LedgerError::CoinbaseMisuse("multiple coinbase transactions".to_string()));
        }

        let mut scratch_utxo = self.utxo_set.clone();
        let mut scratch_nonces = self.nonces.clone();
        let mut total_fees = Decimal::ZERO;

        for tx in body {
            let ctx = ValidationContext {
                config: &self.config,
                utxo_set: &scratch_utxo,
                nonces: &scratch_nonces,
                reserved_txids: &HashMap::new(),
                protected_addresses,
                now,
                height: expected_height,
            };
            let validated = validator::validate(tx, &ctx)?;

            scratch_utxo.apply_spend(
                &tx.sender,
                &validated.chosen_slots,
                tx.amount,
                tx.fee,
                tx.txid,
                expected_height,
            )?;
            scratch_utxo.credit(tx.recipient.clone(), tx.txid, tx.amount, expected_height);
            if let Some(nonce) = tx.nonce {
                scratch_nonces.commit(tx.sender.clone(), nonce);
            }
            total_fees += tx.fee;
        }

        let base_reward = clip_to_supply_cap(
            reward_schedule(expected_height, self.config.initial_block_reward, self.config.halving_interval),
            self.supply,
            self.config.max_supply,
        );
        if coinbase.amount > base_reward + total_fees {
            return Err(LedgerError::CoinbaseMisuse(
                "coinbase amount exceeds reward + fees".to_string(),
            ));
        }
        scratch_utxo.credit(coinbase.recipient.clone(), coinbase.txid, coinbase.amount, expected_height);

        let new_supply = self.supply + coinbase.amount;
        if new_supply > self.config.max_supply {
            return Err(LedgerError::SupplyCapExceeded);
        }

        Ok((scratch_utxo, scratch_nonces, new_supply))
    }

    /// Replays the entire chain from genesis against a fresh scratch state,
    /// per `spec.md` §4.8's `validate_chain()`.
    ///
    /// # Errors
    ///
    /// Returns the first precondition violated by any historical block.
    pub fn validate_chain(&self, protected_addresses: &HashMap<shared::Address, ProtectedPolicy>) -> Result<(), LedgerError> {
        let genesis = &self.blocks[0];
        if genesis.hash != genesis.compute_hash() || genesis.merkle_root != genesis.compute_merkle_root() {
            return Err(LedgerError::GenesisHashMismatch);
        }

        let mut replay = Self::from_genesis(self.config.clone(), genesis.clone())?;
        for block in &self.blocks[1..] {
            replay.append(block.clone(), protected_addresses, block.timestamp + self.config.max_future_drift_seconds)?;
        }
        Ok(())
    }

    /// Attempts a reorg onto `candidate`, a full alternative chain sharing a
    /// prefix with `self`. Fails closed (state untouched) unless the
    /// candidate is longer, its fork point is within `max_reorg_depth` of
    /// the current tip, and the fork point is no earlier than the most
    /// recent checkpoint. Ties in cumulative work favor the current chain.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ReorgTooDeep` if the fork is too deep or
    /// crosses a checkpoint; otherwise the first validation failure of the
    /// candidate chain.
    pub fn try_reorg(
        &mut self,
        candidate: Vec<Block>,
        protected_addresses: &HashMap<shared::Address, ProtectedPolicy>,
        now: i64,
    ) -> Result<(), LedgerError> {
        let fork_height = fork_point(&self.blocks, &candidate);
        let depth = self.height().saturating_sub(fork_height);
        if depth > self.config.max_reorg_depth {
            return Err(LedgerError::ReorgTooDeep);
        }
        if let Some(checkpoint) = self.checkpoints.last() {
            if fork_height < checkpoint.height {
                return Err(LedgerError::ReorgTooDeep);
            }
        }

        let candidate_height = candidate.last().map_or(0, |b| b.index);
        if candidate_height <= self.height() {
            return Err(LedgerError::ReorgTooDeep);
        }

        let genesis = self.blocks[0].clone();
        let mut replay = Self::from_genesis(self.config.clone(), genesis)?;
        for block in candidate.into_iter().skip(1) {
            replay.append(block, protected_addresses, now)?;
        }

        if cumulative_work(&replay.blocks) < cumulative_work(&self.blocks) {
            warn!("candidate reorg chain has less cumulative work, keeping current tip");
            return Err(LedgerError::ReorgTooDeep);
        }

        info!(new_height = replay.height(), "reorg applied");
        *self = replay;
        Ok(())
    }
}

/// Highest height at which `current` and `candidate` still agree on the
/// block hash.
fn fork_point(current: &[Block], candidate: &[Block]) -> u64 {
    let mut height = 0u64;
    for (a, b) in current.iter().zip(candidate.iter()) {
        if a.hash != b.hash {
            break;
        }
        height = a.index;
    }
    height
}

fn cumulative_work(blocks: &[Block]) -> u64 {
    blocks.iter().map(|b| u64::from(b.difficulty)).sum()
}
