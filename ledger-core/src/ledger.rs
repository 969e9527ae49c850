//! The `Ledger` handle (`spec.md` §5, §6): one reader-writer-locked state
//! bundle exposing the core API consumed by peripheral collaborators.

use crate::chain::Chain;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::mempool::Mempool;
use crate::mining::{self, CancellationToken};
use crate::transaction::Transaction;
use crate::validator::ProtectedPolicy;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use shared::{Address, Hash256};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Events a subscriber can observe, per `spec.md` §6.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    BlockAppended { height: u64, hash: Hash256 },
    TxAdmitted { txid: Hash256 },
    TxConfirmed { txid: Hash256, height: u64 },
    Reorg { new_height: u64 },
}

struct LedgerState {
    chain: Chain,
    mempool: Mempool,
    protected_addresses: HashMap<Address, ProtectedPolicy>,
}

/// One ledger handle shared by every caller. Readers (`balance`, `history`,
/// `tip`, ...) take the shared lock; writers (`submit_transaction`,
/// `mine_block`, reorgs, checkpoints) take it exclusively.
pub struct Ledger {
    state: RwLock<LedgerState>,
    events: broadcast::Sender<LedgerEvent>,
}

impl Ledger {
    #[must_use]
    pub fn new(chain: Chain, protected_addresses: HashMap<Address, ProtectedPolicy>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(LedgerState {
                chain,
                mempool: Mempool::new(),
                protected_addresses,
            }),
            events,
        }
    }

    /// Subscribes to ledger events. Drop the receiver to unsubscribe.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: LedgerEvent) {
        // A subscriber lagging or having dropped its receiver never blocks
        // core acceptance.
        let _ = self.events.send(event);
    }

    /// Validates and admits `tx` into the mempool.
    ///
    /// # Errors
    ///
    /// Returns the validator's rejection reason.
    pub fn submit_transaction(&self, tx: Transaction, now: i64) -> Result<Hash256, LedgerError> {
        let mut state = self.state.write();
        let LedgerState {
            chain,
            mempool,
            protected_addresses,
        } = &mut *state;

        let txid = tx.txid;
        let height = chain.height();
        match mempool.admit(tx, chain.config(), chain.utxo_set(), chain.nonces(), protected_addresses, now, height) {
            Ok(()) => {
                drop(state);
                self.publish(LedgerEvent::TxAdmitted { txid });
                Ok(txid)
            }
            Err(err) => {
                warn!(%txid, error = %err, "rejected transaction admission");
                Err(err)
            }
        }
    }

    /// Assembles and mines the next block: drains the mempool, builds the
    /// coinbase, and searches for a valid nonce. Honors `cancel`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Cancelled` if mining is cancelled, or a chain
    /// append error if the mined block somehow fails its own preconditions.
    pub fn mine_block(&self, miner: Address, cancel: &CancellationToken, now: i64) -> Result<Hash256, LedgerError> {
        let (index, timestamp, previous_hash, difficulty, body, base_reward) = {
            let state = self.state.read();
            let height = state.chain.height() + 1;
            let body = state.chain.config().clone();
            let reward = crate::supply::clip_to_supply_cap(
                crate::supply::reward_schedule(height, body.initial_block_reward, body.halving_interval),
                state.chain.supply(),
                body.max_supply,
            );
            (
                height,
                now,
                state.chain.tip().hash,
                body.initial_difficulty,
                state.mempool.drain_for_block(),
                reward,
            )
        };

        let total_fees: Decimal = body.iter().map(|p| p.transaction.fee).sum();
        let coinbase = Transaction::coinbase(miner, base_reward + total_fees, index, timestamp);
        let transactions: Vec<Transaction> = body.iter().map(|p| p.transaction.clone()).collect();

        let mined = mining::mine_block(index, timestamp, previous_hash, coinbase, transactions, difficulty, cancel)?;
        let hash = mined.block.hash;

        let mut state = self.state.write();
        let protected_addresses = state.protected_addresses.clone();
        state.chain.append(mined.block, &protected_addresses, now)?;
        for pending in &body {
            state.mempool.evict(&pending.transaction.txid);
        }
        drop(state);

        info!(%hash, attempts = mined.attempts, "mined block");
        self.publish(LedgerEvent::BlockAppended { height: index, hash });
        Ok(hash)
    }

    #[must_use]
    pub fn balance(&self, address: &Address) -> Decimal {
        let state = self.state.read();
        state.chain.utxo_set().balance(address, state.chain.height())
    }

    /// Clones the current UTXO set, e.g. to write a persistence snapshot.
    #[must_use]
    pub fn utxo_snapshot(&self) -> crate::utxo::UtxoSet {
        self.state.read().chain.utxo_set().clone()
    }

    #[must_use]
    pub fn history(&self, address: &Address) -> Vec<crate::utxo::UtxoEntry> {
        let state = self.state.read();
        state.chain.utxo_set().entries_for(address).to_vec()
    }

    #[must_use]
    pub fn get_block_by_height(&self, height: u64) -> Option<crate::block::Block> {
        self.state.read().chain.block_by_height(height).cloned()
    }

    #[must_use]
    pub fn get_block_by_hash(&self, hash: &Hash256) -> Option<crate::block::Block> {
        self.state.read().chain.block_by_hash(hash).cloned()
    }

    #[must_use]
    pub fn tip(&self) -> (u64, Hash256) {
        let state = self.state.read();
        (state.chain.height(), state.chain.tip().hash)
    }

    #[must_use]
    pub fn supply(&self) -> Decimal {
        self.state.read().chain.supply()
    }

    /// Replays the chain from genesis, checking every §4.8 precondition.
    ///
    /// # Errors
    ///
    /// Returns the first precondition violated by any historical block.
    pub fn validate_chain(&self) -> Result<(), LedgerError> {
        let state = self.state.read();
        state.chain.validate_chain(&state.protected_addresses)
    }

    pub fn register_protected_address(&self, address: Address, policy: ProtectedPolicy) {
        self.state.write().protected_addresses.insert(address, policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionType;
    use rust_decimal_macros::dec;
    use shared::address::TESTNET_PREFIX;
    use std::collections::BTreeMap;

    fn genesis_chain(recipient: &Address, amount: Decimal) -> Chain {
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
        let block = crate::block::Block::new(0, 1_700_000_000, Hash256::zero(), vec![tx], 1, 0);
        let mut config = LedgerConfig::testnet();
        config.initial_difficulty = 1;
        Chain::from_genesis(config, block).unwrap()
    }

    #[test]
    fn mining_a_block_credits_the_miner_and_advances_tip() {
        let funded = Address::from_public_key_hex(TESTNET_PREFIX, "02funded");
        let chain = genesis_chain(&funded, dec!(1000.0));
        let ledger = Ledger::new(chain, HashMap::new());

        let miner = Address::from_public_key_hex(TESTNET_PREFIX, "02miner");
        let cancel = CancellationToken::new();
        ledger.mine_block(miner.clone(), &cancel, 1_700_000_100).unwrap();

        assert_eq!(ledger.tip().0, 1);
        assert_eq!(ledger.balance(&miner), dec!(12.0));
    }

    #[test]
    fn submitted_transaction_is_included_on_next_mine() {
        use shared::crypto::KeyPair;

        let keypair = KeyPair::generate().unwrap();
        let sender = keypair.address(TESTNET_PREFIX);
        let chain = genesis_chain(&sender, dec!(1000.0));
        let ledger = Ledger::new(chain, HashMap::new());

        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02recipient");
        let mut tx = Transaction::new(
            sender,
            recipient.clone(),
            dec!(5.0),
            dec!(0.1),
            1_700_000_050,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        tx.sign(&keypair).unwrap();
        ledger.submit_transaction(tx, 1_700_000_050).unwrap();

        let miner = Address::from_public_key_hex(TESTNET_PREFIX, "02miner");
        let cancel = CancellationToken::new();
        ledger.mine_block(miner, &cancel, 1_700_000_100).unwrap();

        assert_eq!(ledger.balance(&recipient), dec!(5.0));
    }
}
