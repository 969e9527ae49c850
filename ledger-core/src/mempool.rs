//! FIFO-ordered, size-bounded transaction pool (`spec.md` §4.6).

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::nonce::NonceTracker;
use crate::transaction::Transaction;
use crate::utxo::UtxoSet;
use crate::validator::{self, ProtectedPolicy, ValidationContext};
use shared::{Address, Hash256};
use std::collections::{HashMap, VecDeque};

/// A transaction admitted to the pool, along with the UTXO entry txids it
/// reserved at admission time (so `evict` can release them without needing
/// access to the `UtxoSet` again).
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub transaction: Transaction,
    pub chosen_slots: Vec<usize>,
    reserved_input_txids: Vec<Hash256>,
}

/// Pending transactions plus the advisory per-sender UTXO reservation map.
/// FIFO admission order is preserved in `order`; `drain_for_block` sorts a
/// snapshot by the block-assembly tie-break without disturbing it.
#[derive(Debug, Default)]
pub struct Mempool {
    by_txid: HashMap<Hash256, PendingTransaction>,
    order: VecDeque<Hash256>,
    reserved: HashMap<Address, Vec<Hash256>>,
}

impl Mempool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn contains(&self, txid: &Hash256) -> bool {
        self.by_txid.contains_key(txid)
    }

    /// Validates `tx` against the given committed state and, on success,
    /// admits it: reserves its UTXO inputs so later admissions in the same
    /// batch see them as unavailable.
    ///
    /// # Errors
    ///
    /// Returns the validation failure, or `LedgerError::MempoolFull` /
    /// `LedgerError::DuplicateTxid` before validation runs.
    #[allow(clippy::too_many_arguments)]
    pub fn admit(
        &mut self,
        tx: Transaction,
        config: &LedgerConfig,
        utxo_set: &UtxoSet,
        nonces: &NonceTracker,
        protected_addresses: &HashMap<Address, ProtectedPolicy>,
        now: i64,
        height: u64,
    ) -> Result<(), LedgerError> {
        if self.order.len() >= config.max_mempool_size {
            return Err(LedgerError::MempoolFull);
        }
        if self.by_txid.contains_key(&tx.txid) {
            return Err(LedgerError::DuplicateTxid);
        }

        let ctx = ValidationContext {
            config,
            utxo_set,
            nonces,
            reserved_txids: &self.reserved,
            protected_addresses,
            now,
            height,
        };
        let validated = validator::validate(&tx, &ctx)?;

        let sender_entries = utxo_set.entries_for(&tx.sender);
        let reserved_input_txids: Vec<Hash256> = validated
            .chosen_slots
            .iter()
            .filter_map(|&slot| sender_entries.get(slot).map(|entry| entry.txid))
            .collect();

        self.reserved
            .entry(tx.sender.clone())
            .or_default()
            .extend(reserved_input_txids.iter().copied());

        self.order.push_back(tx.txid);
        self.by_txid.insert(
            tx.txid,
            PendingTransaction {
                transaction: tx,
                chosen_slots: validated.chosen_slots,
                reserved_input_txids,
            },
        );
        Ok(())
    }

    /// Removes a transaction and releases the UTXO inputs it had reserved.
    pub fn evict(&mut self, txid: &Hash256) -> Option<PendingTransaction> {
        let pending = self.by_txid.remove(txid)?;
        self.order.retain(|id| id != txid);
        if let Some(reserved_txids) = self.reserved.get_mut(&pending.transaction.sender) {
            reserved_txids.retain(|id| !pending.reserved_input_txids.contains(id));
        }
        Some(pending)
    }

    /// Takes a FIFO-ordered snapshot of all pending transactions and sorts it
    /// by the block-assembly tie-break: `(fee desc, nonce asc, txid asc)`.
    /// Does not remove anything from the pool; the chain manager calls
    /// `evict` for each transaction it actually includes.
    #[must_use]
    pub fn drain_for_block(&self) -> Vec<PendingTransaction> {
        let mut snapshot: Vec<PendingTransaction> = self
            .order
            .iter()
            .filter_map(|txid| self.by_txid.get(txid).cloned())
            .collect();
        snapshot.sort_by(|a, b| {
            b.transaction
                .fee
                .cmp(&a.transaction.fee)
                .then_with(|| {
                    a.transaction
                        .nonce
                        .unwrap_or(0)
                        .cmp(&b.transaction.nonce.unwrap_or(0))
                })
                .then_with(|| a.transaction.txid.as_bytes().cmp(b.transaction.txid.as_bytes()))
        });
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionType;
    use rust_decimal_macros::dec;
    use shared::address::TESTNET_PREFIX;
    use shared::crypto::KeyPair;
    use std::collections::BTreeMap;

    fn funded_sender(utxo_set: &mut UtxoSet, amount: rust_decimal::Decimal) -> (KeyPair, Address) {
        let keypair = KeyPair::generate().unwrap();
        let sender = keypair.address(TESTNET_PREFIX);
        utxo_set.credit(sender.clone(), Hash256::sha256(b"funding"), amount, 0);
        (keypair, sender)
    }

    #[test]
    fn admits_valid_transaction() {
        let config = LedgerConfig::testnet();
        let mut utxo_set = UtxoSet::new();
        let (keypair, sender) = funded_sender(&mut utxo_set, dec!(12.0));
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02recipient");
        let nonces = NonceTracker::new();
        let protected = HashMap::new();

        let mut tx = Transaction::new(
            sender,
            recipient,
            dec!(5.0),
            dec!(0.24),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        tx.sign(&keypair).unwrap();

        let mut pool = Mempool::new();
        pool.admit(tx, &config, &utxo_set, &nonces, &protected, 1_700_000_000, 0)
            .unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn rejects_duplicate_txid() {
        let config = LedgerConfig::testnet();
        let mut utxo_set = UtxoSet::new();
        let (keypair, sender) = funded_sender(&mut utxo_set, dec!(12.0));
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02recipient");
        let nonces = NonceTracker::new();
        let protected = HashMap::new();

        let mut tx = Transaction::new(
            sender,
            recipient,
            dec!(5.0),
            dec!(0.24),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        tx.sign(&keypair).unwrap();

        let mut pool = Mempool::new();
        pool.admit(tx.clone(), &config, &utxo_set, &nonces, &protected, 1_700_000_000, 0)
            .unwrap();
        assert_eq!(
            pool.admit(tx, &config, &utxo_set, &nonces, &protected, 1_700_000_000, 0),
            Err(LedgerError::DuplicateTxid)
        );
    }

    #[test]
    fn second_spend_of_same_utxo_is_rejected_while_first_is_pending() {
        let config = LedgerConfig::testnet();
        let mut utxo_set = UtxoSet::new();
        let (keypair, sender) = funded_sender(&mut utxo_set, dec!(5.0));
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02recipient");
        let nonces = NonceTracker::new();
        let protected = HashMap::new();

        let mut first = Transaction::new(
            sender.clone(),
            recipient.clone(),
            dec!(4.0),
            dec!(0.1),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        first.sign(&keypair).unwrap();

        let mut second = Transaction::new(
            sender,
            recipient,
            dec!(4.0),
            dec!(0.1),
            1_700_000_001,
            Some(1),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        second.sign(&keypair).unwrap();

        let mut pool = Mempool::new();
        pool.admit(first, &config, &utxo_set, &nonces, &protected, 1_700_000_000, 0)
            .unwrap();
        assert_eq!(
            pool.admit(second, &config, &utxo_set, &nonces, &protected, 1_700_000_001, 0),
            Err(LedgerError::InsufficientFunds)
        );
    }

    #[test]
    fn drain_orders_by_fee_desc() {
        let config = LedgerConfig::testnet();
        let mut utxo_set = UtxoSet::new();
        let (keypair_a, sender_a) = funded_sender(&mut utxo_set, dec!(10.0));
        let (keypair_b, sender_b) = funded_sender(&mut utxo_set, dec!(10.0));
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02recipient");
        let nonces = NonceTracker::new();
        let protected = HashMap::new();

        let mut low_fee = Transaction::new(
            sender_a,
            recipient.clone(),
            dec!(1.0),
            dec!(0.01),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        low_fee.sign(&keypair_a).unwrap();

        let mut high_fee = Transaction::new(
            sender_b,
            recipient,
            dec!(1.0),
            dec!(0.50),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        high_fee.sign(&keypair_b).unwrap();

        let mut pool = Mempool::new();
        pool.admit(low_fee.clone(), &config, &utxo_set, &nonces, &protected, 1_700_000_000, 0)
            .unwrap();
        pool.admit(high_fee.clone(), &config, &utxo_set, &nonces, &protected, 1_700_000_000, 0)
            .unwrap();

        let drained = pool.drain_for_block();
        assert_eq!(drained[0].transaction.txid, high_fee.txid);
        assert_eq!(drained[1].transaction.txid, low_fee.txid);
    }

    #[test]
    fn evict_releases_reservation_for_reuse() {
        let config = LedgerConfig::testnet();
        let mut utxo_set = UtxoSet::new();
        let (keypair, sender) = funded_sender(&mut utxo_set, dec!(5.0));
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02recipient");
        let nonces = NonceTracker::new();
        let protected = HashMap::new();

        let mut tx = Transaction::new(
            sender,
            recipient,
            dec!(4.0),
            dec!(0.1),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        tx.sign(&keypair).unwrap();

        let mut pool = Mempool::new();
        pool.admit(tx.clone(), &config, &utxo_set, &nonces, &protected, 1_700_000_000, 0)
            .unwrap();
        pool.evict(&tx.txid);
        assert_eq!(pool.size(), 0);
        assert!(!pool.contains(&tx.txid));
    }
}
