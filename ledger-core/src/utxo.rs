use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{Address, Hash256};
use std::collections::HashMap;

/// An unspent (or spent-but-retained-for-history) transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub txid: Hash256,
    pub amount: Decimal,
    pub spent: bool,
    pub unlock_height: u64,
}

impl UtxoEntry {
    #[must_use]
    pub const fn new(txid: Hash256, amount: Decimal, unlock_height: u64) -> Self {
        Self {
            txid,
            amount,
            spent: false,
            unlock_height,
        }
    }
}

/// Per-address arena of UTXO entries. Reservations are tracked separately by
/// the mempool/validator layer and are not part of this set's own state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtxoSet {
    entries: HashMap<Address, Vec<UtxoEntry>>,
}

impl UtxoSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new unspent entry owned by `address`.
    pub fn credit(&mut self, address: Address, txid: Hash256, amount: Decimal, unlock_height: u64) {
        self.entries
            .entry(address)
            .or_default()
            .push(UtxoEntry::new(txid, amount, unlock_height));
    }

    /// Deterministic first-fit scan: walks `address`'s entries in storage
    /// order, skipping spent entries, ones reserved in `reservations`, or
    /// ones not yet unlocked at `current_height`, accumulating until the sum
    /// covers `amount_needed`. Returns the chosen slots, or `None` if
    /// insufficient spendable funds exist.
    #[must_use]
    pub fn select_spendable(
        &self,
        address: &Address,
        amount_needed: Decimal,
        reserved_txids: &[Hash256],
        current_height: u64,
    ) -> Option<Vec<usize>> {
        let entries = self.entries.get(address)?;
        let mut chosen = Vec::new();
        let mut total = Decimal::ZERO;

        for (slot, entry) in entries.iter().enumerate() {
            if entry.spent || entry.unlock_height > current_height || reserved_txids.contains(&entry.txid) {
                continue;
            }
            chosen.push(slot);
            total += entry.amount;
            if total >= amount_needed {
                return Some(chosen);
            }
        }
        None
    }

    /// Marks the chosen slots of `sender` spent, and if the chosen sum
    /// exceeds `amount + fee`, credits the remainder back to `sender` as a
    /// change entry with a synthetic txid.
    ///
    /// # Errors
    ///
    /// Returns an error if a chosen slot does not exist or is already spent.
    pub fn apply_spend(
        &mut self,
        sender: &Address,
        chosen_slots: &[usize],
        amount: Decimal,
        fee: Decimal,
        parent_txid: Hash256,
        block_height: u64,
    ) -> Result<(), LedgerError> {
        let entries = self
            .entries
            .get_mut(sender)
            .ok_or(LedgerError::InsufficientFunds)?;

        let mut total = Decimal::ZERO;
        let mut input_txid = Hash256::zero();
        for &slot in chosen_slots {
            let entry = entries
                .get_mut(slot)
                .ok_or(LedgerError::InsufficientFunds)?;
            if entry.spent {
                return Err(LedgerError::InsufficientFunds);
            }
            entry.spent = true;
            total += entry.amount;
            input_txid = entry.txid;
        }

        let needed = amount + fee;
        let change = total - needed;
        if change > Decimal::ZERO {
            let change_txid_hex = format!(
                "{}:change:{}",
                hex::encode(parent_txid.as_bytes()),
                hex::encode(input_txid.as_bytes())
            );
            let change_txid = Hash256::sha256(change_txid_hex.as_bytes());
            entries.push(UtxoEntry::new(change_txid, change, block_height));
        }

        Ok(())
    }

    /// Sum of unspent, unlocked entries owned by `address`.
    #[must_use]
    pub fn balance(&self, address: &Address, current_height: u64) -> Decimal {
        self.entries
            .get(address)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| !e.spent && e.unlock_height <= current_height)
                    .map(|e| e.amount)
                    .sum()
            })
            .unwrap_or(Decimal::ZERO)
    }

    /// Sum of all unspent entries across every address.
    #[must_use]
    pub fn total_unspent(&self) -> Decimal {
        self.entries
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|e| !e.spent)
            .map(|e| e.amount)
            .sum()
    }

    #[must_use]
    pub fn entries_for(&self, address: &Address) -> &[UtxoEntry] {
        self.entries.get(address).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use shared::address::TESTNET_PREFIX;

    fn addr(seed: &str) -> Address {
        Address::from_public_key_hex(TESTNET_PREFIX, seed)
    }

    #[test]
    fn credit_then_balance_reflects_amount() {
        let mut set = UtxoSet::new();
        let a = addr("alice");
        set.credit(a.clone(), Hash256::sha256(b"tx1"), dec!(12.0), 0);
        assert_eq!(set.balance(&a, 0), dec!(12.0));
    }

    #[test]
    fn unlock_height_gates_balance() {
        let mut set = UtxoSet::new();
        let a = addr("alice");
        set.credit(a.clone(), Hash256::sha256(b"tx1"), dec!(12.0), 100);
        assert_eq!(set.balance(&a, 50), Decimal::ZERO);
        assert_eq!(set.balance(&a, 100), dec!(12.0));
    }

    #[test]
    fn select_spendable_is_first_fit_and_deterministic() {
        let mut set = UtxoSet::new();
        let a = addr("alice");
        set.credit(a.clone(), Hash256::sha256(b"tx1"), dec!(5.0), 0);
        set.credit(a.clone(), Hash256::sha256(b"tx2"), dec!(5.0), 0);
        set.credit(a.clone(), Hash256::sha256(b"tx3"), dec!(5.0), 0);

        let chosen = set.select_spendable(&a, dec!(8.0), &[], 0).unwrap();
        assert_eq!(chosen, vec![0, 1]);
    }

    #[test]
    fn select_spendable_returns_none_when_insufficient() {
        let mut set = UtxoSet::new();
        let a = addr("alice");
        set.credit(a.clone(), Hash256::sha256(b"tx1"), dec!(5.0), 0);
        assert!(set.select_spendable(&a, dec!(8.0), &[], 0).is_none());
    }

    #[test]
    fn select_spendable_skips_entries_not_yet_unlocked() {
        let mut set = UtxoSet::new();
        let a = addr("alice");
        set.credit(a.clone(), Hash256::sha256(b"tx1"), dec!(5.0), 100);
        assert!(set.select_spendable(&a, dec!(5.0), &[], 50).is_none());
        assert_eq!(set.select_spendable(&a, dec!(5.0), &[], 100), Some(vec![0]));
    }

    #[test]
    fn apply_spend_creates_change_entry() {
        let mut set = UtxoSet::new();
        let a = addr("alice");
        set.credit(a.clone(), Hash256::sha256(b"tx1"), dec!(12.0), 0);

        let parent_txid = Hash256::sha256(b"spend-tx");
        set.apply_spend(&a, &[0], dec!(5.0), dec!(0.24), parent_txid, 1)
            .unwrap();

        assert_eq!(set.balance(&a, 1), dec!(6.76));
        assert_eq!(set.entries_for(&a).len(), 2);
        assert!(set.entries_for(&a)[0].spent);
    }

    #[test]
    fn apply_spend_without_remainder_creates_no_change() {
        let mut set = UtxoSet::new();
        let a = addr("alice");
        set.credit(a.clone(), Hash256::sha256(b"tx1"), dec!(5.24), 0);

        set.apply_spend(&a, &[0], dec!(5.0), dec!(0.24), Hash256::sha256(b"spend"), 1)
            .unwrap();

        assert_eq!(set.entries_for(&a).len(), 1);
        assert_eq!(set.balance(&a, 1), Decimal::ZERO);
    }
}
