use serde::{Deserialize, Serialize};
use shared::Address;
use std::collections::HashMap;

/// Per-sender replay guard: tracks the last *mined* (committed) nonce and an
/// advisory reservation used by the mempool to serialize admission without
/// waiting for a block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NonceTracker {
    committed: HashMap<Address, u64>,
    reserved: HashMap<Address, u64>,
}

impl NonceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next nonce this sender is expected to use: `last_committed + 1`,
    /// or `0` for a sender never seen before. Reservations from pending
    /// mempool transactions advance this forward so a burst of same-sender
    /// transactions can be admitted in nonce order without waiting for a
    /// block.
    #[must_use]
    pub fn next_expected(&self, sender: &Address) -> u64 {
        let base = self.committed.get(sender).map_or(0, |n| n + 1);
        self.reserved.get(sender).map_or(base, |n| (n + 1).max(base))
    }

    /// Advisory: records that a mempool transaction intends to use `nonce`.
    pub fn reserve(&mut self, sender: Address, nonce: u64) {
        self.reserved
            .entry(sender)
            .and_modify(|n| *n = (*n).max(nonce))
            .or_insert(nonce);
    }

    /// Called when a block is appended. Monotonic: never decreases the
    /// stored value.
    pub fn commit(&mut self, sender: Address, nonce: u64) {
        self.committed
            .entry(sender)
            .and_modify(|n| *n = (*n).max(nonce))
            .or_insert(nonce);
    }

    #[must_use]
    pub fn last_committed(&self, sender: &Address) -> Option<u64> {
        self.committed.get(sender).copied()
    }
}
