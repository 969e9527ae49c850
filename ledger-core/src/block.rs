use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared::Hash256;

/// A single block: `index = 0` is genesis with `previous_hash = Hash256::zero()`.
/// `hash` is SHA-256 over the canonical serialization of every other field,
/// and must itself satisfy `difficulty`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub previous_hash: Hash256,
    pub transactions: Vec<Transaction>,
    pub merkle_root: Hash256,
    pub difficulty: u8,
    pub nonce: u64,
    pub hash: Hash256,
}

/// The subset of fields the block hash commits to. `hash` itself is
/// deliberately excluded so the computation can't be self-referential.
#[derive(Serialize)]
struct CanonicalBlock<'a> {
    index: u64,
    timestamp: i64,
    previous_hash: Hash256,
    transactions: &'a [Transaction],
    merkle_root: Hash256,
    difficulty: u8,
    nonce: u64,
}

impl Block {
    /// Assembles a block with `hash` left as a placeholder; the miner fills
    /// in `nonce` and `hash` by searching (see `mining.rs`).
    #[must_use]
    pub fn new(
        index: u64,
        timestamp: i64,
        previous_hash: Hash256,
        transactions: Vec<Transaction>,
        difficulty: u8,
        nonce: u64,
    ) -> Self {
        let merkle_root = merkle_root(&transactions);
        let mut block = Self {
            index,
            timestamp,
            previous_hash,
            transactions,
            merkle_root,
            difficulty,
            nonce,
            hash: Hash256::zero(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Recomputes the block hash from its fields, independent of the
    /// currently-stored `hash`.
    #[must_use]
    pub fn compute_hash(&self) -> Hash256 {
        let canonical = CanonicalBlock {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: self.previous_hash,
            transactions: &self.transactions,
            merkle_root: self.merkle_root,
            difficulty: self.difficulty,
            nonce: self.nonce,
        };
        let encoded = serde_json::to_vec(&canonical).expect("canonical block is serializable");
        Hash256::sha256(&encoded)
    }

    /// Recomputes the Merkle root from `transactions`, independent of the
    /// currently-stored `merkle_root`.
    #[must_use]
    pub fn compute_merkle_root(&self) -> Hash256 {
        merkle_root(&self.transactions)
    }

    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    #[must_use]
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Estimated on-wire size in bytes.
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        serde_json::to_vec(self).map(|b| b.len()).unwrap_or(0)
    }
}

/// Classical pairwise SHA-256 Merkle tree: the last leaf is duplicated when a
/// level has odd cardinality. Returns `Hash256::zero()` for an empty slice.
#[must_use]
pub fn merkle_root(transactions: &[Transaction]) -> Hash256 {
    if transactions.is_empty() {
        return Hash256::zero();
    }

    let mut level: Vec<Hash256> = transactions.iter().map(|tx| tx.txid).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(Hash256::combine(&pair[0], right));
        }
        level = next;
    }
    level[0]
}
