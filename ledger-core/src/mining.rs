use crate::block::Block;
use crate::error::LedgerError;
use crate::transaction::Transaction;
use shared::Hash256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Checked at least every this many nonce attempts.
const CANCELLATION_CHECK_INTERVAL: u64 = 100_000;

/// Cooperative stop signal shared between the caller and the mining thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a completed nonce search.
#[derive(Debug, Clone)]
pub struct MiningResult {
    pub block: Block,
    pub attempts: u64,
}

/// Assembles the coinbase + body transactions into an unmined block and
/// searches for a `nonce` meeting `difficulty`, per `spec.md` §4.7.
///
/// # Errors
///
/// Returns `LedgerError::Cancelled` if `cancel` fires before a solution is
/// found.
pub fn mine_block(
    index: u64,
    timestamp: i64,
    previous_hash: Hash256,
    coinbase: Transaction,
    body: Vec<Transaction>,
    difficulty: u8,
    cancel: &CancellationToken,
) -> Result<MiningResult, LedgerError> {
    let mut transactions = Vec::with_capacity(body.len() + 1);
    transactions.push(coinbase);
    transactions.extend(body);

    let mut nonce = 0u64;
    let mut attempts = 0u64;

    loop {
        let candidate = Block::new(index, timestamp, previous_hash, transactions.clone(), difficulty, nonce);
        attempts += 1;
        if candidate.hash.meets_difficulty(difficulty) {
            return Ok(MiningResult {
                block: candidate,
                attempts,
            });
        }

        if attempts % CANCELLATION_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        nonce = nonce.checked_add(1).ok_or(LedgerError::Cancelled)?;
    }
}
