//! Ordered transaction admission checks (`spec.md` §4.5). First failure
//! short-circuits with a typed error.

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::nonce::NonceTracker;
use crate::transaction::Transaction;
use crate::utxo::UtxoSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{Address, Hash256};
use std::collections::HashMap;

/// Allowlist restricting which transaction types a protected (reserve)
/// address may originate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedPolicy {
    pub allowed_type_tags: Vec<String>,
}

impl ProtectedPolicy {
    #[must_use]
    pub fn time_capsule_only() -> Self {
        Self {
            allowed_type_tags: vec![
                "time_capsule_lock".to_string(),
                "time_capsule_claim".to_string(),
            ],
        }
    }

    #[must_use]
    pub fn allows(&self, tag: &str) -> bool {
        self.allowed_type_tags.iter().any(|t| t == tag)
    }
}

/// Non-authoritative AML/risk annotation. Scoring never rejects a
/// transaction; a failure here is logged and swallowed by the caller.
pub trait RiskScorer: Send + Sync {
    fn score(&self, tx: &Transaction) -> RiskLevel;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Read-only view of the state a transaction is validated against. The
/// chain manager supplies a fresh view per transaction as intra-block state
/// advances; the mempool supplies the current committed + reserved view.
pub struct ValidationContext<'a> {
    pub config: &'a LedgerConfig,
    pub utxo_set: &'a UtxoSet,
    pub nonces: &'a NonceTracker,
    pub reserved_txids: &'a HashMap<Address, Vec<Hash256>>,
    pub protected_addresses: &'a HashMap<Address, ProtectedPolicy>,
    pub now: i64,
    /// Height spendability is judged against, per §4.3's `unlock_height` gate.
    pub height: u64,
}

/// Result of a successful validation: the UTXO slots chosen to fund this
/// transaction, to be attached as its intended inputs.
pub struct ValidatedTransaction {
    pub chosen_slots: Vec<usize>,
}

/// Runs checks 1–8 of `spec.md` §4.5 in order, returning the first failure.
///
/// # Errors
///
/// Returns the typed `LedgerError` of whichever check failed first.
pub fn validate(tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<ValidatedTransaction, LedgerError> {
    check_format(tx, ctx)?;
    check_dust(tx, ctx)?;
    check_replay(tx, ctx)?;
    check_signature(tx)?;
    check_protected_address(tx, ctx)?;
    check_type_metadata(tx)?;
    let chosen_slots = check_funds(tx, ctx)?;
    check_size(tx, ctx)?;
    Ok(ValidatedTransaction { chosen_slots })
}

fn check_format(tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), LedgerError> {
    if tx.amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidFormat("amount must be positive".to_string()));
    }
    if tx.fee < Decimal::ZERO {
        return Err(LedgerError::InvalidFormat("fee must be non-negative".to_string()));
    }
    let drift = ctx.config.max_future_drift_seconds;
    if tx.timestamp > ctx.now + drift {
        return Err(LedgerError::InvalidFormat("timestamp too far in the future".to_string()));
    }
    if !tx.is_coinbase() && tx.nonce.is_none() {
        return Err(LedgerError::InvalidFormat("nonce required for non-coinbase sender".to_string()));
    }
    Ok(())
}

fn check_dust(tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), LedgerError> {
    if tx.is_coinbase() {
        return Ok(());
    }
    if tx.amount < ctx.config.min_tx_amount {
        return Err(LedgerError::DustAmount);
    }
    Ok(())
}

fn check_replay(tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), LedgerError> {
    if tx.is_coinbase() {
        return Ok(());
    }
    let expected = ctx.nonces.next_expected(&tx.sender);
    let actual = tx.nonce.unwrap_or(0);
    if actual != expected {
        return Err(LedgerError::BadNonce { expected, actual });
    }
    Ok(())
}

fn check_signature(tx: &Transaction) -> Result<(), LedgerError> {
    if tx.is_coinbase() {
        return Ok(());
    }
    let Some(public_key) = &tx.public_key else {
        return Err(LedgerError::BadSignature);
    };
    if public_key.to_address(tx.sender.prefix()) != tx.sender {
        return Err(LedgerError::AddressMismatch);
    }
    if !tx.verify_signature() {
        return Err(LedgerError::BadSignature);
    }
    Ok(())
}

fn check_protected_address(tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), LedgerError> {
    if let Some(policy) = ctx.protected_addresses.get(&tx.sender) {
        if !policy.allows(tx.tx_type.tag()) {
            return Err(LedgerError::ProtectedAddressViolation);
        }
    }
    Ok(())
}

fn check_type_metadata(tx: &Transaction) -> Result<(), LedgerError> {
    use crate::transaction::TransactionType;
    match &tx.tx_type {
        TransactionType::TimeCapsuleLock => {
            for key in ["capsule_id", "unlock_time", "beneficiary"] {
                if !tx.metadata.contains_key(key) {
                    return Err(LedgerError::InvalidFormat(format!(
                        "time_capsule_lock requires metadata key '{key}'"
                    )));
                }
            }
        }
        TransactionType::TimeCapsuleClaim => {
            if !tx.metadata.contains_key("capsule_id") {
                return Err(LedgerError::InvalidFormat(
                    "time_capsule_claim requires metadata key 'capsule_id'".to_string(),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_funds(tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<Vec<usize>, LedgerError> {
    if tx.is_coinbase() {
        return Ok(Vec::new());
    }
    let needed = tx.amount + tx.fee;
    if ctx.utxo_set.balance(&tx.sender, ctx.height) < needed {
        return Err(LedgerError::InsufficientFunds);
    }
    let reserved = ctx
        .reserved_txids
        .get(&tx.sender)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    ctx.utxo_set
        .select_spendable(&tx.sender, needed, reserved, ctx.height)
        .ok_or(LedgerError::InsufficientFunds)
}

fn check_size(tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), LedgerError> {
    if tx.estimated_size()? > ctx.config.max_tx_bytes {
        return Err(LedgerError::InvalidFormat("transaction exceeds max_tx_bytes".to_string()));
    }
    Ok(())
}
