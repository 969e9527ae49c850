use crate::error::{LedgerError, LedgerResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::crypto::{KeyPair, PublicKey, Signature};
use shared::{Address, Hash256};
use std::collections::BTreeMap;

/// Tagged transaction type. Only `Normal` and `Coinbase` affect balance
/// accounting here; the rest carry opaque metadata consumed by peripheral
/// collaborators (trading matcher, time-capsule escrow, governance, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Normal,
    Coinbase,
    Airdrop,
    Refund,
    Treasure,
    TimeCapsuleLock,
    TimeCapsuleClaim,
    TradeSettlement,
    AiDonation,
    /// Catch-all for transaction kinds the core doesn't know about.
    Extension { kind: String, payload: Value },
}

impl TransactionType {
    #[must_use]
    pub const fn is_coinbase(&self) -> bool {
        matches!(self, Self::Coinbase)
    }

    /// Canonical string tag, used to match protected-address allowlists.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Normal => "normal",
            Self::Coinbase => "coinbase",
            Self::Airdrop => "airdrop",
            Self::Refund => "refund",
            Self::Treasure => "treasure",
            Self::TimeCapsuleLock => "time_capsule_lock",
            Self::TimeCapsuleClaim => "time_capsule_claim",
            Self::TradeSettlement => "trade_settlement",
            Self::AiDonation => "ai_donation",
            Self::Extension { kind, .. } => kind,
        }
    }
}

/// A fully-formed transaction. `txid` is a pure function of the accounting
/// fields (everything but `signature` and `txid` itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    pub amount: Decimal,
    pub fee: Decimal,
    pub timestamp: i64,
    pub nonce: Option<u64>,
    pub tx_type: TransactionType,
    pub public_key: Option<PublicKey>,
    pub signature: Option<Signature>,
    pub metadata: BTreeMap<String, Value>,
    pub txid: Hash256,
}

/// The subset of fields that determine `txid`. Relying on `serde_json`'s
/// default (non-`preserve_order`) map representation gives us lexicographic
/// key sorting for free, so the canonical encoding doesn't need a bespoke
/// serializer.
#[derive(Serialize)]
struct CanonicalTx<'a> {
    sender: &'a Address,
    recipient: &'a Address,
    amount: Decimal,
    fee: Decimal,
    timestamp: i64,
    nonce: Option<u64>,
    tx_type: &'a TransactionType,
    public_key: Option<&'a PublicKey>,
    metadata: &'a BTreeMap<String, Value>,
}

impl Transaction {
    /// Builds an unsigned transaction with `txid` left as a placeholder;
    /// call `canonical_hash()` (or `sign`) to populate it.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender: Address,
        recipient: Address,
        amount: Decimal,
        fee: Decimal,
        timestamp: i64,
        nonce: Option<u64>,
        tx_type: TransactionType,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        let mut tx = Self {
            sender,
            recipient,
            amount: amount.round_dp(8),
            fee: fee.round_dp(8),
            timestamp,
            nonce,
            tx_type,
            public_key: None,
            signature: None,
            metadata,
            txid: Hash256::zero(),
        };
        tx.txid = tx.canonical_hash();
        tx
    }

    /// Builds the coinbase transaction for a mined block: mints
    /// `base_reward + total_fees` to `miner`.
    #[must_use]
    pub fn coinbase(miner: Address, reward: Decimal, height: u64, timestamp: i64) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("height".to_string(), Value::from(height));

        let coinbase_sender = Address::coinbase(miner.prefix());
        Self::new(
            coinbase_sender,
            miner,
            reward,
            Decimal::ZERO,
            timestamp,
            None,
            TransactionType::Coinbase,
            metadata,
        )
    }

    /// Recomputes the canonical hash over the accounting fields.
    #[must_use]
    pub fn canonical_hash(&self) -> Hash256 {
        let canonical = CanonicalTx {
            sender: &self.sender,
            recipient: &self.recipient,
            amount: self.amount,
            fee: self.fee,
            timestamp: self.timestamp,
            nonce: self.nonce,
            tx_type: &self.tx_type,
            public_key: self.public_key.as_ref(),
            metadata: &self.metadata,
        };
        let encoded = serde_json::to_vec(&canonical).expect("canonical transaction is serializable");
        Hash256::sha256(&encoded)
    }

    /// Signs the transaction: sets `public_key`, signs over `canonical_hash()`,
    /// then recomputes and stores `txid`.
    pub fn sign(&mut self, keypair: &KeyPair) -> LedgerResult<()> {
        self.public_key = Some(keypair.public_key.clone());
        self.txid = self.canonical_hash();
        let signature = shared::crypto::sign_message(&self.txid, keypair)?;
        self.signature = Some(signature);
        Ok(())
    }

    /// For coinbase transactions this is always `true`. Otherwise verifies
    /// that `public_key` derives to `sender` and that the signature is valid
    /// over the current `canonical_hash()`.
    #[must_use]
    pub fn verify_signature(&self) -> bool {
        if self.tx_type.is_coinbase() {
            return true;
        }
        let Some(public_key) = &self.public_key else {
            return false;
        };
        let Some(signature) = &self.signature else {
            return false;
        };
        if public_key.to_address(self.sender.prefix()) != self.sender {
            return false;
        }
        shared::crypto::verify_message(&self.canonical_hash(), signature)
    }

    #[must_use]
    pub const fn is_coinbase(&self) -> bool {
        self.tx_type.is_coinbase()
    }

    /// Estimated on-wire size in bytes, used against `max_tx_bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be serialized.
    pub fn estimated_size(&self) -> LedgerResult<usize> {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len())
            .map_err(|e| LedgerError::InvalidFormat(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use shared::address::TESTNET_PREFIX;

    #[test]
    fn txid_is_deterministic() {
        let a = Address::from_public_key_hex(TESTNET_PREFIX, "02aaaa");
        let b = Address::from_public_key_hex(TESTNET_PREFIX, "02bbbb");
        let tx1 = Transaction::new(
            a.clone(),
            b.clone(),
            dec!(5.0),
            dec!(0.1),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        let tx2 = Transaction::new(
            a,
            b,
            dec!(5.0),
            dec!(0.1),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        assert_eq!(tx1.txid, tx2.txid);
    }

    #[test]
    fn changing_amount_changes_txid() {
        let a = Address::from_public_key_hex(TESTNET_PREFIX, "02aaaa");
        let b = Address::from_public_key_hex(TESTNET_PREFIX, "02bbbb");
        let tx1 = Transaction::new(
            a.clone(),
            b.clone(),
            dec!(5.0),
            dec!(0.1),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        let tx2 = Transaction::new(
            a,
            b,
            dec!(5.5),
            dec!(0.1),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        assert_ne!(tx1.txid, tx2.txid);
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let keypair = KeyPair::generate().unwrap();
        let sender = keypair.address(TESTNET_PREFIX);
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02cccc");

        let mut tx = Transaction::new(
            sender,
            recipient,
            dec!(5.0),
            dec!(0.1),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        tx.sign(&keypair).unwrap();
        assert!(tx.verify_signature());
    }

    #[test]
    fn tampering_after_signing_breaks_verification() {
        let keypair = KeyPair::generate().unwrap();
        let sender = keypair.address(TESTNET_PREFIX);
        let recipient = Address::from_public_key_hex(TESTNET_PREFIX, "02cccc");

        let mut tx = Transaction::new(
            sender,
            recipient,
            dec!(5.0),
            dec!(0.1),
            1_700_000_000,
            Some(0),
            TransactionType::Normal,
            BTreeMap::new(),
        );
        tx.sign(&keypair).unwrap();
        tx.amount = dec!(50.0);
        assert!(!tx.verify_signature());
    }

    #[test]
    fn coinbase_always_verifies() {
        let miner = Address::from_public_key_hex(TESTNET_PREFIX, "02dddd");
        let tx = Transaction::coinbase(miner, dec!(12.0), 1, 1_700_000_000);
        assert!(tx.is_coinbase());
        assert!(tx.verify_signature());
    }
}
