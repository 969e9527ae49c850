//! Network presets and the configuration keys recognized by the ledger core

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Which network a `Ledger` instance is bound to. Selects the address
/// prefix, initial difficulty, genesis file path, and pinned genesis hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    Testnet,
    Mainnet,
}

impl NetworkType {
    #[must_use]
    pub const fn address_prefix(self) -> &'static str {
        match self {
            Self::Testnet => shared::address::TESTNET_PREFIX,
            Self::Mainnet => shared::address::MAINNET_PREFIX,
        }
    }
}

/// Configuration recognized by the ledger core, per `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub network_type: NetworkType,
    pub max_supply: Decimal,
    pub initial_block_reward: Decimal,
    pub halving_interval: u64,
    pub initial_difficulty: u8,
    pub max_future_drift_seconds: i64,
    pub max_reorg_depth: u64,
    pub checkpoint_interval: u64,
    pub max_mempool_size: usize,
    pub max_tx_bytes: usize,
    pub min_tx_amount: Decimal,
    pub genesis_file: String,
    pub safe_genesis_hash: String,
}

impl LedgerConfig {
    /// Testnet defaults, matching `original_source/src/aixn/core/config.py`'s
    /// `TestnetConfig` (smaller supply, lower difficulty, faucet-friendly).
    #[must_use]
    pub fn testnet() -> Self {
        Self {
            network_type: NetworkType::Testnet,
            max_supply: dec!(121_000_000),
            initial_block_reward: dec!(12.0),
            halving_interval: 262_800,
            initial_difficulty: 2,
            max_future_drift_seconds: 2 * 60 * 60,
            max_reorg_depth: 100,
            checkpoint_interval: 2_016,
            max_mempool_size: 5_000,
            max_tx_bytes: 100_000,
            min_tx_amount: dec!(0.00000001),
            genesis_file: "genesis_testnet.json".to_string(),
            safe_genesis_hash:
                "59b30b2d8525512cbd5715b24546d73b540ddb575d3778fdbdff02ba245a9141".to_string(),
        }
    }

    /// Mainnet defaults.
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            max_supply: dec!(121_000_000),
            initial_block_reward: dec!(12.0),
            halving_interval: 262_800,
            initial_difficulty: 4,
            max_future_drift_seconds: 2 * 60 * 60,
            max_reorg_depth: 100,
            checkpoint_interval: 2_016,
            max_mempool_size: 20_000,
            max_tx_bytes: 100_000,
            min_tx_amount: dec!(0.00000001),
            genesis_file: "genesis.json".to_string(),
            safe_genesis_hash: String::new(),
        }
    }
}
