use clap::{Parser, Subcommand};
use ledger_core::mining::CancellationToken;
use ledger_core::{genesis, storage::Store, Block, Ledger, LedgerConfig, NetworkType, Transaction, TransactionType};
use rust_decimal::Decimal;
use shared::crypto::KeyPair;
use shared::Address;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Ledger(#[from] ledger_core::LedgerError),

    #[error(transparent)]
    Crypto(#[from] shared::BlockchainError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "axn-ledger")]
#[command(about = "UTXO proof-of-work ledger core")]
#[command(version)]
struct Cli {
    /// Directory holding the chain, UTXO snapshot, and mempool backlog
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Which network preset to apply
    #[arg(long, global = true, value_enum, default_value = "testnet")]
    network: NetworkArg,

    /// Genesis file bootstrapping (or re-validating) the chain
    #[arg(long, global = true, default_value = "genesis.json")]
    genesis_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum NetworkArg {
    Testnet,
    Mainnet,
}

impl From<NetworkArg> for NetworkType {
    fn from(value: NetworkArg) -> Self {
        match value {
            NetworkArg::Testnet => Self::Testnet,
            NetworkArg::Mainnet => Self::Mainnet,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a keypair and print its address
    Keygen,
    /// Write a fresh genesis file and print its pinned hash
    InitGenesis {
        /// Address that receives the initial supply
        #[arg(long)]
        recipient: String,
        /// Initial supply to mint at genesis
        #[arg(long)]
        amount: Decimal,
    },
    /// Mine the next block over whatever is currently in the mempool
    Mine {
        /// Address credited with the block reward
        #[arg(long)]
        miner: String,
    },
    /// Sign and submit a transaction to the mempool
    SubmitTx {
        /// Hex-encoded secp256k1 private key of the sender
        #[arg(long)]
        sender_key: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "0")]
        fee: Decimal,
        #[arg(long)]
        nonce: u64,
    },
    /// Print an address's confirmed balance
    Balance { address: String },
    /// Print the chain tip, height, and circulating supply
    Status,
    /// Replay the whole chain from genesis and report whether it's valid
    ValidateChain,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let config = network_config(cli.network.into());

    match cli.command {
        Commands::Keygen => keygen(config.network_type),
        Commands::InitGenesis { recipient, amount } => init_genesis(&config, &cli.genesis_file, &recipient, amount),
        Commands::Mine { miner } => mine(&cli.data_dir, &cli.genesis_file, config, &miner),
        Commands::SubmitTx {
            sender_key,
            recipient,
            amount,
            fee,
            nonce,
        } => submit_tx(&cli.data_dir, &cli.genesis_file, config, &sender_key, &recipient, amount, fee, nonce),
        Commands::Balance { address } => balance(&cli.data_dir, &cli.genesis_file, config, &address),
        Commands::Status => status(&cli.data_dir, &cli.genesis_file, config),
        Commands::ValidateChain => validate_chain(&cli.data_dir, &cli.genesis_file, config),
    }
}

fn network_config(network_type: NetworkType) -> LedgerConfig {
    match network_type {
        NetworkType::Testnet => LedgerConfig::testnet(),
        NetworkType::Mainnet => LedgerConfig::mainnet(),
    }
}

fn keygen(network_type: NetworkType) -> CliResult<()> {
    let keypair = KeyPair::generate()?;
    let prefix = network_type.address_prefix();
    println!("address:     {}", keypair.address(prefix).as_str());
    println!("private_key: {}", hex::encode(keypair.private_key.as_bytes()));
    println!("public_key:  {}", hex::encode(keypair.public_key.as_bytes()));
    Ok(())
}

fn init_genesis(config: &LedgerConfig, output: &Path, recipient: &str, amount: Decimal) -> CliResult<()> {
    let recipient = Address::from_raw(recipient);
    let timestamp = chrono::Utc::now().timestamp();
    let tx = Transaction::new(
        Address::coinbase(config.network_type.address_prefix()),
        recipient,
        amount,
        Decimal::ZERO,
        timestamp,
        None,
        TransactionType::Coinbase,
        BTreeMap::new(),
    );
    let block = Block::new(0, timestamp, shared::Hash256::zero(), vec![tx], config.initial_difficulty, 0);
    let genesis_file = genesis::GenesisFile {
        block,
        protected_addresses: HashMap::new(),
    };
    let raw = genesis::encode(&genesis_file)?;
    std::fs::write(output, &raw)?;

    let hash = shared::Hash256::sha256(&raw).to_hex();
    println!("genesis written to {}", output.display());
    println!("safe_genesis_hash: {hash}");
    Ok(())
}

/// Opens the ledger for this invocation: bootstraps from `genesis_file` on
/// a first run, or rebuilds from `data_dir`'s persisted blocks otherwise.
/// Every command reopens and drops the ledger; there is no resident daemon.
fn open_ledger(data_dir: &Path, genesis_file: &Path, config: LedgerConfig) -> CliResult<Ledger> {
    let store = Store::new(data_dir);
    let blocks = store.load_blocks()?;
    let raw = std::fs::read(genesis_file)?;

    if blocks.is_empty() {
        let (chain, protected_addresses) = genesis::load(config, &raw)?;
        store.persist_block(chain.tip())?;
        Ok(Ledger::new(chain, protected_addresses))
    } else {
        let genesis_file: genesis::GenesisFile = serde_json::from_slice(&raw)?;
        let protected_addresses = genesis_file.protected_addresses;
        let chain = store.rebuild_chain(config, &protected_addresses)?;
        Ok(Ledger::new(chain, protected_addresses))
    }
}

fn persist_tip(data_dir: &Path, ledger: &Ledger) -> CliResult<()> {
    let store = Store::new(data_dir);
    let (height, _) = ledger.tip();
    if let Some(block) = ledger.get_block_by_height(height) {
        store.persist_block(&block)?;
    }
    store.persist_utxo_snapshot(&ledger.utxo_snapshot())?;
    Ok(())
}

fn mine(data_dir: &Path, genesis_file: &Path, config: LedgerConfig, miner: &str) -> CliResult<()> {
    let ledger = open_ledger(data_dir, genesis_file, config)?;
    let miner = Address::from_raw(miner);
    let cancel = CancellationToken::new();
    let hash = ledger.mine_block(miner, &cancel, chrono::Utc::now().timestamp())?;
    persist_tip(data_dir, &ledger)?;
    let (height, _) = ledger.tip();
    info!(%hash, height, "mined block");
    println!("mined block {height}: {hash}");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn submit_tx(
    data_dir: &Path,
    genesis_file: &Path,
    config: LedgerConfig,
    sender_key: &str,
    recipient: &str,
    amount: Decimal,
    fee: Decimal,
    nonce: u64,
) -> CliResult<()> {
    let ledger = open_ledger(data_dir, genesis_file, config.clone())?;

    let private_key_bytes = hex::decode(sender_key).map_err(|e| CliError::Usage(e.to_string()))?;
    let keypair = KeyPair::from_private_key(private_key_bytes)?;

    let sender = keypair.address(config.network_type.address_prefix());
    let recipient = Address::from_raw(recipient);

    let mut tx = Transaction::new(
        sender,
        recipient,
        amount,
        fee,
        chrono::Utc::now().timestamp(),
        Some(nonce),
        TransactionType::Normal,
        BTreeMap::new(),
    );
    tx.sign(&keypair)?;

    let txid = ledger.submit_transaction(tx, chrono::Utc::now().timestamp())?;
    println!("submitted: {txid}");
    Ok(())
}

fn balance(data_dir: &Path, genesis_file: &Path, config: LedgerConfig, address: &str) -> CliResult<()> {
    let ledger = open_ledger(data_dir, genesis_file, config)?;
    let address = Address::from_raw(address);
    println!("{}", ledger.balance(&address));
    Ok(())
}

fn status(data_dir: &Path, genesis_file: &Path, config: LedgerConfig) -> CliResult<()> {
    let ledger = open_ledger(data_dir, genesis_file, config)?;
    let (height, hash) = ledger.tip();
    println!("height:  {height}");
    println!("tip:     {hash}");
    println!("supply:  {}", ledger.supply());
    Ok(())
}

fn validate_chain(data_dir: &Path, genesis_file: &Path, config: LedgerConfig) -> CliResult<()> {
    let ledger = open_ledger(data_dir, genesis_file, config)?;
    ledger.validate_chain()?;
    println!("chain is valid");
    Ok(())
}
