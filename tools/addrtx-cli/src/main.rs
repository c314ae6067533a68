//! addrtx - per-user addresses and BTC transfers from exported account keys.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use wallet_core::address::address_for_key;
use wallet_core::{
    account_key_from_mnemonic, key_file, AddrTxService, CoinType, DerivationScheme, ServiceConfig,
};

#[derive(Parser, Debug)]
#[command(name = "addrtx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "addrtx.toml")]
    config: PathBuf,

    /// Log level, overrides the configuration file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive an account key from a mnemonic and write it as a key file
    ExportAccountKey {
        #[arg(long)]
        coin: CoinType,

        /// Output key file
        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, env = "ADDRTX_MNEMONIC", hide_env_values = true)]
        mnemonic: String,

        #[arg(long, env = "ADDRTX_PASSPHRASE", hide_env_values = true, default_value = "")]
        passphrase: String,

        /// Derivation scheme, defaults to the configured one
        #[arg(long)]
        scheme: Option<DerivationScheme>,

        /// Keep the private half (needed for signing)
        #[arg(long)]
        private: bool,
    },

    /// Print the address of a user
    Address {
        #[arg(long)]
        coin: CoinType,

        #[arg(short, long)]
        user: u32,
    },

    /// Show what a key file holds
    InspectKey { path: PathBuf },

    /// Build a transfer between two users
    Transaction {
        #[arg(long)]
        coin: CoinType,

        #[arg(long)]
        from: u32,

        #[arg(long)]
        to: u32,

        /// Amount in the coin's base unit (satoshis for BTC)
        #[arg(long)]
        amount: u64,

        /// Sign and relay through a UTXO source instead of printing
        #[arg(long)]
        broadcast: bool,

        /// Attached as OP_RETURN data, up to 40 bytes
        #[arg(long, requires = "broadcast")]
        memo: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    init_logging(args.log_level.as_deref().unwrap_or(&config.log_level))?;

    match args.command {
        Command::ExportAccountKey {
            coin,
            out,
            mnemonic,
            passphrase,
            scheme,
            private,
        } => {
            let scheme = scheme.unwrap_or(config.scheme);
            let key =
                account_key_from_mnemonic(&mnemonic, &passphrase, config.network, scheme, coin)
                    .context("Failed to derive account key")?;
            let key = if private { key } else { key.to_public() };

            key_file::save(&key, &out)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!(coin = %coin, path = %scheme.account_path(coin), private, "account key exported");
            println!("{}", key.to_public());
        }

        Command::Address { coin, user } => {
            let service = AddrTxService::from_config(&config)?;
            let derived = service.get_address(coin, user)?;
            println!("{}\t{}", derived.address, derived.derivation_path);
        }

        Command::InspectKey { path } => {
            let key = key_file::load(&path)
                .with_context(|| format!("Failed to read key file {}", path.display()))?;
            println!("network:            {}", key.network());
            println!("private:            {}", key.is_private());
            println!("depth:              {}", key.depth());
            println!("child index:        {}", key.child_index());
            println!("parent fingerprint: {}", hex::encode(key.parent_fingerprint()));
            println!("fingerprint:        {}", hex::encode(key.fingerprint()));
            println!("extended public:    {}", key.to_public());
            for coin in CoinType::ALL {
                println!("{:<20}{}", format!("{coin} address:"), address_for_key(&key, coin)?);
            }
        }

        Command::Transaction {
            coin,
            from,
            to,
            amount,
            broadcast,
            memo,
        } => {
            let service = AddrTxService::from_config(&config)?;
            if broadcast {
                if coin != CoinType::Btc {
                    bail!("only BTC transfers can be broadcast");
                }
                let memo = memo.unwrap_or_default();
                let txid = service.send_transaction(from, to, amount, memo.as_bytes())?;
                println!("{txid}");
            } else {
                println!("{}", service.get_transaction(coin, from, to, amount)?);
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<ServiceConfig> {
    if !path.exists() {
        return Ok(ServiceConfig::default());
    }
    ServiceConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
