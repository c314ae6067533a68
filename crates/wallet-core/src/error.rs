use thiserror::Error;

use chain_btc::error::BtcError;
use chain_eth::error::EthError;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Unsupported derivation: {0}")]
    UnsupportedDerivation(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported coin: {0}")]
    UnsupportedCoin(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("BTC: {0}")]
    Btc(#[from] BtcError),

    #[error("ETH: {0}")]
    Eth(#[from] EthError),
}
