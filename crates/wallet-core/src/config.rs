//! Service configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::path::DerivationScheme;
use crate::types::Network;

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Instance name, used in logs.
    #[serde(default = "default_title")]
    pub title: String,
    /// Network (mainnet, testnet).
    #[serde(default)]
    pub network: Network,
    /// How user keys are laid out below the master key.
    #[serde(default)]
    pub scheme: DerivationScheme,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Account key files.
    #[serde(default)]
    pub keys: KeysConfig,
    /// Unspent-output sources and transfer policy.
    #[serde(default)]
    pub utxo: UtxoConfig,
}

fn default_title() -> String {
    "addrtx".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Key file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    /// BTC account key (public is enough for addresses).
    pub btc_account: Option<PathBuf>,
    /// ETH account key.
    pub eth_account: Option<PathBuf>,
    /// Private BTC account key. When set, transfers come back signed.
    pub btc_signing: Option<PathBuf>,
}

/// UTXO configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtxoConfig {
    /// JSON fixture files, one in-memory source each.
    #[serde(default)]
    pub fixtures: Vec<PathBuf>,
    /// Seed for picking among sources. Unset means OS entropy.
    pub selection_seed: Option<u64>,
    /// Fee deducted from every transfer, in satoshis.
    #[serde(default = "default_flat_fee")]
    pub flat_fee_sat: u64,
}

fn default_flat_fee() -> u64 {
    10_000
}

impl Default for UtxoConfig {
    fn default() -> Self {
        Self {
            fixtures: Vec::new(),
            selection_seed: None,
            flat_fee_sat: default_flat_fee(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            network: Network::default(),
            scheme: DerivationScheme::default(),
            log_level: default_log_level(),
            keys: KeysConfig::default(),
            utxo: UtxoConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from a TOML file.
    ///
    /// Relative key and fixture paths are resolved against the file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WalletError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, WalletError> {
        toml::from_str(content)
            .map_err(|e| WalletError::Config(format!("failed to parse config: {e}")))
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        for path in [
            self.keys.btc_account.as_mut(),
            self.keys.eth_account.as_mut(),
            self.keys.btc_signing.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            resolve(path);
        }
        self.utxo.fixtures.iter_mut().for_each(resolve);
    }
}
