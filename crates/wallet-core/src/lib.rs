//! HD key derivation and the per-user address & transaction service.
//!
//! A master key derived from a mnemonic is exported once as an account key
//! per coin. The service only ever sees those account keys and derives
//! every user's address (and, for BTC, signing key) below them.

pub mod address;
pub mod config;
pub mod curve;
pub mod error;
pub mod hd_derivation;
pub mod key_file;
pub mod mnemonic;
pub mod path;
pub mod service;
pub mod types;

pub use address::{derive_address, derive_user_address, validate_address};
pub use config::ServiceConfig;
pub use error::WalletError;
pub use hd_derivation::ExtendedKey;
pub use mnemonic::{mnemonic_to_seed, validate_mnemonic, SeedPhrase};
pub use path::{DerivationPath, DerivationScheme};
pub use service::AddrTxService;
pub use types::{CoinType, DerivedAddress, Network};

/// Account key for `coin` derived from a mnemonic.
///
/// The key is private; call [`ExtendedKey::to_public`] before handing it to
/// anything that only needs addresses.
pub fn account_key_from_mnemonic(
    phrase: &str,
    passphrase: &str,
    network: Network,
    scheme: DerivationScheme,
    coin: CoinType,
) -> Result<ExtendedKey, WalletError> {
    let seed = mnemonic_to_seed(phrase, passphrase)?;
    let master = ExtendedKey::from_seed(&seed[..], network)?;
    master.derive_path(&scheme.account_path(coin))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn account_key_sits_at_scheme_path() {
        let key = account_key_from_mnemonic(
            ABANDON,
            "",
            Network::Mainnet,
            DerivationScheme::Bip44,
            CoinType::Eth,
        )
        .unwrap();
        assert!(key.is_private());
        assert_eq!(key.depth(), 4);
        assert_eq!(key.child_index(), 0);

        let simple = account_key_from_mnemonic(
            ABANDON,
            "",
            Network::Mainnet,
            DerivationScheme::Simple,
            CoinType::Eth,
        )
        .unwrap();
        assert_eq!(simple.depth(), 1);
    }

    #[test]
    fn account_key_rejects_bad_mnemonic() {
        assert!(matches!(
            account_key_from_mnemonic(
                "abandon",
                "",
                Network::Mainnet,
                DerivationScheme::Simple,
                CoinType::Btc
            ),
            Err(WalletError::InvalidMnemonic(_))
        ));
    }
}
