use crate::curve;
use crate::error::WalletError;
use crate::hd_derivation::ExtendedKey;
use crate::path::DerivationScheme;
use crate::types::{CoinType, DerivedAddress, Network};

/// Plain address of `key` on `coin`.
///
/// BTC yields a Base58Check P2PKH address for the key's network; ETH yields
/// lowercase `0x` hex without checksum.
pub fn address_for_key(key: &ExtendedKey, coin: CoinType) -> Result<String, WalletError> {
    match coin {
        CoinType::Btc => Ok(chain_btc::address::pubkey_to_p2pkh_address(
            key.public_key(),
            key.network().btc(),
        )?),
        CoinType::Eth => {
            let uncompressed = curve::expand(key.public_key())?;
            Ok(chain_eth::address::pubkey_to_eth_address(&uncompressed)?)
        }
    }
}

/// Reject an account key that does not sit at `scheme`'s account depth.
pub fn ensure_account_depth(
    account_key: &ExtendedKey,
    coin: CoinType,
    scheme: DerivationScheme,
) -> Result<(), WalletError> {
    let account_path = scheme.account_path(coin);
    if usize::from(account_key.depth()) != account_path.len() {
        return Err(WalletError::InvalidPath(format!(
            "{coin} account key is at depth {}, {account_path} is at depth {}",
            account_key.depth(),
            account_path.len()
        )));
    }
    Ok(())
}

/// Address of `user_id` below an account key.
///
/// The account key may be public: user keys are normal children. It must
/// sit at the scheme's account depth. ETH addresses are returned in EIP-55
/// mixed case.
pub fn derive_user_address(
    account_key: &ExtendedKey,
    coin: CoinType,
    scheme: DerivationScheme,
    user_id: u32,
) -> Result<DerivedAddress, WalletError> {
    ensure_account_depth(account_key, coin, scheme)?;
    let path = scheme.user_path(coin, user_id)?;
    let user_key = account_key.derive_child(user_id)?;

    let address = match coin {
        CoinType::Btc => address_for_key(&user_key, coin)?,
        CoinType::Eth => chain_eth::address::checksum_address(&address_for_key(&user_key, coin)?)?,
    };

    Ok(DerivedAddress {
        coin,
        user_id,
        address,
        derivation_path: path.to_string(),
    })
}

/// Address of `user_id` derived all the way from a seed.
pub fn derive_address(
    seed: &[u8],
    network: Network,
    coin: CoinType,
    scheme: DerivationScheme,
    user_id: u32,
) -> Result<DerivedAddress, WalletError> {
    let master = ExtendedKey::from_seed(seed, network)?;
    let account_key = master.derive_path(&scheme.account_path(coin))?;
    derive_user_address(&account_key, coin, scheme, user_id)
}

/// Validate an address for a coin.
///
/// `Ok(false)` means the address is well formed but belongs to another
/// network (BTC) or fails its mixed-case checksum (ETH).
pub fn validate_address(
    address: &str,
    coin: CoinType,
    network: Network,
) -> Result<bool, WalletError> {
    match coin {
        CoinType::Btc => Ok(chain_btc::address::validate_address(address, network.btc())?),
        CoinType::Eth => Ok(chain_eth::address::validate_address(address)?),
    }
}
