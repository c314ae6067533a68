use std::fmt;
use std::str::FromStr;

use chain_btc::network::BtcNetwork;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// Coins served by the address & transaction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinType {
    Btc,
    Eth,
}

impl CoinType {
    /// BIP-44 coin type for this coin
    pub fn bip44_coin_type(&self) -> u32 {
        match self {
            CoinType::Btc => 0,
            CoinType::Eth => 60,
        }
    }

    /// Native token symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            CoinType::Btc => "BTC",
            CoinType::Eth => "ETH",
        }
    }

    pub const ALL: [CoinType; 2] = [CoinType::Btc, CoinType::Eth];
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for CoinType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "btc" | "bitcoin" => Ok(CoinType::Btc),
            "eth" | "ethereum" => Ok(CoinType::Eth),
            other => Err(WalletError::UnsupportedCoin(other.to_string())),
        }
    }
}

/// Network an extended key or address belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

/// `xprv`
pub const MAINNET_PRIVATE: u32 = 0x0488_ADE4;
/// `xpub`
pub const MAINNET_PUBLIC: u32 = 0x0488_B21E;
/// `tprv`
pub const TESTNET_PRIVATE: u32 = 0x0435_8394;
/// `tpub`
pub const TESTNET_PUBLIC: u32 = 0x0435_87CF;

impl Network {
    /// Extended-key version tag for this network.
    pub fn key_version(&self, private: bool) -> u32 {
        match (self, private) {
            (Network::Mainnet, true) => MAINNET_PRIVATE,
            (Network::Mainnet, false) => MAINNET_PUBLIC,
            (Network::Testnet, true) => TESTNET_PRIVATE,
            (Network::Testnet, false) => TESTNET_PUBLIC,
        }
    }

    /// Split a version tag into its network and whether it marks a private key.
    pub fn from_key_version(version: u32) -> Option<(Network, bool)> {
        match version {
            MAINNET_PRIVATE => Some((Network::Mainnet, true)),
            MAINNET_PUBLIC => Some((Network::Mainnet, false)),
            TESTNET_PRIVATE => Some((Network::Testnet, true)),
            TESTNET_PUBLIC => Some((Network::Testnet, false)),
            _ => None,
        }
    }

    pub fn btc(&self) -> BtcNetwork {
        match self {
            Network::Mainnet => BtcNetwork::Mainnet,
            Network::Testnet => BtcNetwork::Testnet,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

/// Address derived for one user of one coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddress {
    pub coin: CoinType,
    pub user_id: u32,
    pub address: String,
    pub derivation_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_types_follow_bip44() {
        assert_eq!(CoinType::Btc.bip44_coin_type(), 0);
        assert_eq!(CoinType::Eth.bip44_coin_type(), 60);
    }

    #[test]
    fn coin_parses_case_insensitively() {
        assert_eq!("BTC".parse::<CoinType>().unwrap(), CoinType::Btc);
        assert_eq!("eth".parse::<CoinType>().unwrap(), CoinType::Eth);
        assert!(matches!(
            "doge".parse::<CoinType>(),
            Err(WalletError::UnsupportedCoin(_))
        ));
    }

    #[test]
    fn version_tags_round_trip() {
        for network in [Network::Mainnet, Network::Testnet] {
            for private in [true, false] {
                let version = network.key_version(private);
                assert_eq!(Network::from_key_version(version), Some((network, private)));
            }
        }
        assert_eq!(Network::from_key_version(0xdead_beef), None);
    }

    #[test]
    fn network_defaults_to_mainnet() {
        assert_eq!(Network::default(), Network::Mainnet);
        assert_eq!(Network::Testnet.btc(), BtcNetwork::Testnet);
    }
}
