/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
}

impl BtcNetwork {
    /// Version byte prepended to a pay-to-pubkey-hash address payload.
    pub fn p2pkh_version(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => 0x00,
            BtcNetwork::Testnet => 0x6F,
        }
    }

    /// Map a P2PKH version byte back to its network.
    pub fn from_p2pkh_version(version: u8) -> Option<Self> {
        match version {
            0x00 => Some(BtcNetwork::Mainnet),
            0x6F => Some(BtcNetwork::Testnet),
            _ => None,
        }
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_versions() {
        assert_eq!(BtcNetwork::Mainnet.p2pkh_version(), 0x00);
        assert_eq!(BtcNetwork::Testnet.p2pkh_version(), 0x6F);
    }

    #[test]
    fn version_roundtrip() {
        for net in [BtcNetwork::Mainnet, BtcNetwork::Testnet] {
            assert_eq!(BtcNetwork::from_p2pkh_version(net.p2pkh_version()), Some(net));
        }
        assert_eq!(BtcNetwork::from_p2pkh_version(0x05), None);
    }

    #[test]
    fn display_names() {
        assert_eq!(BtcNetwork::Mainnet.to_string(), "mainnet");
        assert_eq!(BtcNetwork::Testnet.to_string(), "testnet");
    }
}
