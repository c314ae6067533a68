use std::fmt;
use std::str::FromStr;

use chain_btc::address::hash160;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroize;

use crate::curve;
use crate::error::WalletError;
use crate::path::DerivationPath;
use crate::types::Network;

type HmacSha512 = Hmac<Sha512>;

/// Child indices at or above this value are hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Length of the canonical serialized extended key.
pub const EXTENDED_KEY_LEN: usize = 78;

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";
const MIN_SEED_LEN: usize = 16;
const MAX_SEED_LEN: usize = 64;

/// A BIP-32 extended key: a private or public secp256k1 key plus the chain
/// code needed to derive its children.
///
/// Private keys always carry their public key; the private half is wiped on
/// drop.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedKey {
    network: Network,
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_index: u32,
    chain_code: [u8; 32],
    public_key: [u8; 33],
    private_key: Option<[u8; 32]>,
}

impl ExtendedKey {
    /// Master key for a seed: `HMAC-SHA512("Bitcoin seed", seed)`.
    pub fn from_seed(seed: &[u8], network: Network) -> Result<Self, WalletError> {
        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&seed.len()) {
            return Err(WalletError::InvalidSeed(format!(
                "seed must be {MIN_SEED_LEN} to {MAX_SEED_LEN} bytes, got {}",
                seed.len()
            )));
        }

        let mut mac = HmacSha512::new_from_slice(MASTER_HMAC_KEY)
            .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;
        mac.update(seed);
        let (mut key, chain_code) = split_hmac(mac);

        if curve::scalar_from_bytes(&key).map_or(true, |k| k == k256::Scalar::ZERO) {
            key.zeroize();
            return Err(WalletError::InvalidSeed("seed yields an invalid master key".into()));
        }
        let public_key = curve::public_from_private(&key)?;

        Ok(Self {
            network,
            depth: 0,
            parent_fingerprint: [0; 4],
            child_index: 0,
            chain_code,
            public_key,
            private_key: Some(key),
        })
    }

    /// Derive the child at `index`.
    ///
    /// Normal indices commit to the parent public key, hardened ones to the
    /// private key, so a public-only parent cannot derive hardened children.
    pub fn derive_child(&self, index: u32) -> Result<Self, WalletError> {
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| WalletError::DerivationFailed("maximum depth of 255 reached".into()))?;

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;
        if index >= HARDENED_OFFSET {
            let key = self.private_key.as_ref().ok_or_else(|| {
                WalletError::UnsupportedDerivation(format!(
                    "hardened child {index} cannot be derived from a public key"
                ))
            })?;
            mac.update(&[0x00]);
            mac.update(key);
        } else {
            mac.update(&self.public_key);
        }
        mac.update(&index.to_be_bytes());
        let (mut tweak, chain_code) = split_hmac(mac);

        let derived = match &self.private_key {
            Some(parent) => curve::add_private_keys(&tweak, parent).and_then(|key| {
                let public_key = curve::public_from_private(&key)?;
                Ok((public_key, Some(key)))
            }),
            None => curve::add_tweak_to_point(&tweak, &self.public_key)
                .map(|public_key| (public_key, None)),
        };
        tweak.zeroize();
        let (public_key, private_key) = derived?;

        Ok(Self {
            network: self.network,
            depth,
            parent_fingerprint: self.fingerprint(),
            child_index: index,
            chain_code,
            public_key,
            private_key,
        })
    }

    /// Walk `path` starting from this key.
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, WalletError> {
        path.indices()
            .iter()
            .try_fold(self.clone(), |key, &index| key.derive_child(index))
    }

    /// Public counterpart with the same chain code and position.
    pub fn to_public(&self) -> Self {
        let mut public = self.clone();
        if let Some(key) = public.private_key.as_mut() {
            key.zeroize();
        }
        public.private_key = None;
        public
    }

    pub fn is_private(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn parent_fingerprint(&self) -> [u8; 4] {
        self.parent_fingerprint
    }

    pub fn child_index(&self) -> u32 {
        self.child_index
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// Compressed public key.
    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    pub fn private_key(&self) -> Option<&[u8; 32]> {
        self.private_key.as_ref()
    }

    /// First four bytes of hash160 of the public key.
    pub fn fingerprint(&self) -> [u8; 4] {
        let hash = hash160(&self.public_key);
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Four-byte version tag (`xprv`, `xpub`, `tprv` or `tpub`).
    pub fn version(&self) -> u32 {
        self.network.key_version(self.is_private())
    }

    /// `0x00 ‖ secret` for private keys, the compressed point otherwise.
    pub fn key_material(&self) -> [u8; 33] {
        match &self.private_key {
            Some(key) => {
                let mut material = [0u8; 33];
                material[1..].copy_from_slice(key);
                material
            }
            None => self.public_key,
        }
    }

    /// Rebuild a key from its serialized fields, validating each one.
    pub fn from_fields(
        version: u32,
        depth: u8,
        parent_fingerprint: [u8; 4],
        child_index: u32,
        chain_code: [u8; 32],
        key_material: &[u8; 33],
    ) -> Result<Self, WalletError> {
        let (network, private) = Network::from_key_version(version)
            .ok_or_else(|| WalletError::MalformedKey(format!("unknown version {version:#010x}")))?;

        if depth == 0 && (parent_fingerprint != [0; 4] || child_index != 0) {
            return Err(WalletError::MalformedKey(
                "master key must have zero parent fingerprint and child index".into(),
            ));
        }

        let (public_key, private_key) = if private {
            if key_material[0] != 0x00 {
                return Err(WalletError::MalformedKey(
                    "private key material must start with 0x00".into(),
                ));
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&key_material[1..]);
            match curve::public_from_private(&key) {
                Ok(public_key) => (public_key, Some(key)),
                Err(e) => {
                    key.zeroize();
                    return Err(e);
                }
            }
        } else {
            curve::decompress(key_material)?;
            (*key_material, None)
        };

        Ok(Self {
            network,
            depth,
            parent_fingerprint,
            child_index,
            chain_code,
            public_key,
            private_key,
        })
    }

    /// Canonical 78-byte serialization:
    /// `version ‖ depth ‖ parent fingerprint ‖ child index ‖ chain code ‖ key`.
    pub fn to_bytes(&self) -> [u8; EXTENDED_KEY_LEN] {
        let mut out = [0u8; EXTENDED_KEY_LEN];
        out[0..4].copy_from_slice(&self.version().to_be_bytes());
        out[4] = self.depth;
        out[5..9].copy_from_slice(&self.parent_fingerprint);
        out[9..13].copy_from_slice(&self.child_index.to_be_bytes());
        out[13..45].copy_from_slice(&self.chain_code);
        out[45..78].copy_from_slice(&self.key_material());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if bytes.len() != EXTENDED_KEY_LEN {
            return Err(WalletError::MalformedKey(format!(
                "extended key must be {EXTENDED_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let version = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let parent_fingerprint = [bytes[5], bytes[6], bytes[7], bytes[8]];
        let child_index = u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&bytes[13..45]);
        let mut key_material = [0u8; 33];
        key_material.copy_from_slice(&bytes[45..78]);

        let key = Self::from_fields(
            version,
            bytes[4],
            parent_fingerprint,
            child_index,
            chain_code,
            &key_material,
        );
        key_material.zeroize();
        key
    }
}

/// Split an HMAC-SHA512 result into its left (key/tweak) and right (chain
/// code) halves.
fn split_hmac(mac: HmacSha512) -> ([u8; 32], [u8; 32]) {
    let mut output = [0u8; 64];
    output.copy_from_slice(&mac.finalize().into_bytes());

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&output[..32]);
    right.copy_from_slice(&output[32..]);
    output.zeroize();
    (left, right)
}

impl Drop for ExtendedKey {
    fn drop(&mut self) {
        if let Some(key) = self.private_key.as_mut() {
            key.zeroize();
        }
        self.chain_code.zeroize();
    }
}

impl fmt::Display for ExtendedKey {
    /// Base58Check of the canonical serialization (`xprv…`, `xpub…`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.to_bytes();
        let encoded = bs58::encode(&bytes).with_check().into_string();
        bytes.zeroize();
        f.write_str(&encoded)
    }
}

impl FromStr for ExtendedKey {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| WalletError::Encoding(format!("extended key base58check: {e}")))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("network", &self.network)
            .field("depth", &self.depth)
            .field("parent_fingerprint", &hex::encode(self.parent_fingerprint))
            .field("child_index", &self.child_index)
            .field("public_key", &hex::encode(self.public_key))
            .field("private", &self.is_private())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// BIP-32 test vector 1.
    const SEED_1: &str = "000102030405060708090a0b0c0d0e0f";
    const M_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
    const M_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
    const M_0H_XPRV: &str = "xprv9uHRZZhk6KAJC1avXpDAp4MDc3sQKNxDiPvvkX8Br5ngLNv1TxvUxt4cV1rGL5hj6KCesnDYUhd7oWgT11eZG7XnxHrnYeSvkzY7d2bhkJ7";
    const M_0H_XPUB: &str = "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw";
    const M_0H_1_XPUB: &str = "xpub6ASuArnXKPbfEwhqN6e3mwBcDTgzisQN1wXN9BJcM47sSikHjJf3UFHKkNAWbWMiGj7Wf5uMash7SyYq527Hqck2AxYysAA7xmALppuCkwQ";

    fn master() -> ExtendedKey {
        ExtendedKey::from_seed(&hex::decode(SEED_1).unwrap(), Network::Mainnet).unwrap()
    }

    #[test]
    fn bip32_vector_1_master() {
        let master = master();
        assert_eq!(master.to_string(), M_XPRV);
        assert_eq!(master.to_public().to_string(), M_XPUB);
        assert_eq!(master.depth(), 0);
        assert_eq!(master.parent_fingerprint(), [0; 4]);
    }

    #[test]
    fn bip32_vector_1_hardened_child() {
        let child = master().derive_child(HARDENED_OFFSET).unwrap();
        assert_eq!(child.to_string(), M_0H_XPRV);
        assert_eq!(child.to_public().to_string(), M_0H_XPUB);
        assert_eq!(child.depth(), 1);
        assert_eq!(child.parent_fingerprint(), master().fingerprint());
    }

    #[test]
    fn public_parent_derives_normal_children() {
        let parent: ExtendedKey = M_0H_XPUB.parse().unwrap();
        assert!(!parent.is_private());
        let child = parent.derive_child(1).unwrap();
        assert_eq!(child.to_string(), M_0H_1_XPUB);
    }

    #[test]
    fn hardened_from_public_is_unsupported() {
        let public = master().to_public();
        assert!(matches!(
            public.derive_child(HARDENED_OFFSET + 5),
            Err(WalletError::UnsupportedDerivation(_))
        ));
    }

    #[test]
    fn derive_path_walks_each_level() {
        let path: DerivationPath = "m/0'/1".parse().unwrap();
        let key = master().derive_path(&path).unwrap();
        assert_eq!(key.to_public().to_string(), M_0H_1_XPUB);
        assert_eq!(key.depth(), 2);
        assert_eq!(key.child_index(), 1);
    }

    #[test]
    fn matches_bip32_crate() {
        let seed = [0x5au8; 64];
        let path = "m/44'/0'/0'/0/7";
        let ours = ExtendedKey::from_seed(&seed, Network::Mainnet)
            .unwrap()
            .derive_path(&path.parse().unwrap())
            .unwrap();
        let theirs = bip32::XPrv::derive_from_path(seed, &path.parse().unwrap()).unwrap();

        assert_eq!(ours.private_key().unwrap(), &theirs.to_bytes());
        assert_eq!(ours.public_key(), &theirs.public_key().to_bytes());
        assert_eq!(ours.chain_code(), &theirs.attrs().chain_code);
    }

    #[test]
    fn canonical_round_trip() {
        for key in [master(), master().derive_child(HARDENED_OFFSET).unwrap().to_public()] {
            let decoded: ExtendedKey = key.to_string().parse().unwrap();
            assert_eq!(decoded, key);
            assert_eq!(ExtendedKey::from_bytes(&key.to_bytes()).unwrap(), key);
        }
    }

    #[test]
    fn testnet_prefixes() {
        let key = ExtendedKey::from_seed(&hex::decode(SEED_1).unwrap(), Network::Testnet).unwrap();
        assert!(key.to_string().starts_with("tprv"));
        assert!(key.to_public().to_string().starts_with("tpub"));
        let decoded: ExtendedKey = key.to_string().parse().unwrap();
        assert_eq!(decoded.network(), Network::Testnet);
    }

    #[test]
    fn seed_length_enforced() {
        assert!(matches!(
            ExtendedKey::from_seed(&[1u8; 15], Network::Mainnet),
            Err(WalletError::InvalidSeed(_))
        ));
        assert!(ExtendedKey::from_seed(&[1u8; 65], Network::Mainnet).is_err());
        assert!(ExtendedKey::from_seed(&[1u8; 16], Network::Mainnet).is_ok());
        assert!(ExtendedKey::from_seed(&[1u8; 64], Network::Mainnet).is_ok());
    }

    #[test]
    fn malformed_serializations_rejected() {
        let good = master().to_bytes();

        assert!(ExtendedKey::from_bytes(&good[..77]).is_err());

        let mut bad_version = good;
        bad_version[0..4].copy_from_slice(&0xdead_beefu32.to_be_bytes());
        assert!(matches!(
            ExtendedKey::from_bytes(&bad_version),
            Err(WalletError::MalformedKey(_))
        ));

        let mut bad_padding = good;
        bad_padding[45] = 0x01;
        assert!(ExtendedKey::from_bytes(&bad_padding).is_err());

        let mut orphan_master = good;
        orphan_master[5] = 0x01;
        assert!(ExtendedKey::from_bytes(&orphan_master).is_err());

        let mut bad_point = master().to_public().to_bytes();
        bad_point[45] = 0x05;
        assert!(ExtendedKey::from_bytes(&bad_point).is_err());

        assert!(matches!(
            "xpub-not-base58".parse::<ExtendedKey>(),
            Err(WalletError::Encoding(_))
        ));
    }

    #[test]
    fn debug_hides_private_key() {
        let key = master();
        let debug = format!("{key:?}");
        assert!(debug.contains("private: true"));
        assert!(!debug.contains(&hex::encode(key.private_key().unwrap())));
    }

    proptest! {
        #[test]
        fn public_derivation_matches_private(index in 0u32..HARDENED_OFFSET) {
            let parent = master().derive_child(HARDENED_OFFSET + 44).unwrap();
            let from_private = parent.derive_child(index).unwrap().to_public();
            let from_public = parent.to_public().derive_child(index).unwrap();
            prop_assert_eq!(from_private, from_public);
        }

        #[test]
        fn derivation_is_deterministic(index in any::<u32>()) {
            let a = master().derive_child(index).unwrap();
            let b = master().derive_child(index).unwrap();
            prop_assert_eq!(a.to_bytes(), b.to_bytes());
        }
    }

    const _: () = {
        const fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExtendedKey>();
    };

    #[test]
    fn sibling_derivation_is_order_independent_across_threads() {
        let parent = std::sync::Arc::new(master().derive_child(0).unwrap().to_public());
        let sequential: Vec<[u8; EXTENDED_KEY_LEN]> = (0..64)
            .map(|i| parent.derive_child(i).unwrap().to_bytes())
            .collect();

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let parent = parent.clone();
                std::thread::spawn(move || {
                    // Each thread walks the siblings in reverse, offset by its id.
                    (0..64u32)
                        .rev()
                        .map(|i| (i + t * 8) % 64)
                        .map(|i| (i, parent.derive_child(i).unwrap().to_bytes()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for (index, bytes) in handle.join().unwrap() {
                assert_eq!(bytes, sequential[index as usize], "child {index}");
            }
        }
    }
}
