use k256::PublicKey;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::encode::{base58check_decode, base58check_encode};
use crate::error::BtcError;
use crate::network::BtcNetwork;

/// Compute Hash160 (RIPEMD-160(SHA-256(data))).
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// Derive a P2PKH (Base58Check) address from a compressed public key.
///
/// Takes a 33-byte compressed secp256k1 public key and returns an address
/// starting with `1` on mainnet, `m`/`n` on testnet.
pub fn pubkey_to_p2pkh_address(
    pubkey_bytes: &[u8; 33],
    network: BtcNetwork,
) -> Result<String, BtcError> {
    PublicKey::from_sec1_bytes(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
    })?;

    Ok(base58check_encode(
        network.p2pkh_version(),
        &hash160(pubkey_bytes),
    ))
}

/// Decode a P2PKH address into its version byte and 20-byte key hash.
pub fn decode_p2pkh_address(address: &str) -> Result<(u8, [u8; 20]), BtcError> {
    let payload = base58check_decode(address)
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address: {e}")))?;

    if payload.len() != 21 {
        return Err(BtcError::InvalidAddress(format!(
            "expected 21-byte payload, got {}",
            payload.len()
        )));
    }

    let mut pubkey_hash = [0u8; 20];
    pubkey_hash.copy_from_slice(&payload[1..]);
    Ok((payload[0], pubkey_hash))
}

/// Validate a P2PKH address string for the given network.
///
/// Returns `true` if the address is valid for the specified network,
/// `false` if it is well formed but belongs to a different network.
pub fn validate_address(address: &str, network: BtcNetwork) -> Result<bool, BtcError> {
    let (version, _) = decode_p2pkh_address(address)?;
    match BtcNetwork::from_p2pkh_version(version) {
        Some(net) => Ok(net == network),
        None => Err(BtcError::InvalidAddress(format!(
            "unknown address version {version:#04x}"
        ))),
    }
}
