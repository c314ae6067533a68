use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use sha3::{Digest, Keccak256};

use crate::error::EthError;

/// Raw 20-byte account id: the tail of Keccak-256 over the 64-byte `x ‖ y`
/// point encoding.
pub fn account_id(point_xy: &[u8; 64]) -> [u8; 20] {
    let hash = Keccak256::digest(point_xy);
    let mut id = [0u8; 20];
    id.copy_from_slice(&hash[12..]);
    id
}

/// Address for an uncompressed secp256k1 public key (65 bytes, `0x04` prefix).
///
/// Returned as `0x` followed by 40 lowercase hex digits, without checksum.
pub fn pubkey_to_eth_address(uncompressed_pubkey: &[u8; 65]) -> Result<String, EthError> {
    if uncompressed_pubkey[0] != 0x04 {
        return Err(EthError::InvalidPublicKey(
            "uncompressed key must start with 0x04".into(),
        ));
    }
    PublicKey::from_sec1_bytes(uncompressed_pubkey)
        .map_err(|e| EthError::InvalidPublicKey(format!("point is not on the curve: {e}")))?;

    let mut point_xy = [0u8; 64];
    point_xy.copy_from_slice(&uncompressed_pubkey[1..]);
    Ok(format!("0x{}", hex::encode(account_id(&point_xy))))
}

/// Address for a compressed secp256k1 public key (33 bytes).
pub fn pubkey_bytes_to_eth_address(pubkey_33_bytes: &[u8; 33]) -> Result<String, EthError> {
    let pubkey = PublicKey::from_sec1_bytes(pubkey_33_bytes)
        .map_err(|e| EthError::InvalidPublicKey(format!("invalid compressed key: {e}")))?;

    let uncompressed = pubkey.to_encoded_point(false);
    let key_65: [u8; 65] = uncompressed
        .as_bytes()
        .try_into()
        .map_err(|_| EthError::InvalidPublicKey("unexpected uncompressed length".into()))?;

    pubkey_to_eth_address(&key_65)
}

fn hex_body(address: &str) -> Result<&str, EthError> {
    let body = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidAddress("address must start with 0x".into()))?;

    if body.len() != 40 {
        return Err(EthError::InvalidAddress(format!(
            "expected 40 hex characters, got {}",
            body.len()
        )));
    }
    if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(EthError::InvalidAddress(
            "address contains non-hex characters".into(),
        ));
    }
    Ok(body)
}

/// EIP-55 mixed-case rendering of an address.
///
/// Accepts any casing. A letter is upper-cased when the matching nibble of
/// Keccak-256 over the lowercase hex is 8 or more.
pub fn checksum_address(address: &str) -> Result<String, EthError> {
    let lower = hex_body(address)?.to_ascii_lowercase();
    let hash = Keccak256::digest(lower.as_bytes());

    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if nibble >= 8 {
            checksummed.push(c.to_ascii_uppercase());
        } else {
            checksummed.push(c);
        }
    }
    Ok(checksummed)
}

/// Validate an address string.
///
/// Single-case addresses carry no checksum and are accepted as is. Mixed
/// case must match the EIP-55 rendering; `Ok(false)` means it does not.
pub fn validate_address(address: &str) -> Result<bool, EthError> {
    let body = hex_body(address)?;

    let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
    if !(has_lower && has_upper) {
        return Ok(true);
    }

    Ok(checksum_address(address)?[2..] == *body)
}
