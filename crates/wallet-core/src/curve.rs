//! secp256k1 primitives used by extended-key derivation.
//!
//! Private keys are 32-byte big-endian scalars; public keys travel in the
//! 33-byte compressed SEC1 form.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, ProjectivePoint, PublicKey, Scalar, SecretKey};

use crate::error::WalletError;

/// Parse a scalar, rejecting values at or above the curve order.
pub fn scalar_from_bytes(bytes: &[u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_repr(FieldBytes::from(*bytes)))
}

/// `(tweak + key) mod n`. Fails if `tweak >= n` or the sum is zero.
pub fn add_private_keys(tweak: &[u8; 32], key: &[u8; 32]) -> Result<[u8; 32], WalletError> {
    let tweak = scalar_from_bytes(tweak)
        .ok_or_else(|| WalletError::DerivationFailed("tweak is not below the curve order".into()))?;
    let key = scalar_from_bytes(key)
        .ok_or_else(|| {
            WalletError::MalformedKey("private key is not below the curve order".into())
        })?;

    let sum = tweak + key;
    if sum == Scalar::ZERO {
        return Err(WalletError::DerivationFailed("derived private key is zero".into()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&sum.to_repr());
    Ok(out)
}

/// Compressed public key for a private scalar.
pub fn public_from_private(key: &[u8; 32]) -> Result<[u8; 33], WalletError> {
    let secret = SecretKey::from_bytes(&FieldBytes::from(*key))
        .map_err(|_| WalletError::MalformedKey("private key out of range".into()))?;
    Ok(compress(&secret.public_key()))
}

/// `tweak·G + point`. Fails if `tweak >= n`, the point is not on the curve,
/// or the result is the point at infinity.
pub fn add_tweak_to_point(tweak: &[u8; 32], point: &[u8; 33]) -> Result<[u8; 33], WalletError> {
    let tweak = scalar_from_bytes(tweak)
        .ok_or_else(|| WalletError::DerivationFailed("tweak is not below the curve order".into()))?;
    let parent = decompress(point)?;

    let child = ProjectivePoint::GENERATOR * tweak + parent.to_projective();
    if child == ProjectivePoint::IDENTITY {
        return Err(WalletError::DerivationFailed("derived point is at infinity".into()));
    }
    let child = PublicKey::from_affine(child.to_affine())
        .map_err(|e| WalletError::DerivationFailed(format!("derived point is invalid: {e}")))?;
    Ok(compress(&child))
}

/// Parity tag (`0x02` even y, `0x03` odd y) followed by the x coordinate.
pub fn compress(point: &PublicKey) -> [u8; 33] {
    let encoded = point.to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Recover the full point from its compressed form.
pub fn decompress(bytes: &[u8; 33]) -> Result<PublicKey, WalletError> {
    if bytes[0] != 0x02 && bytes[0] != 0x03 {
        return Err(WalletError::MalformedKey(format!(
            "compressed point tag must be 0x02 or 0x03, got {:#04x}",
            bytes[0]
        )));
    }
    PublicKey::from_sec1_bytes(bytes)
        .map_err(|_| WalletError::MalformedKey("point is not on the secp256k1 curve".into()))
}

/// `0x04 ‖ x ‖ y` form of a compressed point.
pub fn expand(bytes: &[u8; 33]) -> Result<[u8; 65], WalletError> {
    let point = decompress(bytes)?;
    let encoded = point.to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(encoded.as_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    /// 2·G
    const TWO_G: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";
    /// n - 1
    const N_MINUS_ONE: &str = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140";

    fn bytes32(hex_str: &str) -> [u8; 32] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    fn bytes33(hex_str: &str) -> [u8; 33] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    fn one() -> [u8; 32] {
        let mut k = [0u8; 32];
        k[31] = 1;
        k
    }

    #[test]
    fn generator_from_scalar_one() {
        assert_eq!(hex::encode(public_from_private(&one()).unwrap()), G);
    }

    #[test]
    fn scalar_range_enforced() {
        assert!(scalar_from_bytes(&bytes32(N_MINUS_ONE)).is_some());
        let n = bytes32("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141");
        assert!(scalar_from_bytes(&n).is_none());
        assert!(scalar_from_bytes(&[0xff; 32]).is_none());
    }

    #[test]
    fn private_addition_wraps_and_rejects_zero() {
        let mut two = [0u8; 32];
        two[31] = 2;
        assert_eq!(add_private_keys(&one(), &one()).unwrap(), two);

        // (n - 1) + 2 = 1 mod n
        assert_eq!(add_private_keys(&bytes32(N_MINUS_ONE), &two).unwrap(), one());

        // (n - 1) + 1 = 0 mod n
        assert!(matches!(
            add_private_keys(&bytes32(N_MINUS_ONE), &one()),
            Err(WalletError::DerivationFailed(_))
        ));
    }

    #[test]
    fn point_addition_matches_scalar_addition() {
        let two_g = add_tweak_to_point(&one(), &bytes33(G)).unwrap();
        assert_eq!(hex::encode(two_g), TWO_G);
    }

    #[test]
    fn point_addition_to_infinity_fails() {
        // (n-1)·G + G = O
        assert!(add_tweak_to_point(&bytes32(N_MINUS_ONE), &bytes33(G)).is_err());
    }

    #[test]
    fn compressed_round_trip() {
        let expanded = expand(&bytes33(TWO_G)).unwrap();
        assert_eq!(expanded[0], 0x04);
        let point = PublicKey::from_sec1_bytes(&expanded).unwrap();
        assert_eq!(hex::encode(compress(&point)), TWO_G);
    }

    #[test]
    fn bad_points_rejected() {
        let mut bad_tag = bytes33(G);
        bad_tag[0] = 0x04;
        assert!(decompress(&bad_tag).is_err());

        // No point on secp256k1 has x = 0.
        let mut off_curve = [0u8; 33];
        off_curve[0] = 0x02;
        assert!(decompress(&off_curve).is_err());
    }
}
