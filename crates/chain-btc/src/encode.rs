//! Low-level wire encoding helpers: compact-size integers, double SHA-256
//! and Base58Check.

use sha2::{Digest, Sha256};

use crate::error::BtcError;

/// Append `n` to `buf` using the compact-size (varint) encoding.
///
/// | Range                    | Bytes                 |
/// |--------------------------|-----------------------|
/// | `< 0xfd`                 | 1                     |
/// | `<= 0xffff`              | `0xfd` + 2 LE         |
/// | `<= 0xffff_ffff`         | `0xfe` + 4 LE         |
/// | otherwise                | `0xff` + 8 LE         |
pub fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

/// Encode `n` as a standalone compact-size integer.
pub fn encode_varint(n: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    write_varint(&mut buf, n);
    buf
}

/// Decode a compact-size integer from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed. Non-minimal
/// encodings are rejected.
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize), BtcError> {
    let marker = *bytes
        .first()
        .ok_or_else(|| BtcError::Encoding("empty varint".into()))?;

    let width = match marker {
        0xfd => 2,
        0xfe => 4,
        0xff => 8,
        small => return Ok((small as u64, 1)),
    };

    let body = bytes.get(1..1 + width).ok_or_else(|| {
        BtcError::Encoding(format!("truncated varint: need {} bytes", 1 + width))
    })?;
    let mut le = [0u8; 8];
    le[..width].copy_from_slice(body);
    let value = u64::from_le_bytes(le);

    let minimum = match width {
        2 => 0xfd,
        4 => 0x1_0000,
        _ => 0x1_0000_0000,
    };
    if value < minimum {
        return Err(BtcError::Encoding(format!(
            "non-canonical varint: {value} encoded in {} bytes",
            1 + width
        )));
    }

    Ok((value, 1 + width))
}

/// SHA-256 applied twice.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// Base58Check-encode `version || payload` (4-byte double SHA-256 checksum).
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len());
    data.push(version);
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

/// Decode a Base58Check string, verifying the checksum.
///
/// Returns the full payload including its leading version byte(s).
pub fn base58check_decode(encoded: &str) -> Result<Vec<u8>, BtcError> {
    bs58::decode(encoded)
        .with_check(None)
        .into_vec()
        .map_err(|e| BtcError::Encoding(format!("base58check: {e}")))
}
