//! Script templates used by the transaction codec.

use crate::address;
use crate::error::BtcError;

pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// Largest payload a single-byte direct push can carry.
const MAX_DIRECT_PUSH: usize = 75;

/// Build `OP_DUP OP_HASH160 <20> hash OP_EQUALVERIFY OP_CHECKSIG`.
pub fn p2pkh_script_pubkey(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(pubkey_hash.len() as u8);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Build the P2PKH locking script for a Base58Check address.
///
/// The version byte of the decoded payload is stripped; the remaining
/// 20 bytes are the public key hash.
pub fn p2pkh_script_from_address(addr: &str) -> Result<Vec<u8>, BtcError> {
    let (_, pubkey_hash) = address::decode_p2pkh_address(addr)?;
    Ok(p2pkh_script_pubkey(&pubkey_hash))
}

/// Build a data-carrier script: `OP_RETURN <len> data`.
pub fn op_return_script(data: &[u8]) -> Result<Vec<u8>, BtcError> {
    if data.len() > MAX_DIRECT_PUSH {
        return Err(BtcError::Encoding(format!(
            "data push of {} bytes exceeds direct push limit",
            data.len()
        )));
    }
    let mut script = Vec::with_capacity(2 + data.len());
    script.push(OP_RETURN);
    push_data(&mut script, data)?;
    Ok(script)
}

/// Append a direct push (`<len> data`) for payloads up to 75 bytes.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) -> Result<(), BtcError> {
    if data.len() > MAX_DIRECT_PUSH {
        return Err(BtcError::Encoding(format!(
            "data push of {} bytes exceeds direct push limit",
            data.len()
        )));
    }
    script.push(data.len() as u8);
    script.extend_from_slice(data);
    Ok(())
}
