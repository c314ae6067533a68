//! Decoding of block-explorer JSON responses.
//!
//! Explorers answer with an envelope of `status`, `data`, `code` and
//! `message`. Anything other than `"success"` is reported as a service error
//! carrying the explorer's own message.

use serde::Deserialize;

use crate::error::BtcError;
use crate::utxo::Utxo;

/// Satoshis per bitcoin.
pub const SAT_PER_BTC: u64 = 100_000_000;

const SUCCESS: &str = "success";

/// Response of an unspent-outputs listing for one address.
#[derive(Debug, Clone, Deserialize)]
pub struct UnspentResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<UnspentData>,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnspentData {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub unspent: Vec<UnspentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnspentEntry {
    /// Funding txid in display (byte-reversed) hex.
    pub tx: String,
    /// Decimal BTC amount, e.g. `"0.00150000"`.
    pub amount: String,
    pub n: u32,
    #[serde(default)]
    pub confirmations: u64,
    pub script: String,
}

/// Response of a raw-transaction push.
#[derive(Debug, Clone, Deserialize)]
pub struct PushResponse {
    pub status: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

fn check_status(status: &str, code: i64, message: &str) -> Result<(), BtcError> {
    if status != SUCCESS {
        return Err(BtcError::Service(format!(
            "explorer returned {status} ({code}): {message}"
        )));
    }
    Ok(())
}

impl UnspentResponse {
    pub fn parse(json: &str) -> Result<Self, BtcError> {
        serde_json::from_str(json)
            .map_err(|e| BtcError::Service(format!("invalid unspent response: {e}")))
    }

    /// Convert the listing into UTXOs owned by `address`.
    ///
    /// Transaction hashes keep the explorer's display order; the codec
    /// reverses them when writing inputs.
    pub fn into_utxos(self, address: &str) -> Result<Vec<Utxo>, BtcError> {
        check_status(&self.status, self.code, &self.message)?;

        let entries = self.data.map(|data| data.unspent).unwrap_or_default();
        entries
            .into_iter()
            .map(|entry| {
                let tx_hash = hex::decode(&entry.tx)
                    .map_err(|e| BtcError::Service(format!("invalid txid {}: {e}", entry.tx)))?;
                if tx_hash.len() != 32 {
                    return Err(BtcError::Service(format!(
                        "txid {} is {} bytes, expected 32",
                        entry.tx,
                        tx_hash.len()
                    )));
                }

                let script_pubkey = hex::decode(&entry.script)
                    .map_err(|e| BtcError::Service(format!("invalid script hex: {e}")))?;

                Ok(Utxo {
                    address: address.to_string(),
                    tx_hash,
                    amount_sat: parse_btc_amount(&entry.amount)?,
                    output_index: entry.n,
                    script_pubkey,
                    confirmations: entry.confirmations,
                    signer: None,
                })
            })
            .collect()
    }
}

impl PushResponse {
    pub fn parse(json: &str) -> Result<Self, BtcError> {
        serde_json::from_str(json)
            .map_err(|e| BtcError::Service(format!("invalid push response: {e}")))
    }

    /// The txid reported for the pushed transaction.
    pub fn into_txid(self) -> Result<String, BtcError> {
        check_status(&self.status, self.code, &self.message)?;
        let txid = hex::decode(&self.data)
            .map_err(|e| BtcError::Service(format!("invalid txid {}: {e}", self.data)))?;
        if txid.len() != 32 {
            return Err(BtcError::Service(format!(
                "txid is {} bytes, expected 32",
                txid.len()
            )));
        }
        Ok(self.data.to_lowercase())
    }
}

/// Parse a decimal BTC amount into satoshis without going through floats.
///
/// At most eight fractional digits are accepted.
pub fn parse_btc_amount(amount: &str) -> Result<u64, BtcError> {
    let invalid = || BtcError::Service(format!("invalid BTC amount: {amount:?}"));

    let amount = amount.trim();
    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > 8 {
        return Err(invalid());
    }

    let whole_sat = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u64>()
            .ok()
            .and_then(|btc| btc.checked_mul(SAT_PER_BTC))
            .ok_or_else(invalid)?
    };
    let fraction_sat = if fraction.is_empty() {
        0
    } else {
        let digits: u64 = fraction.parse().map_err(|_| invalid())?;
        digits * 10u64.pow(8 - fraction.len() as u32)
    };

    whole_sat.checked_add(fraction_sat).ok_or_else(invalid)
}
