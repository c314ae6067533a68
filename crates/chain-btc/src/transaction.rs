use std::sync::Arc;

use crate::encode::{double_sha256, write_varint};
use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::script;
use crate::signer::ScriptSigner;
use crate::utxo::{select_utxos, Utxo};

/// Transaction format version written into every serialization.
pub const TX_VERSION: u32 = 1;

/// Default sequence number (final, no relative lock-time).
pub const DEFAULT_SEQUENCE: u32 = 0xFFFF_FFFF;

/// Signature scope: commit to all inputs and outputs.
pub const SIGHASH_ALL: u32 = 1;

/// Maximum payload carried by the data-carrier output.
pub const MAX_CUSTOM_DATA_LEN: usize = 40;

/// Change below this value is left to the fee instead of creating an output.
pub const DUST_THRESHOLD_SAT: u64 = 546;

/// A transaction input spending a previous output.
#[derive(Clone)]
pub struct TxInput {
    /// Id of the transaction being spent, in display order. Written
    /// byte-reversed on the wire.
    pub previous_tx_hash: Vec<u8>,
    /// Index of the output within that transaction.
    pub output_index: u32,
    /// Locking script of the spent output. Only used for signing.
    pub previous_script_pubkey: Vec<u8>,
    pub sequence: u32,
    /// Populated once the input has been signed.
    pub signature_script: Vec<u8>,
    signer: Option<Arc<dyn ScriptSigner>>,
}

impl TxInput {
    pub fn new(
        previous_tx_hash: Vec<u8>,
        output_index: u32,
        previous_script_pubkey: Vec<u8>,
    ) -> Self {
        Self {
            previous_tx_hash,
            output_index,
            previous_script_pubkey,
            sequence: DEFAULT_SEQUENCE,
            signature_script: Vec::new(),
            signer: None,
        }
    }

    /// Attach the capability that will produce this input's scriptSig.
    pub fn with_signer(mut self, signer: Arc<dyn ScriptSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    fn write_to(&self, buf: &mut Vec<u8>, script: &[u8]) {
        buf.extend(self.previous_tx_hash.iter().rev());
        buf.extend_from_slice(&self.output_index.to_le_bytes());
        write_varint(buf, script.len() as u64);
        buf.extend_from_slice(script);
        buf.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

impl std::fmt::Debug for TxInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxInput")
            .field("previous_tx_hash", &hex::encode(&self.previous_tx_hash))
            .field("output_index", &self.output_index)
            .field("previous_script_pubkey", &hex::encode(&self.previous_script_pubkey))
            .field("sequence", &self.sequence)
            .field("signature_script", &hex::encode(&self.signature_script))
            .field("has_signer", &self.signer.is_some())
            .finish()
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        Self { value, script_pubkey }
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_varint(buf, self.script_pubkey.len() as u64);
        buf.extend_from_slice(&self.script_pubkey);
    }
}

/// Which byte layout [`Transaction::serialize`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serialization {
    /// Signature preimage for one input: that input carries its previous
    /// scriptPubKey, every other input an empty script.
    SignatureHash { input_index: usize },
    /// Broadcast form: every input carries its signature script.
    Final,
}

/// An unsigned (or partially built) legacy transaction.
///
/// Signing never mutates the value; [`Transaction::sign`] returns a new
/// [`SignedTransaction`] so a failed attempt leaves the original intact.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
    /// Complete `OP_RETURN` locking script when custom data is attached.
    data_carrier: Option<Vec<u8>>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            inputs,
            outputs,
            lock_time: 0,
            data_carrier: None,
        }
    }

    /// Attach up to 40 bytes carried by a zero-value `OP_RETURN` output.
    ///
    /// An empty slice removes any previously attached data.
    pub fn attach_custom_data(&mut self, data: &[u8]) -> Result<(), BtcError> {
        if data.len() > MAX_CUSTOM_DATA_LEN {
            return Err(BtcError::OversizedCustomData(data.len()));
        }
        self.data_carrier = if data.is_empty() {
            None
        } else {
            Some(script::op_return_script(data)?)
        };
        Ok(())
    }

    /// The attached payload, without the `OP_RETURN` framing.
    pub fn custom_data(&self) -> Option<&[u8]> {
        self.data_carrier.as_deref().map(|script| &script[2..])
    }

    /// Check the structural invariants required before signing.
    pub fn validate(&self) -> Result<(), BtcError> {
        if self.inputs.is_empty() {
            return Err(BtcError::StructuralTransaction("txin must be filled".into()));
        }
        if self.outputs.is_empty() {
            return Err(BtcError::StructuralTransaction("txout must be filled".into()));
        }
        for (i, input) in self.inputs.iter().enumerate() {
            if input.previous_tx_hash.len() != 32 {
                return Err(BtcError::StructuralTransaction(format!(
                    "hash of txin {i} must be 32 bytes, got {}",
                    input.previous_tx_hash.len()
                )));
            }
            if input.previous_script_pubkey.is_empty() {
                return Err(BtcError::StructuralTransaction(format!(
                    "previous scriptPubKey of txin {i} is empty"
                )));
            }
        }
        for (i, output) in self.outputs.iter().enumerate() {
            if output.script_pubkey.is_empty() {
                return Err(BtcError::StructuralTransaction(format!(
                    "scriptPubKey of txout {i} is empty"
                )));
            }
        }
        Ok(())
    }

    /// Serialize into the legacy wire layout.
    pub fn serialize(&self, mode: Serialization) -> Vec<u8> {
        let mut buf = Vec::with_capacity(10 + self.inputs.len() * 180 + self.outputs.len() * 34);

        buf.extend_from_slice(&TX_VERSION.to_le_bytes());

        write_varint(&mut buf, self.inputs.len() as u64);
        for (index, input) in self.inputs.iter().enumerate() {
            let script: &[u8] = match mode {
                Serialization::SignatureHash { input_index } if input_index == index => {
                    &input.previous_script_pubkey
                }
                Serialization::SignatureHash { .. } => &[],
                Serialization::Final => &input.signature_script,
            };
            input.write_to(&mut buf, script);
        }

        let extra = usize::from(self.data_carrier.is_some());
        write_varint(&mut buf, (self.outputs.len() + extra) as u64);
        if let Some(carrier) = &self.data_carrier {
            buf.extend_from_slice(&0u64.to_le_bytes());
            write_varint(&mut buf, carrier.len() as u64);
            buf.extend_from_slice(carrier);
        }
        for output in &self.outputs {
            output.write_to(&mut buf);
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    /// The 32-byte digest the signer of `input_index` commits to:
    /// double-SHA256 of the preimage serialization followed by the
    /// little-endian sighash type.
    pub fn signature_preimage(&self, input_index: usize) -> Result<[u8; 32], BtcError> {
        if input_index >= self.inputs.len() {
            return Err(BtcError::StructuralTransaction(format!(
                "input index {input_index} out of range ({} inputs)",
                self.inputs.len()
            )));
        }
        let mut raw = self.serialize(Serialization::SignatureHash { input_index });
        raw.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
        Ok(double_sha256(&raw))
    }

    /// Run every input's signer and return the finalized transaction.
    ///
    /// Fails without producing anything if validation fails, an input has
    /// no signer, or any signer returns an error.
    pub fn sign(&self) -> Result<SignedTransaction, BtcError> {
        self.validate()?;

        let mut signed = self.clone();
        for (index, input) in signed.inputs.iter_mut().enumerate() {
            let signer = input.signer.as_ref().ok_or(BtcError::MissingSigner(index))?;
            let preimage = self.signature_preimage(index)?;
            input.signature_script = signer.sign(&preimage)?;
        }

        let raw = signed.serialize(Serialization::Final);
        Ok(SignedTransaction { tx: signed, raw })
    }
}

/// A transaction whose inputs all carry signature scripts.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    tx: Transaction,
    raw: Vec<u8>,
}

impl SignedTransaction {
    /// Wire bytes ready for broadcast.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.raw)
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Transaction id in display order (double-SHA256, byte-reversed).
    pub fn txid(&self) -> [u8; 32] {
        let mut id = double_sha256(&self.raw);
        id.reverse();
        id
    }

    pub fn txid_hex(&self) -> String {
        hex::encode(self.txid())
    }

    /// Hashes of every output this transaction spends.
    pub fn spent_hashes(&self) -> impl Iterator<Item = &[u8]> {
        self.tx.inputs.iter().map(|input| input.previous_tx_hash.as_slice())
    }
}

/// Build a P2PKH transfer from the sender's UTXOs.
///
/// UTXOs are consumed smallest-first until `amount_sat + fee_sat` is
/// covered. Change above the dust threshold goes back to `change_address`;
/// anything smaller is left to the fee. Inputs inherit the signer attached
/// to their UTXO, if any.
pub fn build_p2pkh_transfer(
    utxos: &[Utxo],
    recipient: &str,
    amount_sat: u64,
    change_address: &str,
    fee_sat: u64,
    network: BtcNetwork,
) -> Result<Transaction, BtcError> {
    for (label, addr) in [("recipient", recipient), ("change", change_address)] {
        if !crate::address::validate_address(addr, network)? {
            return Err(BtcError::InvalidAddress(format!(
                "{label} address {addr} is not a {network} address"
            )));
        }
    }

    let target = amount_sat
        .checked_add(fee_sat)
        .ok_or_else(|| BtcError::TransactionBuildError("amount plus fee overflows".into()))?;
    let selection = select_utxos(utxos, target)?;

    let inputs = selection
        .selected
        .iter()
        .map(|utxo| utxo.to_input())
        .collect();

    let mut outputs = vec![TxOutput::new(
        amount_sat,
        script::p2pkh_script_from_address(recipient)?,
    )];
    let change_sat = selection.total_sat - target;
    if change_sat > DUST_THRESHOLD_SAT {
        outputs.push(TxOutput::new(
            change_sat,
            script::p2pkh_script_from_address(change_address)?,
        ));
    }

    Ok(Transaction::new(inputs, outputs))
}
