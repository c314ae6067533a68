//! Bitcoin chain support for the address & transaction service.
//!
//! Provides legacy P2PKH address encoding, the raw transaction codec with
//! its signature-preimage construction, a single-key signer, and the UTXO
//! cache fed by pluggable sources.

pub mod address;
pub mod encode;
pub mod error;
pub mod explorer;
pub mod network;
pub mod script;
pub mod signer;
pub mod source;
pub mod transaction;
pub mod utxo;

pub use error::BtcError;
pub use network::BtcNetwork;
pub use signer::{P2pkhSigner, ScriptSigner};
pub use transaction::{SignedTransaction, Transaction, TxInput, TxOutput};
pub use utxo::{Utxo, UtxoCache};
