//! Signing capability handed to each transaction input.

use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};

use crate::error::BtcError;
use crate::script::push_data;
use crate::transaction::SIGHASH_ALL;

/// Produces the signature script for one input.
///
/// The codec hands over the 32-byte double-SHA256 preimage of the input
/// being signed; implementations return the complete scriptSig. Signers
/// are called synchronously and must not block on network I/O.
pub trait ScriptSigner: Send + Sync {
    fn sign(&self, preimage: &[u8; 32]) -> Result<Vec<u8>, BtcError>;
}

impl<F> ScriptSigner for F
where
    F: Fn(&[u8; 32]) -> Result<Vec<u8>, BtcError> + Send + Sync,
{
    fn sign(&self, preimage: &[u8; 32]) -> Result<Vec<u8>, BtcError> {
        self(preimage)
    }
}

/// Single-key pay-to-pubkey-hash signer.
///
/// Produces `<DER signature || SIGHASH_ALL> <compressed pubkey>`. Nonces are
/// derived per RFC 6979, so the same preimage always yields the same script.
pub struct P2pkhSigner {
    signing_key: SigningKey,
    public_key: [u8; 33],
}

impl P2pkhSigner {
    pub fn new(private_key: &[u8; 32]) -> Result<Self, BtcError> {
        let signing_key = SigningKey::from_bytes(private_key.into())
            .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;

        let public_key: [u8; 33] = signing_key
            .verifying_key()
            .to_sec1_bytes()
            .as_ref()
            .try_into()
            .map_err(|_| BtcError::InvalidPublicKey("invalid public key length".into()))?;

        Ok(Self {
            signing_key,
            public_key,
        })
    }

    /// The compressed public key revealed in the signature script.
    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }
}

impl ScriptSigner for P2pkhSigner {
    fn sign(&self, preimage: &[u8; 32]) -> Result<Vec<u8>, BtcError> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(preimage)
            .map_err(|e| BtcError::SigningFailure(format!("ecdsa: {e}")))?;
        let signature = signature.normalize_s().unwrap_or(signature);

        let mut sig_bytes = signature.to_der().as_bytes().to_vec();
        sig_bytes.push(SIGHASH_ALL as u8);

        let mut script = Vec::with_capacity(sig_bytes.len() + self.public_key.len() + 2);
        push_data(&mut script, &sig_bytes)?;
        push_data(&mut script, &self.public_key)?;
        Ok(script)
    }
}

impl std::fmt::Debug for P2pkhSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("P2pkhSigner")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}
