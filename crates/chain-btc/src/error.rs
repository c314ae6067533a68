use thiserror::Error;

/// Bitcoin chain operation errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("malformed transaction: {0}")]
    StructuralTransaction(String),

    #[error("custom data too long: {0} bytes (max 40)")]
    OversizedCustomData(usize),

    #[error("input {0} has no signer attached")]
    MissingSigner(usize),

    #[error("signing error: {0}")]
    SigningFailure(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("service error: {0}")]
    Service(String),
}
