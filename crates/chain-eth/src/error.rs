use thiserror::Error;

/// Account address errors.
#[derive(Debug, Error)]
pub enum EthError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
