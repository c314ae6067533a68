//! Account-style (Ethereum) address encoding.
//!
//! Addresses are the last 20 bytes of the Keccak-256 hash of the
//! uncompressed public key. The plain form is lowercase hex; EIP-55
//! mixed-case rendering is available through [`address::checksum_address`].

pub mod address;
pub mod error;

pub use error::EthError;
