use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::hd_derivation::HARDENED_OFFSET;
use crate::types::CoinType;

/// A sequence of child indices, written `m/44'/0'/0'/0/7`.
///
/// Hardened components are marked with `'`, `h` or `H` when parsing and
/// always rendered with `'`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    pub fn new(indices: Vec<u32>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }

    /// This path extended by one more index.
    pub fn child(&self, index: u32) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for DerivationPath {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut components = s.trim().split('/');
        if components.next() != Some("m") {
            return Err(WalletError::InvalidPath(format!("{s:?} must start with m")));
        }

        components
            .map(|component| {
                let (digits, hardened) = match component
                    .strip_suffix('\'')
                    .or_else(|| component.strip_suffix('h'))
                    .or_else(|| component.strip_suffix('H'))
                {
                    Some(digits) => (digits, true),
                    None => (component, false),
                };
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(WalletError::InvalidPath(format!(
                        "invalid component {component:?} in {s:?}"
                    )));
                }
                let index: u32 = digits
                    .parse()
                    .ok()
                    .filter(|index| *index < HARDENED_OFFSET)
                    .ok_or_else(|| {
                        WalletError::InvalidPath(format!("index {digits} out of range in {s:?}"))
                    })?;
                Ok(if hardened { index | HARDENED_OFFSET } else { index })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for &index in &self.0 {
            if index >= HARDENED_OFFSET {
                write!(f, "/{}'", index - HARDENED_OFFSET)?;
            } else {
                write!(f, "/{index}")?;
            }
        }
        Ok(())
    }
}

/// How user keys are laid out under the master key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivationScheme {
    /// `m/0/<user>` for every coin.
    #[default]
    Simple,
    /// `m/44'/<coin>'/0'/0/<user>`.
    Bip44,
}

impl DerivationScheme {
    /// Path of the account key that user keys hang off.
    ///
    /// Only this key needs to be exported: all user keys below it are
    /// normal children, derivable from its public half.
    pub fn account_path(&self, coin: CoinType) -> DerivationPath {
        match self {
            DerivationScheme::Simple => DerivationPath::new(vec![0]),
            DerivationScheme::Bip44 => DerivationPath::new(vec![
                44 | HARDENED_OFFSET,
                coin.bip44_coin_type() | HARDENED_OFFSET,
                HARDENED_OFFSET,
                0,
            ]),
        }
    }

    /// Full path of `user_id`'s key.
    pub fn user_path(&self, coin: CoinType, user_id: u32) -> Result<DerivationPath, WalletError> {
        if user_id >= HARDENED_OFFSET {
            return Err(WalletError::InvalidPath(format!(
                "user id {user_id} does not fit a normal child index"
            )));
        }
        Ok(self.account_path(coin).child(user_id))
    }
}

impl FromStr for DerivationScheme {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(DerivationScheme::Simple),
            "bip44" => Ok(DerivationScheme::Bip44),
            other => Err(WalletError::InvalidPath(format!("unknown derivation scheme {other:?}"))),
        }
    }
}
