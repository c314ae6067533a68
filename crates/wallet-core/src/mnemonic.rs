use bip39::{Language, Mnemonic};
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::WalletError;

/// Word counts accepted when generating a phrase.
pub const WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// A validated BIP-39 English phrase, wiped from memory on drop.
pub struct SeedPhrase {
    phrase: String,
}

impl SeedPhrase {
    /// Generate a fresh phrase from OS randomness.
    pub fn generate(word_count: usize) -> Result<Self, WalletError> {
        if !WORD_COUNTS.contains(&word_count) {
            return Err(WalletError::InvalidMnemonic(format!(
                "word count must be one of {WORD_COUNTS:?}, got {word_count}"
            )));
        }
        // 32 bits of entropy per 3 words.
        let mut entropy = [0u8; 32];
        let entropy_len = word_count / 3 * 4;
        rand::rngs::OsRng.fill_bytes(&mut entropy[..entropy_len]);

        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..entropy_len])
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()));
        entropy.zeroize();

        Ok(Self {
            phrase: mnemonic?.to_string(),
        })
    }

    /// Parse and checksum-verify a phrase. Whitespace is normalized.
    pub fn parse(phrase: &str) -> Result<Self, WalletError> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        Ok(Self {
            phrase: mnemonic.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.phrase
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split_whitespace().count()
    }

    /// 64-byte seed: PBKDF2-HMAC-SHA512, 2048 rounds, salt `"mnemonic" + passphrase`.
    pub fn to_seed(&self, passphrase: &str) -> Result<Zeroizing<[u8; 64]>, WalletError> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &self.phrase)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
    }
}

impl Drop for SeedPhrase {
    fn drop(&mut self) {
        self.phrase.zeroize();
    }
}

impl std::fmt::Debug for SeedPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedPhrase")
            .field("words", &self.word_count())
            .finish_non_exhaustive()
    }
}

/// Whether `phrase` is a valid English BIP-39 mnemonic.
pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, phrase).is_ok()
}

/// Seed for `phrase` and `passphrase` in one step.
pub fn mnemonic_to_seed(
    phrase: &str,
    passphrase: &str,
) -> Result<Zeroizing<[u8; 64]>, WalletError> {
    SeedPhrase::parse(phrase)?.to_seed(passphrase)
}

/// Validate a single word against the BIP-39 word list
pub fn is_valid_word(word: &str) -> bool {
    Language::English.find_word(word).is_some()
}
