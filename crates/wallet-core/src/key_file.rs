//! On-disk form of an extended key, used to bootstrap the service.
//!
//! Layout: version, parent fingerprint, child index, chain code and key
//! material, each preceded by its length as a big-endian `u16`, then the
//! depth as a bare big-endian `u16`. This is a private cache format, not a
//! BIP-32 interchange format; use the base58 form for that.

use std::fs;
use std::path::Path;

use tracing::info;
use zeroize::Zeroize;

use crate::error::WalletError;
use crate::hd_derivation::ExtendedKey;

fn put_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u16).to_be_bytes());
    buf.extend_from_slice(field);
}

/// Serialize `key` in the key-file layout.
pub fn to_bytes(key: &ExtendedKey) -> Vec<u8> {
    let mut key_material = key.key_material();

    let mut buf = Vec::with_capacity(2 * 6 + 4 + 4 + 4 + 32 + 33);
    put_field(&mut buf, &key.version().to_be_bytes());
    put_field(&mut buf, &key.parent_fingerprint());
    put_field(&mut buf, &key.child_index().to_be_bytes());
    put_field(&mut buf, key.chain_code());
    put_field(&mut buf, &key_material);
    buf.extend_from_slice(&u16::from(key.depth()).to_be_bytes());

    key_material.zeroize();
    buf
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], WalletError> {
        let end = self.pos + len;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            WalletError::KeyFile(format!("truncated while reading {what}"))
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self, what: &str) -> Result<u16, WalletError> {
        let raw = self.take(2, what)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    /// A length-prefixed field whose length must be one of `allowed`.
    fn field(&mut self, what: &str, allowed: &[usize]) -> Result<&'a [u8], WalletError> {
        let len = usize::from(self.u16(what)?);
        if !allowed.contains(&len) {
            return Err(WalletError::KeyFile(format!(
                "{what} has length {len}, expected {allowed:?}"
            )));
        }
        self.take(len, what)
    }
}

/// Parse the key-file layout.
pub fn from_bytes(bytes: &[u8]) -> Result<ExtendedKey, WalletError> {
    let mut reader = FieldReader { bytes, pos: 0 };

    let version = reader.field("version", &[4])?;
    let fingerprint = reader.field("parent fingerprint", &[4])?;
    let index = reader.field("child index", &[4])?;
    let chain_code = reader.field("chain code", &[32])?;
    let material = reader.field("key material", &[32, 33])?;
    let depth = reader.u16("depth")?;

    if reader.pos != bytes.len() {
        return Err(WalletError::KeyFile(format!(
            "{} trailing bytes after depth",
            bytes.len() - reader.pos
        )));
    }
    let depth = u8::try_from(depth)
        .map_err(|_| WalletError::KeyFile(format!("depth {depth} exceeds 255")))?;

    // Bare 32-byte secrets are accepted and padded to the canonical form.
    let mut key_material = [0u8; 33];
    key_material[33 - material.len()..].copy_from_slice(material);

    let mut chain = [0u8; 32];
    chain.copy_from_slice(chain_code);

    let key = ExtendedKey::from_fields(
        u32::from_be_bytes([version[0], version[1], version[2], version[3]]),
        depth,
        [fingerprint[0], fingerprint[1], fingerprint[2], fingerprint[3]],
        u32::from_be_bytes([index[0], index[1], index[2], index[3]]),
        chain,
        &key_material,
    );
    key_material.zeroize();
    chain.zeroize();
    key
}

/// Write `key` to `path`, replacing any existing file.
pub fn save(key: &ExtendedKey, path: impl AsRef<Path>) -> Result<(), WalletError> {
    let path = path.as_ref();
    let mut bytes = to_bytes(key);
    let written = fs::write(path, &bytes);
    bytes.zeroize();
    written?;

    if key.is_private() {
        restrict_to_owner(path)?;
    }

    info!(
        path = %path.display(),
        private = key.is_private(),
        depth = key.depth(),
        "key file written"
    );
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<(), WalletError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<(), WalletError> {
    Ok(())
}

/// Read a key previously written by [`save`].
pub fn load(path: impl AsRef<Path>) -> Result<ExtendedKey, WalletError> {
    let path = path.as_ref();
    let mut bytes = fs::read(path)?;
    let key = from_bytes(&bytes).map_err(|e| match e {
        WalletError::KeyFile(msg) => WalletError::KeyFile(format!("{}: {msg}", path.display())),
        other => other,
    });
    bytes.zeroize();
    let key = key?;

    info!(
        path = %path.display(),
        private = key.is_private(),
        depth = key.depth(),
        fingerprint = %hex::encode(key.fingerprint()),
        "key file loaded"
    );
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hd_derivation::HARDENED_OFFSET;
    use crate::types::Network;

    fn account_key() -> ExtendedKey {
        ExtendedKey::from_seed(&[7u8; 32], Network::Mainnet)
            .unwrap()
            .derive_child(HARDENED_OFFSET + 44)
            .unwrap()
            .derive_child(0)
            .unwrap()
    }

    #[test]
    fn layout_is_length_prefixed_with_trailing_depth() {
        let key = account_key().to_public();
        let bytes = to_bytes(&key);

        assert_eq!(bytes.len(), (2 + 4) * 3 + (2 + 32) + (2 + 33) + 2);
        assert_eq!(&bytes[0..2], &[0, 4]);
        assert_eq!(&bytes[2..6], &0x0488_B21Eu32.to_be_bytes());
        assert_eq!(&bytes[6..8], &[0, 4]);
        assert_eq!(&bytes[8..12], &key.parent_fingerprint());
        assert_eq!(&bytes[14..18], &0u32.to_be_bytes());
        assert_eq!(&bytes[18..20], &[0, 32]);
        assert_eq!(&bytes[52..54], &[0, 33]);
        assert_eq!(&bytes[54..87], key.public_key());
        assert_eq!(&bytes[87..], &[0, 2]);
    }

    #[test]
    fn round_trips_public_and_private() {
        for key in [account_key(), account_key().to_public()] {
            assert_eq!(from_bytes(&to_bytes(&key)).unwrap(), key);
        }
    }

    #[test]
    fn bare_private_scalar_accepted() {
        let key = account_key();
        let mut bytes = to_bytes(&key);
        // Rewrite the key-material field as 32 bytes without the 0x00 pad.
        bytes.splice(52..55, [0, 32]);
        assert_eq!(from_bytes(&bytes).unwrap(), key);
    }

    #[test]
    fn depth_above_255_rejected() {
        let mut bytes = to_bytes(&account_key());
        let len = bytes.len();
        bytes[len - 2..].copy_from_slice(&256u16.to_be_bytes());
        assert!(matches!(from_bytes(&bytes), Err(WalletError::KeyFile(_))));
    }

    #[test]
    fn truncated_and_padded_files_rejected() {
        let bytes = to_bytes(&account_key().to_public());
        assert!(from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(from_bytes(&[]).is_err());

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(from_bytes(&longer).is_err());

        let mut wrong_len = bytes;
        wrong_len[1] = 5;
        assert!(from_bytes(&wrong_len).is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btc_account.key");
        let key = account_key().to_public();

        save(&key, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, key);
        assert_eq!(loaded.to_string(), key.to_string());
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.key");
        save(&account_key(), &path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path().join("absent.key")),
            Err(WalletError::Io(_))
        ));
    }
}
