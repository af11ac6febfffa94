//! Key derivation: one base64 secret → independent signing and encryption keys

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use rekey_core::{AlgorithmSpec, KeyId, KeyringError, KeyringResult};
use secrecy::SecretString;
use zeroize::Zeroize;

use crate::BASE64;

/// One versioned key. The signing half feeds HMAC-SHA256, the encryption half
/// feeds AES-CBC; neither is ever used for the other purpose.
///
/// Key material is zeroized on drop.
pub struct Key {
    id: KeyId,
    encoded: SecretString,
    signing_key: Vec<u8>,
    encryption_key: Vec<u8>,
    size: usize,
}

impl Key {
    pub fn id(&self) -> KeyId {
        self.id
    }

    /// The base64 text this key was derived from.
    pub fn encoded(&self) -> &SecretString {
        &self.encoded
    }

    pub fn signing_key(&self) -> &[u8] {
        &self.signing_key
    }

    pub fn encryption_key(&self) -> &[u8] {
        &self.encryption_key
    }

    /// Length in bytes of each half.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.signing_key.zeroize();
        self.encryption_key.zeroize();
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Split a base64 secret of `2 * key_size` decoded bytes into a [`Key`].
///
/// The first `key_size` bytes become the signing key, the rest the encryption
/// key. Only the bytes actually produced by the decoder are counted, so no
/// buffer padding ever reaches the length check.
pub fn derive_key(id: KeyId, encoded: &str, key_size: usize) -> KeyringResult<Key> {
    let mut secret = BASE64.decode(encoded.as_bytes())?;
    let expected = key_size * 2;

    if secret.len() != expected {
        let actual = secret.len();
        secret.zeroize();
        return Err(KeyringError::KeyFormat { expected, actual });
    }

    let encryption_key = secret.split_off(key_size);
    let signing_key = secret;

    Ok(Key {
        id,
        encoded: SecretString::from(encoded.to_string()),
        signing_key,
        encryption_key,
        size: key_size,
    })
}

/// Generate a fresh random secret suitable for [`derive_key`] under `spec`.
pub fn generate_secret(spec: AlgorithmSpec) -> KeyringResult<SecretString> {
    let mut bytes = vec![0u8; spec.secret_size()];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| KeyringError::Random(e.to_string()))?;

    let encoded = BASE64.encode(&bytes);
    bytes.zeroize();
    Ok(SecretString::from(encoded))
}
