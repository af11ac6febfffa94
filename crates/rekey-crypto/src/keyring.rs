//! Keyring facade: key store + envelope codec + salted lookup digest

use std::collections::BTreeMap;

use rekey_core::{AlgorithmSpec, KeyId, KeyringError, KeyringResult};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::envelope;
use crate::store::KeyStore;

/// Result of [`Keyring::encrypt`]. Persist all three fields: `key_id` is
/// needed to decrypt, `digest` is the rotation-stable lookup value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// Base64 envelope
    pub encrypted: String,
    /// Lowercase hex SHA1 of message || digest salt
    pub digest: String,
    /// Id of the key that produced `encrypted`
    pub key_id: KeyId,
}

/// A versioned keyring. All operations take `&self`; share it behind an
/// `Arc` and rotate while other threads encrypt.
#[derive(Debug)]
pub struct Keyring {
    digest_salt: String,
    keys: KeyStore,
    algorithm: AlgorithmSpec,
}

impl Keyring {
    /// Build a keyring from textual ids and base64 secrets.
    ///
    /// Fails with [`KeyringError::EmptyKeyring`] when no secrets are given,
    /// otherwise with the first id or secret that cannot be loaded.
    pub fn new<I, K, V>(
        secrets: I,
        digest_salt: impl Into<String>,
        algorithm: AlgorithmSpec,
    ) -> KeyringResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut secrets = secrets.into_iter().peekable();
        if secrets.peek().is_none() {
            return Err(KeyringError::EmptyKeyring);
        }

        let keys = KeyStore::from_secrets(secrets, algorithm)?;

        tracing::debug!(
            algorithm = algorithm.name(),
            key_count = keys.len(),
            current = ?keys.current_id(),
            "keyring created"
        );

        Ok(Self {
            digest_salt: digest_salt.into(),
            keys,
            algorithm,
        })
    }

    /// Build a keyring from a JSON object of `{"id": "secret"}`.
    pub fn from_json(
        json: &str,
        digest_salt: impl Into<String>,
        algorithm: AlgorithmSpec,
    ) -> KeyringResult<Self> {
        Self::new(parse_keys(json)?, digest_salt, algorithm)
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn algorithm(&self) -> AlgorithmSpec {
        self.algorithm
    }

    pub fn digest_salt(&self) -> &str {
        &self.digest_salt
    }

    /// `hex(SHA1(message || digest_salt))`. Does not depend on any key.
    pub fn digest(&self, message: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(message.as_bytes());
        hasher.update(self.digest_salt.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Encrypt with the current key.
    pub fn encrypt(&self, message: &str) -> KeyringResult<EncryptedMessage> {
        let key = self.keys.current()?;
        let encrypted = envelope::encrypt(&key, message.as_bytes())?;

        Ok(EncryptedMessage {
            encrypted,
            digest: self.digest(message),
            key_id: key.id(),
        })
    }

    /// Decrypt an envelope produced under `key_id`, which may be any key
    /// still held by the store.
    pub fn decrypt(&self, envelope: &str, key_id: KeyId) -> KeyringResult<String> {
        let key = self.keys.get(key_id)?;
        let plaintext = envelope::decrypt(&key, envelope)?;
        String::from_utf8(plaintext).map_err(|_| KeyringError::InvalidPlaintext)
    }

    /// Decrypt under `key_id` and encrypt again under the current key.
    ///
    /// The digest of the returned message equals the digest of the original,
    /// so lookups keyed on it survive the migration.
    pub fn reencrypt(&self, envelope: &str, key_id: KeyId) -> KeyringResult<EncryptedMessage> {
        let message = self.decrypt(envelope, key_id)?;
        let reencrypted = self.encrypt(&message)?;

        tracing::debug!(
            from_key_id = key_id,
            to_key_id = reencrypted.key_id,
            "message re-encrypted"
        );
        Ok(reencrypted)
    }

    /// Add `secret` as the new current key and return its id.
    pub fn rotate(&self, secret: &str) -> KeyringResult<KeyId> {
        self.keys.add_next(secret)
    }
}

/// Equivalent to [`Keyring::new`].
pub fn create_keyring<I, K, V>(
    secrets: I,
    digest_salt: impl Into<String>,
    algorithm: AlgorithmSpec,
) -> KeyringResult<Keyring>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    Keyring::new(secrets, digest_salt, algorithm)
}

/// Parse a JSON object mapping textual key ids to base64 secrets.
pub fn parse_keys(json: &str) -> KeyringResult<BTreeMap<String, String>> {
    serde_json::from_str(json).map_err(|e| KeyringError::KeyMap(e.to_string()))
}
