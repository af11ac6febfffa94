use thiserror::Error;

use crate::types::KeyId;

pub type KeyringResult<T> = Result<T, KeyringError>;

#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("you must provide at least 1 key")]
    EmptyKeyring,

    #[error("expected key with {expected} bytes, got {actual} bytes")]
    KeyFormat { expected: usize, actual: usize },

    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("key with id={id} doesn't exist")]
    KeyNotFound { id: KeyId },

    #[error("key store is empty")]
    EmptyKeyStore,

    #[error("HMAC couldn't be verified")]
    Authentication,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("invalid key id '{0}': expected a non-negative integer")]
    InvalidKeyId(String),

    #[error("decrypted message is not valid UTF-8")]
    InvalidPlaintext,

    #[error("random source failure: {0}")]
    Random(String),

    #[error("unknown algorithm '{0}' (expected aes-128-cbc, aes-192-cbc or aes-256-cbc)")]
    UnknownAlgorithm(String),

    #[error("invalid key map: {0}")]
    KeyMap(String),
}
