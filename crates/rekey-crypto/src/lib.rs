//! rekey-crypto: versioned symmetric keyring
//!
//! Architecture: Encrypt-then-MAC with AES-CBC and HMAC-SHA256
//!
//! Each key secret is split in two:
//! ```text
//! base64 secret (2 * key_size bytes)
//!   ├── signing key    = bytes[..key_size]   → HMAC-SHA256 over IV || ciphertext
//!   └── encryption key = bytes[key_size..]   → AES-{128,192,256}-CBC, PKCS#7
//! ```
//!
//! New messages are always encrypted with the current key (largest id). Older
//! keys stay in the store so envelopes written before a rotation still decrypt.
//! The lookup digest `SHA1(message || salt)` never involves a key, so it is
//! stable across rotations.

pub mod envelope;
pub mod keyring;
pub mod keys;
pub mod store;

pub use keyring::{create_keyring, parse_keys, EncryptedMessage, Keyring};
pub use keys::{derive_key, generate_secret, Key};
pub use rekey_core::{
    AlgorithmSpec, KeyId, KeyringError, KeyringResult, AES128CBC, AES192CBC, AES256CBC,
};
pub use store::{parse_key_id, KeyStore};

use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};

/// AES block size, and therefore IV size
pub const BLOCK_SIZE: usize = 16;

/// Size of an HMAC-SHA256 tag
pub const MAC_SIZE: usize = 32;

/// Standard alphabet with required padding. Non-zero trailing bits are
/// tolerated on decode so secrets from lenient encoders still load.
pub(crate) const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);
