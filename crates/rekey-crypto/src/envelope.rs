//! AES-CBC + HMAC-SHA256 envelope
//!
//! Envelope format (binary, then standard base64):
//! ```text
//! [32 bytes: HMAC-SHA256(signing_key, iv || ciphertext)][16 bytes: IV][N*16 bytes: AES-CBC ciphertext]
//! ```
//!
//! There is no length prefix; the ciphertext runs to the end of the envelope.
//! The MAC is always verified before any decryption takes place.

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use rekey_core::{KeyringError, KeyringResult};
use sha2::Sha256;

use crate::keys::Key;
use crate::{BASE64, BLOCK_SIZE, MAC_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// Encrypt `plaintext` under `key` and return the base64 envelope.
///
/// A fresh IV is drawn from the OS random source for every call; if that
/// source fails the error is returned immediately.
pub fn encrypt(key: &Key, plaintext: &[u8]) -> KeyringResult<String> {
    let mut iv = [0u8; BLOCK_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| KeyringError::Random(e.to_string()))?;

    let ciphertext = match key.encryption_key().len() {
        16 => cbc_encrypt::<cbc::Encryptor<aes::Aes128>>(key.encryption_key(), &iv, plaintext)?,
        24 => cbc_encrypt::<cbc::Encryptor<aes::Aes192>>(key.encryption_key(), &iv, plaintext)?,
        32 => cbc_encrypt::<cbc::Encryptor<aes::Aes256>>(key.encryption_key(), &iv, plaintext)?,
        n => return Err(unsupported(n)),
    };

    let mac = compute_mac(key.signing_key(), &iv, &ciphertext)?;

    let mut envelope = Vec::with_capacity(MAC_SIZE + BLOCK_SIZE + ciphertext.len());
    envelope.extend_from_slice(&mac);
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(envelope))
}

/// Verify and decrypt a base64 envelope produced by [`encrypt`].
///
/// Returns the raw plaintext bytes. The PKCS#7 pad length is taken from the
/// final byte; the pad bytes themselves are not checked.
pub fn decrypt(key: &Key, envelope_b64: &str) -> KeyringResult<Vec<u8>> {
    let envelope = BASE64.decode(envelope_b64.as_bytes())?;

    if envelope.len() < MAC_SIZE + BLOCK_SIZE {
        return Err(KeyringError::MalformedEnvelope(format!(
            "{} bytes (minimum {})",
            envelope.len(),
            MAC_SIZE + BLOCK_SIZE
        )));
    }

    let (informed_mac, rest) = envelope.split_at(MAC_SIZE);
    let (iv, ciphertext) = rest.split_at(BLOCK_SIZE);

    verify_mac(key.signing_key(), iv, ciphertext, informed_mac)?;

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(KeyringError::MalformedEnvelope(format!(
            "ciphertext of {} bytes is not a positive multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let mut decrypted = match key.encryption_key().len() {
        16 => cbc_decrypt::<cbc::Decryptor<aes::Aes128>>(key.encryption_key(), iv, ciphertext)?,
        24 => cbc_decrypt::<cbc::Decryptor<aes::Aes192>>(key.encryption_key(), iv, ciphertext)?,
        32 => cbc_decrypt::<cbc::Decryptor<aes::Aes256>>(key.encryption_key(), iv, ciphertext)?,
        n => return Err(unsupported(n)),
    };

    trim_padding(&mut decrypted)?;
    Ok(decrypted)
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> KeyringResult<Vec<u8>>
where
    C: BlockEncryptMut + KeyIvInit,
{
    let cipher = C::new_from_slices(key, iv).map_err(|_| unsupported(key.len()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> KeyringResult<Vec<u8>>
where
    C: BlockDecryptMut + KeyIvInit,
{
    let cipher = C::new_from_slices(key, iv).map_err(|_| unsupported(key.len()))?;
    cipher
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| KeyringError::MalformedEnvelope("ciphertext is not block aligned".into()))
}

fn compute_mac(signing_key: &[u8], iv: &[u8], ciphertext: &[u8]) -> KeyringResult<Vec<u8>> {
    let mut mac = keyed_mac(signing_key)?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time comparison of the recomputed MAC against the informed one.
fn verify_mac(
    signing_key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    informed_mac: &[u8],
) -> KeyringResult<()> {
    let mut mac = keyed_mac(signing_key)?;
    mac.update(iv);
    mac.update(ciphertext);
    mac.verify_slice(informed_mac)
        .map_err(|_| KeyringError::Authentication)
}

fn keyed_mac(signing_key: &[u8]) -> KeyringResult<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(signing_key).map_err(|_| unsupported(signing_key.len()))
}

/// Drop as many trailing bytes as the final byte says.
fn trim_padding(decrypted: &mut Vec<u8>) -> KeyringResult<()> {
    let pad = decrypted.last().copied().unwrap_or(0) as usize;
    if pad > decrypted.len() {
        return Err(KeyringError::MalformedEnvelope(format!(
            "pad length {pad} exceeds {} decrypted bytes",
            decrypted.len()
        )));
    }
    decrypted.truncate(decrypted.len() - pad);
    Ok(())
}

fn unsupported(key_len: usize) -> KeyringError {
    KeyringError::UnknownAlgorithm(format!("AES-CBC with a {key_len}-byte key"))
}
