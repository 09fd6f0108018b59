//! AES-256-GCM-SIV encryption and decryption of individual field values.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) with a fresh random
//! 96-bit nonce per call. Two encryptions of the same plaintext under the
//! same key produce different tokens, so a token can never serve as a lookup
//! key; queryable fields carry a separate shadow value instead.
//!
//! **Do NOT substitute plain AES-256-GCM with a fixed nonce.** GCM nonce reuse
//! is catastrophic: it breaks both confidentiality and authentication.

use std::{fmt, str::FromStr};

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;
use tracing::debug;

use super::keyring::{KeyGeneration, KeyMaterial, KeyRing};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Algorithm/version tag at the start of every token.
pub const VERSION_PREFIX: &str = "v1";

/// A parsed ciphertext token.
///
/// The string form is `v1.<base64url(nonce)>.<base64url(ciphertext+tag)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedToken {
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext followed by the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl fmt::Display for EncryptedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            VERSION_PREFIX,
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
        )
    }
}

impl FromStr for EncryptedToken {
    type Err = CipherError;

    /// Parse a token string.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] if the string does not match the
    /// `v1.<nonce>.<ciphertext>` structure, or the ciphertext is shorter than
    /// an authentication tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, '.').collect();
        if parts.len() != 3 || parts[0] != VERSION_PREFIX {
            return Err(CipherError::InvalidFormat);
        }
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| CipherError::InvalidFormat)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CipherError::InvalidFormat);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&nonce_bytes);

        let ciphertext = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|_| CipherError::InvalidFormat)?;
        if ciphertext.len() < TAG_LEN {
            return Err(CipherError::InvalidFormat);
        }

        Ok(Self { nonce, ciphertext })
    }
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// AES-GCM-SIV encryption failed.
    #[error("aead encryption failed")]
    AeadFailure,

    /// The integrity tag did not verify under the given key: the token was
    /// tampered with or was written under a different key.
    #[error("ciphertext failed authentication")]
    Authentication,

    /// No key in the ring could authenticate the token.
    #[error("ciphertext unrecoverable: no key among {tried} generation(s) verified it")]
    UnrecoverableCiphertext { tried: usize },

    /// The token string does not match the expected format.
    #[error("invalid ciphertext token format")]
    InvalidFormat,
}

/// Encrypt plaintext bytes under `key` with a fresh random nonce.
///
/// # Errors
///
/// Returns [`CipherError::AeadFailure`] on an internal AEAD error (should be
/// unreachable with a valid key and nonce).
pub fn encrypt(plaintext: &[u8], key: &KeyMaterial) -> Result<EncryptedToken, CipherError> {
    let cipher = build_cipher(key.as_bytes())?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CipherError::AeadFailure)?;

    Ok(EncryptedToken {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt a token under a single key.
///
/// # Errors
///
/// Returns [`CipherError::Authentication`] if the tag does not verify (wrong
/// key or tampered data).
pub fn decrypt(token: &EncryptedToken, key: &KeyMaterial) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key.as_bytes())?;
    let nonce = Nonce::from_slice(&token.nonce);
    cipher
        .decrypt(nonce, token.ciphertext.as_ref())
        .map_err(|_| CipherError::Authentication)
}

/// Decrypt a token by trying every key in `ring`, active key first.
///
/// Returns the plaintext together with the generation that verified it, so
/// the caller can tell whether the value should be rewritten under the
/// active key.
///
/// # Errors
///
/// Returns [`CipherError::UnrecoverableCiphertext`] if no key verifies.
pub fn decrypt_with_ring(
    token: &EncryptedToken,
    ring: &KeyRing,
) -> Result<(Vec<u8>, KeyGeneration), CipherError> {
    let mut tried = 0;
    for (generation, key) in ring.all_decrypt_candidates() {
        tried += 1;
        match decrypt(token, key) {
            Ok(plaintext) => {
                if !generation.is_active() {
                    debug!(%generation, "token decrypted with retired key");
                }
                return Ok((plaintext, generation));
            }
            Err(CipherError::Authentication) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(CipherError::UnrecoverableCiphertext { tried })
}

fn build_cipher(key: &[u8]) -> Result<Aes256GcmSiv, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    Aes256GcmSiv::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}
