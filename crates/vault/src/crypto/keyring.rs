//! [`KeyRing`]: the active encryption key plus every retired key that may
//! still protect stored ciphertext.

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::cipher::KEY_LEN;

/// Errors produced while building or rotating a key ring.
///
/// All of these are configuration errors: they surface at startup or at the
/// moment an operator rotates, never lazily on first use.
#[derive(Debug, Error)]
pub enum KeyRingError {
    /// No active key was configured.
    #[error("an active encryption key is required")]
    MissingActiveKey,

    /// Key material has an unexpected length.
    #[error("encryption key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Key material is not valid base64url.
    #[error("encryption key at position {position} is not valid base64url")]
    InvalidEncoding { position: usize },

    /// Rotation was asked to install the key that is already active.
    #[error("new key is identical to the active key")]
    RotationToActiveKey,
}

/// Fixed-size symmetric key, exactly [`KEY_LEN`] bytes.
///
/// The buffer is overwritten with zeroes on drop and never printed.
#[derive(Clone)]
pub struct KeyMaterial(Box<[u8; KEY_LEN]>);

impl KeyMaterial {
    /// Copy raw key bytes into a new [`KeyMaterial`].
    ///
    /// # Errors
    ///
    /// Returns [`KeyRingError::MissingActiveKey`] for an empty slice and
    /// [`KeyRingError::InvalidKeyLength`] for any other wrong length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyRingError> {
        if bytes.is_empty() {
            return Err(KeyRingError::MissingActiveKey);
        }
        if bytes.len() != KEY_LEN {
            return Err(KeyRingError::InvalidKeyLength(bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut buf = Box::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut buf[..]);
        Self(buf)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// Encode the key as unpadded base64url, the format configuration expects.
    pub fn to_encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.as_bytes())
    }

    /// Non-secret identifier: hex of the first 8 bytes of SHA-256(key).
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Position of a key in decrypt-trying order.
///
/// Generation `0` is the active key; `1..` are retired keys, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyGeneration(usize);

impl KeyGeneration {
    /// The active key's generation.
    pub const ACTIVE: KeyGeneration = KeyGeneration(0);

    /// Returns `true` for the active key.
    pub fn is_active(self) -> bool {
        self.0 == 0
    }

    /// Zero-based index into `[active, retired...]`.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for KeyGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// The active key plus retired keys, newest first.
///
/// Read-only once built: share it behind an `Arc` across concurrent
/// operations. Rotation produces a new ring rather than mutating this one.
#[derive(Debug, Clone)]
pub struct KeyRing {
    active: KeyMaterial,
    retired: Vec<KeyMaterial>,
}

impl KeyRing {
    /// Build a ring from an active key and retired keys (newest first).
    ///
    /// Taking `KeyMaterial` by value means length checks already happened;
    /// use [`KeyRing::from_encoded`] for configuration strings.
    pub fn new(active: KeyMaterial, retired: Vec<KeyMaterial>) -> Self {
        Self { active, retired }
    }

    /// Build a ring from base64url key strings as supplied by configuration.
    ///
    /// Padded and unpadded encodings are both accepted. Blank retired entries
    /// are skipped but still counted in error positions: position `n` is the
    /// `n`th retired entry as given, `0` the active key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyRingError::MissingActiveKey`] if `active` is blank, and
    /// the decoding or length error of the first bad key otherwise.
    pub fn from_encoded<S: AsRef<str>>(active: &str, retired: &[S]) -> Result<Self, KeyRingError> {
        if active.trim().is_empty() {
            return Err(KeyRingError::MissingActiveKey);
        }
        let active = decode_key(active, 0)?;
        let retired = retired
            .iter()
            .map(AsRef::as_ref)
            .enumerate()
            .filter(|(_, s)| !s.trim().is_empty())
            .map(|(i, s)| decode_key(s, i + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(active, retired))
    }

    /// The key every new encryption uses.
    pub fn active(&self) -> &KeyMaterial {
        &self.active
    }

    /// Retired keys, newest first.
    pub fn retired(&self) -> &[KeyMaterial] {
        &self.retired
    }

    /// All keys in trying order: `[active, retired...]`.
    pub fn all_decrypt_candidates(&self) -> impl Iterator<Item = (KeyGeneration, &KeyMaterial)> {
        std::iter::once(&self.active)
            .chain(self.retired.iter())
            .enumerate()
            .map(|(i, key)| (KeyGeneration(i), key))
    }

    /// Number of generations held (active + retired).
    pub fn len(&self) -> usize {
        1 + self.retired.len()
    }

    /// Always `false`: a ring cannot exist without an active key.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Produce a new ring with `new_key` active and the current active key
    /// moved to the front of the retired list.
    ///
    /// # Errors
    ///
    /// Returns [`KeyRingError::RotationToActiveKey`] if `new_key` is the key
    /// that is already active.
    pub fn rotate(&self, new_key: KeyMaterial) -> Result<KeyRing, KeyRingError> {
        if new_key.fingerprint() == self.active.fingerprint() {
            return Err(KeyRingError::RotationToActiveKey);
        }
        let mut retired = Vec::with_capacity(self.retired.len() + 1);
        retired.push(self.active.clone());
        retired.extend(self.retired.iter().cloned());
        Ok(Self {
            active: new_key,
            retired,
        })
    }
}

fn decode_key(encoded: &str, position: usize) -> Result<KeyMaterial, KeyRingError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim().trim_end_matches('='))
        .map_err(|_| KeyRingError::InvalidEncoding { position })?;
    KeyMaterial::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> KeyMaterial {
        KeyMaterial::from_slice(&[byte; KEY_LEN]).unwrap()
    }

    #[test]
    fn empty_key_is_missing_active_key() {
        assert!(matches!(
            KeyMaterial::from_slice(&[]),
            Err(KeyRingError::MissingActiveKey)
        ));
        assert!(matches!(
            KeyRing::from_encoded::<&str>("  ", &[]),
            Err(KeyRingError::MissingActiveKey)
        ));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            KeyMaterial::from_slice(&[1u8; 16]),
            Err(KeyRingError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn rejects_bad_encoding_with_position() {
        let active = key(1).to_encoded();
        let err = KeyRing::from_encoded(&active, &["!!not-base64!!"]).unwrap_err();
        assert!(matches!(err, KeyRingError::InvalidEncoding { position: 1 }));
    }

    #[test]
    fn bad_key_position_counts_blank_entries() {
        let active = key(1).to_encoded();
        let good = key(2).to_encoded();
        let err = KeyRing::from_encoded(&active, &["", good.as_str(), " ", "!!bad!!"]).unwrap_err();
        assert!(matches!(err, KeyRingError::InvalidEncoding { position: 4 }));
    }

    #[test]
    fn from_encoded_accepts_padded_and_skips_blank() {
        let active = key(1).to_encoded();
        let padded = format!("{}=", key(2).to_encoded());
        let ring = KeyRing::from_encoded(&active, &[padded.as_str(), " "]).unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.retired()[0].as_bytes(), key(2).as_bytes());
    }

    #[test]
    fn candidates_are_active_then_retired() {
        let ring = KeyRing::new(key(1), vec![key(2), key(3)]);
        let order: Vec<(usize, u8)> = ring
            .all_decrypt_candidates()
            .map(|(g, k)| (g.index(), k.as_bytes()[0]))
            .collect();
        assert_eq!(order, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn rotate_prepends_previous_active() {
        let ring = KeyRing::new(key(1), vec![key(2)]);
        let rotated = ring.rotate(key(9)).unwrap();
        assert_eq!(rotated.active().as_bytes()[0], 9);
        let retired: Vec<u8> = rotated.retired().iter().map(|k| k.as_bytes()[0]).collect();
        assert_eq!(retired, vec![1, 2]);
        // The old ring is untouched.
        assert_eq!(ring.active().as_bytes()[0], 1);
    }

    #[test]
    fn rotate_to_same_key_rejected() {
        let ring = KeyRing::new(key(1), vec![]);
        assert!(matches!(
            ring.rotate(key(1)),
            Err(KeyRingError::RotationToActiveKey)
        ));
    }

    #[test]
    fn generated_keys_differ_and_round_trip_encoding() {
        let a = KeyMaterial::generate();
        let b = KeyMaterial::generate();
        assert_ne!(a.fingerprint(), b.fingerprint());
        let ring = KeyRing::from_encoded::<&str>(&a.to_encoded(), &[]).unwrap();
        assert_eq!(ring.active().fingerprint(), a.fingerprint());
    }

    #[test]
    fn key_material_redacted_in_debug() {
        let k = key(0xFF);
        assert!(format!("{k:?}").contains("REDACTED"));
        assert_eq!(k.fingerprint().len(), 16);
    }

    #[test]
    fn generation_display() {
        assert!(KeyGeneration::ACTIVE.is_active());
        assert_eq!(KeyGeneration(2).to_string(), "gen2");
    }
}
