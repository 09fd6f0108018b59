//! Typed encrypted values: the storage contract the domain layer consumes.
//!
//! A [`FieldCodec`] converts one kind of domain value to and from canonical
//! plaintext. [`EncryptedValue`] binds a codec to the shared [`KeyRing`] and
//! exposes `to_storage` / `from_storage`:
//!
//! - absent or empty values pass through as `None` and are never encrypted;
//! - `to_storage` returns the token plus, for queryable kinds, a shadow value
//!   derived from exactly the plaintext that was encrypted, so the two can be
//!   written together in one persistence operation;
//! - `from_storage` reports `needs_reencryption` when a retired key was
//!   needed. Reads never rewrite anything; the caller re-encodes on its next
//!   write path (see [`EncryptedValue::refresh`]).

pub mod amount;
pub mod date;
pub mod phone;
pub mod text;

pub use amount::DecimalCodec;
pub use date::DateCodec;
pub use phone::PhoneCodec;
pub use text::{EmailCodec, TextCodec};

use std::sync::Arc;

use thiserror::Error;

use crate::audit::{AccessAction, AuditError, Operation};
use crate::crypto::{self, CipherError, EncryptedToken, KeyGeneration, KeyRing};

/// Errors produced by the codec layer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encryption or decryption failed, including unrecoverable ciphertext.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// A domain value failed normalization or validation.
    #[error("invalid {kind} value: {reason}")]
    InvalidValue { kind: &'static str, reason: String },

    /// Decryption succeeded but the plaintext is not a valid value of this kind.
    #[error("decrypted {kind} plaintext is malformed")]
    MalformedPlaintext { kind: &'static str },

    /// The access could not be noted on the operation's audit handle.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl CodecError {
    pub(crate) fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            reason: reason.into(),
        }
    }
}

/// Conversion between one kind of domain value and its canonical plaintext.
pub trait FieldCodec {
    /// Domain value type.
    type Value;
    /// Plaintext shadow stored next to the token; `Infallible` for kinds
    /// that never expose one.
    type Shadow;
    /// Short name used in errors and audit logs.
    const KIND: &'static str;

    /// Normalize and validate `value`, returning the plaintext to encrypt.
    /// An empty string means "nothing to store".
    fn encode_plaintext(&self, value: &Self::Value) -> Result<String, CodecError>;

    /// Parse plaintext (canonical or caller-supplied) into a value.
    fn decode_plaintext(&self, plaintext: &str) -> Result<Self::Value, CodecError>;

    /// Display form of a decoded value. Never validates: a value stored under
    /// looser limits than the current ones must still be readable.
    fn format_value(&self, value: &Self::Value) -> String;

    /// Shadow value for a value that has just been encoded and decoded again.
    fn shadow(&self, _value: &Self::Value) -> Option<Self::Shadow> {
        None
    }
}

/// What the caller persists for one encrypted attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue<S> {
    /// `v1.<nonce>.<ciphertext>` token.
    pub token: String,
    /// Plaintext shadow, equal to the decrypted value; write it atomically
    /// with `token`.
    pub shadow: Option<S>,
}

/// Result of decoding a stored token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<V> {
    pub value: V,
    /// Key generation that verified the token.
    pub generation: KeyGeneration,
    /// The token was written under a retired key.
    pub needs_reencryption: bool,
}

/// A [`FieldCodec`] bound to the shared key ring.
#[derive(Debug, Clone)]
pub struct EncryptedValue<C> {
    ring: Arc<KeyRing>,
    codec: C,
}

impl<C: FieldCodec> EncryptedValue<C> {
    pub fn new(ring: Arc<KeyRing>, codec: C) -> Self {
        Self { ring, codec }
    }

    /// The underlying codec, for parsing caller input or formatting values.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encrypt `value` under the active key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidValue`] if the value fails validation.
    pub fn to_storage(
        &self,
        value: Option<&C::Value>,
    ) -> Result<Option<StoredValue<C::Shadow>>, CodecError> {
        let Some(value) = value else {
            return Ok(None);
        };
        let plaintext = self.codec.encode_plaintext(value)?;
        if plaintext.is_empty() {
            return Ok(None);
        }
        // Shadow comes from the plaintext actually encrypted, not the caller's value.
        let canonical = self.codec.decode_plaintext(&plaintext)?;
        let shadow = self.codec.shadow(&canonical);
        let token = crypto::encrypt(plaintext.as_bytes(), self.ring.active())?;
        Ok(Some(StoredValue {
            token: token.to_string(),
            shadow,
        }))
    }

    /// Decrypt a stored token with the key ring.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] for a malformed token,
    /// [`CipherError::UnrecoverableCiphertext`] if no key verifies it, and
    /// [`CodecError::MalformedPlaintext`] if the plaintext does not parse.
    pub fn from_storage(&self, token: Option<&str>) -> Result<Option<Decoded<C::Value>>, CodecError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let parsed: EncryptedToken = token.parse()?;
        let (bytes, generation) = crypto::decrypt_with_ring(&parsed, &self.ring)?;
        let plaintext = String::from_utf8(bytes)
            .map_err(|_| CodecError::MalformedPlaintext { kind: C::KIND })?;
        let value = self
            .codec
            .decode_plaintext(&plaintext)
            .map_err(|_| CodecError::MalformedPlaintext { kind: C::KIND })?;
        Ok(Some(Decoded {
            value,
            generation,
            needs_reencryption: !generation.is_active(),
        }))
    }

    /// Re-encrypt `token` under the active key if it was written under a
    /// retired one. Returns `None` when the token is already current.
    ///
    /// Meant for the caller's write path; the result replaces both token and
    /// shadow.
    pub fn refresh(&self, token: &str) -> Result<Option<StoredValue<C::Shadow>>, CodecError> {
        match self.from_storage(Some(token))? {
            Some(decoded) if decoded.needs_reencryption => self.to_storage(Some(&decoded.value)),
            _ => Ok(None),
        }
    }

    /// [`Self::to_storage`], noting a `write` of `field` on `operation`.
    pub fn write_field(
        &self,
        operation: &mut Operation,
        field: &str,
        value: Option<&C::Value>,
    ) -> Result<Option<StoredValue<C::Shadow>>, CodecError> {
        operation.note_access(field, AccessAction::Write)?;
        self.to_storage(value)
    }

    /// [`Self::write_field`] for caller-supplied plaintext. The access is
    /// noted before `input` is parsed, so rejected input is audited too.
    pub fn write_input(
        &self,
        operation: &mut Operation,
        field: &str,
        input: Option<&str>,
    ) -> Result<Option<StoredValue<C::Shadow>>, CodecError> {
        operation.note_access(field, AccessAction::Write)?;
        let value = input
            .filter(|v| !v.is_empty())
            .map(|v| self.codec.decode_plaintext(v))
            .transpose()?;
        self.to_storage(value.as_ref())
    }

    /// [`Self::from_storage`], noting a `read` of `field` on `operation`.
    pub fn read_field(
        &self,
        operation: &mut Operation,
        field: &str,
        token: Option<&str>,
    ) -> Result<Option<Decoded<C::Value>>, CodecError> {
        operation.note_access(field, AccessAction::Read)?;
        self.from_storage(token)
    }
}
