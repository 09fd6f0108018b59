//! AES-256-GCM-SIV field encryption primitives and the key ring.
//!
//! This module is free of audit, HTTP and storage dependencies. It provides
//! the low-level encrypt/decrypt operations used by the codec layer.
//!
//! # Token format
//!
//! ```text
//! v1.<base64url-no-pad(nonce)>.<base64url-no-pad(ciphertext+tag)>
//! ```
//!
//! Tokens do not name the key that produced them. Decryption walks the
//! [`KeyRing`] from the active key through every retired key and reports
//! which [`KeyGeneration`] verified.

pub mod cipher;
pub mod keyring;

pub use cipher::{decrypt, decrypt_with_ring, encrypt, CipherError, EncryptedToken, KEY_LEN};
pub use keyring::{KeyGeneration, KeyMaterial, KeyRing, KeyRingError};
