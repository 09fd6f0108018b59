//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::audit::{AuditRecorder, MemoryAuditStore};
use crate::codec::{
    DateCodec, DecimalCodec, EmailCodec, EncryptedValue, PhoneCodec, TextCodec,
};
use crate::crypto::{KeyMaterial, KeyRing};

/// One encrypted value codec per supported field kind, all bound to the
/// same key ring.
#[derive(Debug)]
pub struct Codecs {
    pub text: EncryptedValue<TextCodec>,
    pub amount: EncryptedValue<DecimalCodec>,
    pub phone: EncryptedValue<PhoneCodec>,
    pub email: EncryptedValue<EmailCodec>,
    pub date: EncryptedValue<DateCodec>,
}

impl Codecs {
    pub fn new(ring: &Arc<KeyRing>, default_phone_country_code: &str) -> Self {
        Self {
            text: EncryptedValue::new(Arc::clone(ring), TextCodec),
            amount: EncryptedValue::new(Arc::clone(ring), DecimalCodec::default()),
            phone: EncryptedValue::new(
                Arc::clone(ring),
                PhoneCodec::new(default_phone_country_code),
            ),
            email: EncryptedValue::new(Arc::clone(ring), EmailCodec),
            date: EncryptedValue::new(Arc::clone(ring), DateCodec),
        }
    }
}

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable (`Arc`-wrapped or already `Arc`-backed) so
/// that Axum can clone the state for each request without copying expensive data.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Read-only key ring, loaded once at startup.
    pub ring: Arc<KeyRing>,
    pub codecs: Arc<Codecs>,
    pub recorder: AuditRecorder,
    /// Serve responses even when the audit entry could not be persisted.
    pub audit_fail_open: bool,
}

impl AppState {
    pub fn new(
        ring: Arc<KeyRing>,
        recorder: AuditRecorder,
        default_phone_country_code: &str,
        audit_fail_open: bool,
    ) -> Self {
        Self {
            codecs: Arc::new(Codecs::new(&ring, default_phone_country_code)),
            ring,
            recorder,
            audit_fail_open,
        }
    }
}

impl Default for AppState {
    /// A fresh random key and an in-memory audit store, suitable for tests.
    fn default() -> Self {
        Self::new(
            Arc::new(KeyRing::new(KeyMaterial::generate(), vec![])),
            AuditRecorder::new(Arc::new(MemoryAuditStore::new())),
            "1",
            false,
        )
    }
}
