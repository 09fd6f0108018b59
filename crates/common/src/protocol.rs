//! Request and response types for the vault HTTP API.
//!
//! Field values travel as strings: amounts in plain decimal notation
//! (`"1234.50"`), dates as ISO-8601 (`"2024-03-01"`).

use serde::{Deserialize, Serialize};

/// Which encrypted value codec applies to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Opaque free text (merchant names, notes).
    Text,
    /// Fixed-point monetary amount. Produces a shadow value.
    Amount,
    /// Phone number, normalized to E.164 before encryption.
    Phone,
    /// Email address, lowercased before encryption.
    Email,
    /// Calendar date.
    Date,
}

// ---------------------------------------------------------------------------
// Encode endpoint
// ---------------------------------------------------------------------------

/// One plaintext field to encode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeField {
    pub name: String,
    pub kind: FieldKind,
    /// `None` (JSON `null`) stays absent and is not encrypted.
    pub value: Option<String>,
}

/// Request body for `POST /encode`. All fields belong to one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeRequest {
    pub model: String,
    pub record_id: String,
    pub fields: Vec<EncodeField>,
}

/// Storage representation of one encoded field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedField {
    pub name: String,
    /// `v1.<nonce>.<ciphertext>` token, or `None` for an absent value.
    pub token: Option<String>,
    /// Plaintext shadow to store next to the token, for kinds that have one.
    pub shadow: Option<String>,
}

/// Response body for `POST /encode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeResponse {
    pub fields: Vec<EncodedField>,
}

// ---------------------------------------------------------------------------
// Decode endpoint
// ---------------------------------------------------------------------------

/// One stored token to decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeField {
    pub name: String,
    pub kind: FieldKind,
    pub token: Option<String>,
}

/// Request body for `POST /decode`. All fields belong to one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeRequest {
    pub model: String,
    pub record_id: String,
    pub fields: Vec<DecodeField>,
}

/// Plaintext of one decoded field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedField {
    pub name: String,
    pub value: Option<String>,
    /// The token was written under a retired key; the caller should re-encode
    /// and rewrite it on its next write path.
    pub needs_reencryption: bool,
}

/// Response body for `POST /decode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeResponse {
    pub fields: Vec<DecodedField>,
}

// ---------------------------------------------------------------------------
// Mask endpoint
// ---------------------------------------------------------------------------

/// How `POST /mask` replaces what it finds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskMode {
    /// A fixed `[MASKED_*]` token per category.
    #[default]
    Token,
    /// Keep an email's domain and the last four digits of cards and
    /// accounts; star out everything else.
    Partial,
}

/// Request body for `POST /mask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskRequest {
    pub text: String,
    #[serde(default)]
    pub mode: MaskMode,
}

/// Response body for `POST /mask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskResponse {
    pub masked: String,
    /// Whether the input contained anything that was masked.
    pub contains_pii: bool,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status, always `"ok"` once the server is accepting requests.
    pub status: String,
    /// Number of keys in the ring (active + retired).
    pub key_generations: usize,
    /// Non-secret fingerprint of the active key.
    pub active_key_fingerprint: String,
}
