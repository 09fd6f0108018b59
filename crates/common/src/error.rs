//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::CryptoFailure`] → 500
/// - [`ServiceError::AuditFailure`] → 500
/// - [`ServiceError::Unavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: bad JSON, a value that fails validation, or
    /// a token that is not in the expected format.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Encryption or decryption failed, including ciphertext no key could recover.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// The access could not be durably audited.
    #[error("audit failure: {0}")]
    AuditFailure(String),

    /// A required resource is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::CryptoFailure(_) => 500,
            ServiceError::AuditFailure(_) => 500,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::CryptoFailure(_) => "crypto_failure",
            ServiceError::AuditFailure(_) => "audit_failure",
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::BadRequest("x".into()).http_status(), 400);
        assert_eq!(ServiceError::CryptoFailure("x".into()).http_status(), 500);
        assert_eq!(ServiceError::AuditFailure("x".into()).http_status(), 500);
        assert_eq!(ServiceError::Unavailable("x".into()).http_status(), 503);
        assert_eq!(ServiceError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(ServiceError::AuditFailure("x".into()).code(), "audit_failure");
        assert_eq!(ServiceError::BadRequest("x".into()).code(), "bad_request");
    }
}
