//! Mapping of vault errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, ServiceError};

use crate::audit::AuditError;
use crate::codec::CodecError;
use crate::crypto::CipherError;

/// Handler error: a [`ServiceError`] rendered as a JSON [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<CodecError> for ApiError {
    fn from(err: CodecError) -> Self {
        let service = match &err {
            CodecError::InvalidValue { .. } | CodecError::Cipher(CipherError::InvalidFormat) => {
                ServiceError::BadRequest(err.to_string())
            }
            CodecError::Cipher(_) | CodecError::MalformedPlaintext { .. } => {
                ServiceError::CryptoFailure(err.to_string())
            }
            CodecError::Audit(audit) => return Self::from_audit(audit),
        };
        Self(service)
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        Self::from_audit(&err)
    }
}

impl ApiError {
    fn from_audit(err: &AuditError) -> Self {
        match err {
            AuditError::Persistence(_) => Self(ServiceError::AuditFailure(err.to_string())),
            AuditError::AlreadyFlushed => Self(ServiceError::Internal(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditStoreError;

    fn status(err: impl Into<ApiError>) -> u16 {
        err.into().0.http_status()
    }

    #[test]
    fn codec_errors_map_to_status() {
        assert_eq!(status(CodecError::invalid("amount", "too many places")), 400);
        assert_eq!(status(CodecError::Cipher(CipherError::InvalidFormat)), 400);
        assert_eq!(
            status(CodecError::Cipher(CipherError::UnrecoverableCiphertext { tried: 2 })),
            500
        );
        assert_eq!(status(CodecError::MalformedPlaintext { kind: "date" }), 500);
    }

    #[test]
    fn audit_errors_map_to_status() {
        let err: ApiError = AuditError::Persistence(AuditStoreError::Unavailable("down".into())).into();
        assert_eq!(err.0.code(), "audit_failure");
        assert_eq!(status(CodecError::Audit(AuditError::AlreadyFlushed)), 500);
    }

    #[tokio::test]
    async fn renders_json_body() {
        let resp = ApiError(ServiceError::BadRequest("nope".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.code, "bad_request");
    }
}
