//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::{
    protocol::{
        DecodeField, DecodeRequest, DecodeResponse, DecodedField, EncodeField, EncodeRequest,
        EncodeResponse, EncodedField, ErrorResponse, FieldKind, HealthResponse, MaskMode,
        MaskRequest, MaskResponse,
    },
    ServiceError,
};
use tracing::{debug, error, warn};

use super::{caller::CallerContext, error::ApiError, state::AppState};
use crate::audit::{AuditTarget, FlushOutcome, Operation};
use crate::codec::{CodecError, EncryptedValue, FieldCodec};
use crate::detect;

/// `POST /encode`: encrypt plaintext fields of one record.
///
/// Every field named in the request is noted as a `write` on one audit
/// operation, which is flushed before the response is sent.
pub async fn encode(
    State(state): State<AppState>,
    caller: CallerContext,
    Json(req): Json<EncodeRequest>,
) -> Result<Json<EncodeResponse>, ApiError> {
    let mut op = state
        .recorder
        .begin_operation(AuditTarget::new(&req.model, &req.record_id));

    let encoded: Result<Vec<_>, ApiError> = req
        .fields
        .iter()
        .map(|field| encode_field(&state, &mut op, field))
        .collect();

    settle_audit(&state, op, caller).await?;
    let fields = encoded?;
    debug!(model = %req.model, fields = fields.len(), "fields encoded");
    Ok(Json(EncodeResponse { fields }))
}

/// `POST /decode`: decrypt stored tokens of one record.
///
/// Fields are noted as `read` accesses. A token written under a retired key
/// decodes normally and is flagged with `needs_reencryption`.
pub async fn decode(
    State(state): State<AppState>,
    caller: CallerContext,
    Json(req): Json<DecodeRequest>,
) -> Result<Json<DecodeResponse>, ApiError> {
    let mut op = state
        .recorder
        .begin_operation(AuditTarget::new(&req.model, &req.record_id));

    let decoded: Result<Vec<_>, ApiError> = req
        .fields
        .iter()
        .map(|field| decode_field(&state, &mut op, field))
        .collect();

    settle_audit(&state, op, caller).await?;
    let fields = decoded?;
    let stale = fields.iter().filter(|f| f.needs_reencryption).count();
    if stale > 0 {
        debug!(model = %req.model, stale, "decoded tokens written under a retired key");
    }
    Ok(Json(DecodeResponse { fields }))
}

/// `POST /mask`: replace PII in free text, with tokens or partially. Not
/// audited.
pub async fn mask(Json(req): Json<MaskRequest>) -> Json<MaskResponse> {
    let masked = match req.mode {
        MaskMode::Token => detect::mask(&req.text),
        MaskMode::Partial => detect::mask_partial(&req.text),
    };
    Json(MaskResponse {
        masked,
        contains_pii: detect::contains_pii(&req.text),
    })
}

/// `GET /health`: liveness check.
///
/// The ring is validated at startup, so a running server is always ready.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        key_generations: state.ring.len(),
        active_key_fingerprint: state.ring.active().fingerprint(),
    })
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

// ---------------------------------------------------------------------------
// Per-field helpers
// ---------------------------------------------------------------------------

fn encode_field(
    state: &AppState,
    op: &mut Operation,
    field: &EncodeField,
) -> Result<EncodedField, ApiError> {
    let codecs = &state.codecs;
    match field.kind {
        FieldKind::Text => encode_one(&codecs.text, op, field),
        FieldKind::Amount => encode_one(&codecs.amount, op, field),
        FieldKind::Phone => encode_one(&codecs.phone, op, field),
        FieldKind::Email => encode_one(&codecs.email, op, field),
        FieldKind::Date => encode_one(&codecs.date, op, field),
    }
}

fn decode_field(
    state: &AppState,
    op: &mut Operation,
    field: &DecodeField,
) -> Result<DecodedField, ApiError> {
    let codecs = &state.codecs;
    match field.kind {
        FieldKind::Text => decode_one(&codecs.text, op, field),
        FieldKind::Amount => decode_one(&codecs.amount, op, field),
        FieldKind::Phone => decode_one(&codecs.phone, op, field),
        FieldKind::Email => decode_one(&codecs.email, op, field),
        FieldKind::Date => decode_one(&codecs.date, op, field),
    }
}

fn encode_one<C>(
    codec: &EncryptedValue<C>,
    op: &mut Operation,
    field: &EncodeField,
) -> Result<EncodedField, ApiError>
where
    C: FieldCodec,
    C::Shadow: ToString,
{
    let stored = codec
        .write_input(op, &field.name, field.value.as_deref())
        .inspect_err(|e| log_codec_error(C::KIND, &field.name, e))?;

    Ok(match stored {
        Some(stored) => EncodedField {
            name: field.name.clone(),
            token: Some(stored.token),
            shadow: stored.shadow.map(|s| s.to_string()),
        },
        None => EncodedField {
            name: field.name.clone(),
            token: None,
            shadow: None,
        },
    })
}

fn decode_one<C: FieldCodec>(
    codec: &EncryptedValue<C>,
    op: &mut Operation,
    field: &DecodeField,
) -> Result<DecodedField, ApiError> {
    let decoded = codec
        .read_field(op, &field.name, field.token.as_deref())
        .inspect_err(|e| log_codec_error(C::KIND, &field.name, e))?;

    Ok(match decoded {
        Some(decoded) => DecodedField {
            name: field.name.clone(),
            value: Some(codec.codec().format_value(&decoded.value)),
            needs_reencryption: decoded.needs_reencryption,
        },
        None => DecodedField {
            name: field.name.clone(),
            value: None,
            needs_reencryption: false,
        },
    })
}

fn log_codec_error(kind: &str, field: &str, err: &CodecError) {
    match err {
        CodecError::InvalidValue { .. } => debug!(kind, field, error = %err, "rejected field value"),
        _ => warn!(kind, field, error = %err, "field codec failed"),
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Flush `op` on the blocking pool and apply the fail-open policy.
///
/// Runs whether or not the fields themselves succeeded, so attempted
/// accesses are recorded too.
async fn settle_audit(
    state: &AppState,
    mut op: Operation,
    caller: CallerContext,
) -> Result<(), ApiError> {
    let flushed = tokio::task::spawn_blocking(move || {
        op.flush(
            caller.actor_id.as_deref(),
            caller.origin_ip,
            caller.user_agent.as_deref(),
        )
    })
    .await
    .map_err(|e| ApiError(ServiceError::Internal(format!("audit flush task failed: {e}"))))
    .and_then(|r| r.map_err(ApiError::from));

    match flushed {
        Ok(FlushOutcome::Recorded(_) | FlushOutcome::NothingToRecord) => Ok(()),
        Err(err) if state.audit_fail_open => {
            error!(
                alert = "audit_write_failed",
                error = %err.0,
                "audit entry lost; serving response because AUDIT_FAIL_OPEN is set"
            );
            Ok(())
        }
        Err(err) => Err(err),
    }
}
