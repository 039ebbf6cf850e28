//! Header extraction, error mapping, and the idempotency guard wrapper that
//! fronts every mutating endpoint.

use std::future::Future;
use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ddk_idempotency::{
    in_flight_error, request_fingerprint, scope_mismatch_error, validate_key, RequestScope,
};
use ddk_schemas::{DomainError, DomainResult, ErrorBody};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Error / header helpers
// ---------------------------------------------------------------------------

pub fn error_response(e: &DomainError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody::from(e))).into_response()
}

/// Actor identity comes from the `X-Actor-Id` header; the auth layer in
/// front of this service is responsible for having verified it.
pub fn require_actor(headers: &HeaderMap) -> DomainResult<Uuid> {
    let raw = headers
        .get("X-Actor-Id")
        .ok_or_else(|| DomainError::validation("X-Actor-Id header is required"))?
        .to_str()
        .map_err(|_| DomainError::validation("X-Actor-Id header is not valid text"))?;
    Uuid::parse_str(raw).map_err(|_| DomainError::validation("X-Actor-Id must be a uuid"))
}

pub fn require_idempotency_key(headers: &HeaderMap) -> DomainResult<String> {
    let raw = headers
        .get("Idempotency-Key")
        .ok_or_else(|| DomainError::validation("Idempotency-Key header is required"))?
        .to_str()
        .map_err(|_| DomainError::validation("Idempotency-Key header is not valid text"))?;
    validate_key(raw)?;
    Ok(raw.to_string())
}

/// Parse a JSON body; an empty body deserializes to `T::default()` so
/// bodyless POSTs (accept, withdraw, fund, ...) stay uniform.
pub fn parse_body<T>(body: &[u8]) -> DomainResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| DomainError::validation(format!("invalid body: {e}")))
}

/// Like [`parse_body`] but the body is mandatory.
pub fn parse_required_body<T>(body: &[u8]) -> DomainResult<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_slice(body).map_err(|e| DomainError::validation(format!("invalid body: {e}")))
}

// ---------------------------------------------------------------------------
// The guard
// ---------------------------------------------------------------------------

/// Run a mutating operation behind the idempotency guard.
///
/// Pre-claims the key, executes `op` only on first sight, persists terminal
/// outcomes (2xx/4xx) for replay, and releases the claim on retryable
/// failures so the client's retry re-executes. Replays return the stored
/// response verbatim with zero re-execution.
pub async fn run_guarded<F, Fut>(
    st: &Arc<AppState>,
    headers: &HeaderMap,
    method: &str,
    path: &str,
    actor: Option<Uuid>,
    body: &[u8],
    op: F,
) -> Response
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DomainResult<(StatusCode, Value)>>,
{
    let key = match require_idempotency_key(headers) {
        Ok(k) => k,
        Err(e) => return error_response(&e),
    };

    let scope = RequestScope {
        actor_id: actor,
        method: method.to_string(),
        path: path.to_string(),
        request_hash: request_fingerprint(body),
    };

    match ddk_db::idempotency_begin(&st.pool, &key, &scope).await {
        Ok(ddk_db::IdempotencyBegin::Claimed) => {}
        Ok(ddk_db::IdempotencyBegin::Replay {
            response_status,
            response_body,
        }) => {
            let status = StatusCode::from_u16(response_status as u16)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(response_body)).into_response();
        }
        Ok(ddk_db::IdempotencyBegin::InFlight) => {
            return error_response(&in_flight_error(&key));
        }
        Ok(ddk_db::IdempotencyBegin::ScopeConflict) => {
            return error_response(&scope_mismatch_error(&key));
        }
        Err(e) => return error_response(&e),
    }

    match op().await {
        Ok((status, body_json)) => {
            if let Err(e) =
                ddk_db::idempotency_complete(&st.pool, &key, status.as_u16() as i16, &body_json)
                    .await
            {
                // The operation itself succeeded; losing the replay record
                // only costs a future duplicate its dedup. Log and respond.
                warn!(%key, error = %e, "failed to store idempotency response");
            }
            (status, Json(body_json)).into_response()
        }
        Err(e) if e.is_retryable() => {
            // Free the key so the client retry re-executes.
            if let Err(rel) = ddk_db::idempotency_release(&st.pool, &key).await {
                warn!(%key, error = %rel, "failed to release idempotency claim");
            }
            error_response(&e)
        }
        Err(e) => {
            // Terminal outcome: persist it so retries replay the same error.
            let error_body = serde_json::to_value(ErrorBody::from(&e)).unwrap_or(Value::Null);
            if let Err(store) =
                ddk_db::idempotency_complete(&st.pool, &key, e.http_status() as i16, &error_body)
                    .await
            {
                warn!(%key, error = %store, "failed to store idempotency error response");
            }
            error_response(&e)
        }
    }
}
