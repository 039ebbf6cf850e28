//! ddk-idempotency
//!
//! Decision logic for the idempotency guard that fronts every mutating HTTP
//! endpoint.
//!
//! # Protocol (pre-claim)
//!
//! 1. The caller supplies an opaque `Idempotency-Key` (1–255 URL-safe chars).
//! 2. Before executing the operation, the guard INSERTs a claim row keyed by
//!    the unique key with NULL response fields.
//! 3. After the operation, the row is completed with {status, body}.
//! 4. A later request with the same key is resolved by [`decide`]: replayed
//!    verbatim, rejected as a scope conflict, rejected as in-flight, or (if
//!    the record expired) treated as a first sighting again.
//!
//! Pre-claiming closes the race where two never-seen-before requests with the
//! same key execute concurrently: the loser's claim INSERT hits the unique
//! constraint before its handler runs, and the guard answers 409 while the
//! winner is still in flight. The persistence itself lives in ddk-db; this
//! crate is pure and owns only the decisions.

use chrono::{DateTime, Duration, Utc};
use ddk_schemas::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Records expire this long after first sight; an expired record is deleted
/// and its key may be reused.
pub const RECORD_TTL_HOURS: i64 = 24;

pub fn record_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(RECORD_TTL_HOURS)
}

// ---------------------------------------------------------------------------
// Key validation
// ---------------------------------------------------------------------------

/// An idempotency key must be 1–255 characters, each URL-safe: alphanumeric
/// or one of `- _ . ~` (a UUIDv4 satisfies this). Anything else is a 400.
pub fn validate_key(key: &str) -> DomainResult<()> {
    if key.is_empty() || key.len() > 255 {
        return Err(DomainError::validation(
            "Idempotency-Key must be between 1 and 255 characters",
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
    {
        return Err(DomainError::validation(
            "Idempotency-Key must contain only URL-safe characters",
        ));
    }
    Ok(())
}

/// SHA-256 hex fingerprint of the raw request body. Byte-for-byte: two
/// requests match only when their bodies are identical.
pub fn request_fingerprint(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Scope / record / decision
// ---------------------------------------------------------------------------

/// What a key is bound to on first sight. A replay must match all four
/// fields; a mismatch on any is a Conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestScope {
    pub actor_id: Option<Uuid>,
    pub method: String,
    pub path: String,
    pub request_hash: String,
}

/// A persisted idempotency record. `response_*` are NULL while the first
/// sighting's operation is still executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub scope: RequestScope,
    pub response_status: Option<i16>,
    pub response_body: Option<Value>,
    pub expires_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_completed(&self) -> bool {
        self.response_status.is_some()
    }
}

/// Outcome of checking an incoming request against an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No record (or only an expired one): claim the key and execute.
    FirstSight,
    /// Same scope, completed, unexpired: return the stored response
    /// verbatim, do not re-execute.
    Replay {
        response_status: i16,
        response_body: Value,
    },
    /// Same scope but the original request has not completed yet.
    InFlight,
    /// Same key bound to a different method/path/actor/body.
    ScopeMismatch,
    /// Record expired: delete it, then treat as first sight.
    Expired,
}

/// Resolve an incoming request against the stored record for its key.
pub fn decide(
    existing: Option<&StoredRecord>,
    incoming: &RequestScope,
    now: DateTime<Utc>,
) -> Decision {
    let record = match existing {
        None => return Decision::FirstSight,
        Some(r) => r,
    };

    if record.is_expired_at(now) {
        return Decision::Expired;
    }
    if record.scope != *incoming {
        return Decision::ScopeMismatch;
    }
    match (&record.response_status, &record.response_body) {
        (Some(status), Some(body)) => Decision::Replay {
            response_status: *status,
            response_body: body.clone(),
        },
        _ => Decision::InFlight,
    }
}

/// The error surfaced for [`Decision::ScopeMismatch`].
pub fn scope_mismatch_error(key: &str) -> DomainError {
    DomainError::conflict(format!(
        "Idempotency-Key {key} was already used for a different request"
    ))
}

/// The error surfaced for [`Decision::InFlight`].
pub fn in_flight_error(key: &str) -> DomainError {
    DomainError::conflict(format!(
        "a request with Idempotency-Key {key} is still in flight; retry after it completes"
    ))
}
