//! Saga error classification and per-event outcomes.

/// How a handler failure should be treated. The three classes drive three
/// different transports behaviors and must never be conflated:
/// retry, ack-and-move-on, or ack-and-alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaError {
    /// Timeout / connection loss / upstream 5xx. Propagated so the delivery
    /// transport requeues and retries with bounded backoff.
    Transient(String),
    /// A recognized "not yet" condition (e.g. the target record has not been
    /// provisioned). Retrying this event cannot fix it on its own terms;
    /// the drift sweep will. Benign: logged and acked.
    Precondition(String),
    /// Cannot ever succeed (malformed payload, missing required output
    /// field). Dead-lettered for manual intervention, then acked.
    Unrecoverable(String),
}

impl SagaError {
    pub fn transient(msg: impl Into<String>) -> Self {
        SagaError::Transient(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        SagaError::Precondition(msg.into())
    }

    pub fn unrecoverable(msg: impl Into<String>) -> Self {
        SagaError::Unrecoverable(msg.into())
    }

    pub fn message(&self) -> &str {
        match self {
            SagaError::Transient(m) | SagaError::Precondition(m) | SagaError::Unrecoverable(m) => m,
        }
    }
}

impl std::fmt::Display for SagaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaError::Transient(m) => write!(f, "transient: {m}"),
            SagaError::Precondition(m) => write!(f, "precondition not met: {m}"),
            SagaError::Unrecoverable(m) => write!(f, "unrecoverable: {m}"),
        }
    }
}

impl std::error::Error for SagaError {}

pub type SagaResult<T> = Result<T, SagaError>;

/// Terminal outcome of processing one delivery. `Deferred` has no variant
/// here on purpose: a deferral is `Err(SagaError::Transient)` bubbling back
/// to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaOutcome {
    /// Side effects applied and the processed marker written.
    Applied,
    /// The marker already existed; nothing re-applied.
    SkippedDuplicate,
    /// Recognized precondition-not-met; marked processed, drift sweep will
    /// correct.
    BenignSkip { reason: String },
    /// Dead-lettered and acked; an operator has to look.
    Dead { reason: String },
}

impl SagaOutcome {
    /// Wire label used in ingest responses and the ops stream.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaOutcome::Applied => "APPLIED",
            SagaOutcome::SkippedDuplicate => "SKIPPED_DUPLICATE",
            SagaOutcome::BenignSkip { .. } => "BENIGN_SKIP",
            SagaOutcome::Dead { .. } => "DEAD_LETTERED",
        }
    }
}
