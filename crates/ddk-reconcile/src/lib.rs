//! ddk-reconcile
//!
//! Reconciliation saga: applies the final outcome of asynchronous external
//! jobs (blockchain finalization, storage pinning) back into the off-chain
//! system of record, exactly-once-in-effect under at-least-once delivery.
//!
//! Architectural decisions:
//! - Durable dedup: a processed-marker row per event id, written only after
//!   *all* side effects for that event succeed. Per-instance memory is never
//!   trusted — consumers scale horizontally and restart.
//! - Exhaustive typed dispatch: the boundary parse turns loose payloads into
//!   [`ReconcileEvent`]; everything downstream matches on the closed enum.
//! - Missing required output fields are unrecoverable by retry: dead-letter
//!   (persist + ops log + error!), then ack — never an infinite retry loop.
//! - Transient downstream failures propagate as errors so the transport
//!   redelivers with its own backoff.
//! - Recognized precondition-not-met cases (the target row does not exist
//!   yet) are benign skips: logged, marked processed, corrected later by the
//!   drift sweep.
//! - The periodic drift sweep re-derives expected state from the job store
//!   and re-patches anything that drifted.

mod drift;
mod error;
mod event;
mod ports;
mod saga;

pub use drift::{drift_sweep, DriftReport};
pub use error::{SagaError, SagaOutcome, SagaResult};
pub use event::{parse_chain_message, parse_storage_job, ReconcileEvent};
pub use ports::{
    ActivityPort, AnalyticsPort, CatalogPort, DeadLetterPort, JobStorePort, MarkerPort,
    PatchOutcome, TransactionPort,
};
pub use saga::{Saga, SagaPorts};
