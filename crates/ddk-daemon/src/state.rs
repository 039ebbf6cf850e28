//! Shared runtime state for ddk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns the
//! background task spawners (heartbeat, drift sweep, idempotency GC).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use ddk_audit::OpsLogWriter;
use ddk_config::DealDeskConfig;
use ddk_notify::Notifier;
use ddk_reconcile::{drift_sweep, Saga};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// BusMsg — SSE ops bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal ops bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    /// An offer or transaction changed status.
    Lifecycle {
        entity: String,
        id: String,
        status: String,
    },
    /// The saga resolved one inbound event.
    SagaEvent {
        event_id: String,
        outcome: String,
    },
}

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub pool: PgPool,
    pub config: DealDeskConfig,
    pub config_hash: String,
    pub build: BuildInfo,
    pub bus: broadcast::Sender<BusMsg>,
    pub notifier: Arc<dyn Notifier>,
    pub saga: Arc<Saga>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: DealDeskConfig,
        config_hash: String,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let mut saga = Saga::new(ddk_db::pg_saga_ports(&pool));
        if let Some(path) = &config.saga.ops_log_path {
            let writer = OpsLogWriter::new(path, true)
                .with_context(|| format!("open ops log at {path}"))?;
            saga = saga.with_ops_log(Arc::new(Mutex::new(writer)));
        }

        Ok(Self {
            pool,
            config,
            config_hash,
            build: BuildInfo {
                service: "ddk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            bus,
            notifier,
            saga: Arc::new(saga),
        })
    }

    pub fn publish(&self, msg: BusMsg) {
        // Nobody listening is fine.
        let _ = self.bus.send(msg);
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Emit a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Run the saga's drift-correction sweep on a fixed interval. A failing
/// sweep is logged and retried next tick; it must never take the daemon
/// down.
pub fn spawn_drift_sweep(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match drift_sweep(&state.saga).await {
                Ok(report) => {
                    if report.corrected > 0 {
                        info!(
                            examined = report.examined,
                            corrected = report.corrected,
                            target_missing = report.target_missing,
                            "drift sweep corrected records"
                        );
                    }
                }
                Err(e) => error!(error = %e, "drift sweep failed; will retry next tick"),
            }
        }
    });
}

/// Garbage-collect expired idempotency records on a fixed interval.
pub fn spawn_idempotency_gc(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match ddk_db::idempotency_purge_expired(&state.pool).await {
                Ok(0) => {}
                Ok(n) => info!(purged = n, "expired idempotency records purged"),
                Err(e) => error!(error = %e, "idempotency purge failed; will retry next tick"),
            }
        }
    });
}
