//! Mutex-guarded in-memory ports. Not production code: no durability, no
//! scaling — exactly what the saga contract says a real marker store must
//! NOT be. Tests use them because they make state inspection trivial.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ddk_reconcile::{
    ActivityPort, AnalyticsPort, CatalogPort, DeadLetterPort, JobStorePort, MarkerPort,
    PatchOutcome, ReconcileEvent, SagaError, SagaPorts, SagaResult, TransactionPort,
};
use ddk_schemas::{CatalogAsset, FeeCategory, StorageJobRecord};
use serde_json::Value;
use uuid::Uuid;

/// Decrement-and-fail helper: each injected count consumes one call with a
/// transient error before the operation goes through.
fn take_injected_failure(counter: &Mutex<u32>, what: &str) -> SagaResult<()> {
    let mut n = counter.lock().expect("lock");
    if *n > 0 {
        *n -= 1;
        return Err(SagaError::transient(format!("{what}: injected timeout")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MemoryCatalog
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCatalog {
    assets: Mutex<BTreeMap<Uuid, CatalogAsset>>,
    fail_transient: Mutex<u32>,
}

impl MemoryCatalog {
    /// Seed an asset row with no confirmed identifiers yet.
    pub fn seed_asset(&self, asset_id: Uuid, organization_id: Uuid, category: FeeCategory) {
        self.assets.lock().expect("lock").insert(
            asset_id,
            CatalogAsset {
                asset_id,
                organization_id,
                fee_category: category,
                contract_address: None,
                token_id: None,
                metadata_cid: None,
                updated_at: chrono::Utc::now(),
            },
        );
    }

    pub fn get(&self, asset_id: Uuid) -> Option<CatalogAsset> {
        self.assets.lock().expect("lock").get(&asset_id).cloned()
    }

    /// Make the next `n` calls fail with a transient error.
    pub fn inject_transient_failures(&self, n: u32) {
        *self.fail_transient.lock().expect("lock") = n;
    }

    /// Simulate drift: wipe the confirmed fields behind the saga's back.
    pub fn clobber_confirmed_fields(&self, asset_id: Uuid) {
        if let Some(a) = self.assets.lock().expect("lock").get_mut(&asset_id) {
            a.contract_address = None;
            a.token_id = None;
            a.metadata_cid = None;
        }
    }
}

#[async_trait]
impl CatalogPort for MemoryCatalog {
    async fn set_token_contract(
        &self,
        asset_id: Uuid,
        contract_address: &str,
        token_id: &str,
    ) -> SagaResult<PatchOutcome> {
        take_injected_failure(&self.fail_transient, "catalog.set_token_contract")?;
        let mut assets = self.assets.lock().expect("lock");
        match assets.get_mut(&asset_id) {
            Some(a) => {
                a.contract_address = Some(contract_address.to_string());
                a.token_id = Some(token_id.to_string());
                a.updated_at = chrono::Utc::now();
                Ok(PatchOutcome::Patched)
            }
            None => Ok(PatchOutcome::TargetMissing),
        }
    }

    async fn set_metadata_cid(&self, asset_id: Uuid, cid: &str) -> SagaResult<PatchOutcome> {
        take_injected_failure(&self.fail_transient, "catalog.set_metadata_cid")?;
        let mut assets = self.assets.lock().expect("lock");
        match assets.get_mut(&asset_id) {
            Some(a) => {
                a.metadata_cid = Some(cid.to_string());
                a.updated_at = chrono::Utc::now();
                Ok(PatchOutcome::Patched)
            }
            None => Ok(PatchOutcome::TargetMissing),
        }
    }

    async fn fetch(&self, asset_id: Uuid) -> SagaResult<Option<CatalogAsset>> {
        Ok(self.get(asset_id))
    }
}

// ---------------------------------------------------------------------------
// MemoryTransactions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryTransactions {
    /// transaction id -> on_chain_tx_hash (None = row exists, hash unset).
    rows: Mutex<BTreeMap<Uuid, Option<String>>>,
    fail_transient: Mutex<u32>,
}

impl MemoryTransactions {
    pub fn seed_transaction(&self, transaction_id: Uuid) {
        self.rows.lock().expect("lock").insert(transaction_id, None);
    }

    pub fn tx_hash(&self, transaction_id: Uuid) -> Option<Option<String>> {
        self.rows.lock().expect("lock").get(&transaction_id).cloned()
    }

    pub fn inject_transient_failures(&self, n: u32) {
        *self.fail_transient.lock().expect("lock") = n;
    }
}

#[async_trait]
impl TransactionPort for MemoryTransactions {
    async fn set_on_chain_tx_hash(
        &self,
        transaction_id: Uuid,
        tx_hash: &str,
    ) -> SagaResult<PatchOutcome> {
        take_injected_failure(&self.fail_transient, "transactions.set_on_chain_tx_hash")?;
        let mut rows = self.rows.lock().expect("lock");
        match rows.get_mut(&transaction_id) {
            Some(slot) => {
                *slot = Some(tx_hash.to_string());
                Ok(PatchOutcome::Patched)
            }
            None => Ok(PatchOutcome::TargetMissing),
        }
    }

    async fn fetch_on_chain_tx_hash(
        &self,
        transaction_id: Uuid,
    ) -> SagaResult<Option<Option<String>>> {
        Ok(self.tx_hash(transaction_id))
    }
}

// ---------------------------------------------------------------------------
// MemoryActivity / MemoryAnalytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub event_id: String,
    pub subject: String,
    pub entry_type: String,
    pub detail: Value,
}

#[derive(Default)]
pub struct MemoryActivity {
    entries: Mutex<Vec<ActivityEntry>>,
    fail_transient: Mutex<u32>,
}

impl MemoryActivity {
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.lock().expect("lock").clone()
    }

    pub fn entries_for(&self, subject: &str) -> Vec<ActivityEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.subject == subject)
            .collect()
    }

    pub fn inject_transient_failures(&self, n: u32) {
        *self.fail_transient.lock().expect("lock") = n;
    }
}

#[async_trait]
impl ActivityPort for MemoryActivity {
    async fn append(
        &self,
        event_id: &str,
        subject: &str,
        entry_type: &str,
        detail: Value,
    ) -> SagaResult<()> {
        take_injected_failure(&self.fail_transient, "activity.append")?;
        let mut entries = self.entries.lock().expect("lock");
        // Idempotent on (event_id, entry_type), like the unique index in
        // production.
        if !entries
            .iter()
            .any(|e| e.event_id == event_id && e.entry_type == entry_type)
        {
            entries.push(ActivityEntry {
                event_id: event_id.to_string(),
                subject: subject.to_string(),
                entry_type: entry_type.to_string(),
                detail,
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAnalytics {
    rows: Mutex<BTreeMap<(String, String), Value>>,
}

impl MemoryAnalytics {
    pub fn get(&self, metric: &str, subject: &str) -> Option<Value> {
        self.rows
            .lock()
            .expect("lock")
            .get(&(metric.to_string(), subject.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnalyticsPort for MemoryAnalytics {
    async fn upsert(&self, metric: &str, subject: &str, value: Value) -> SagaResult<()> {
        self.rows
            .lock()
            .expect("lock")
            .insert((metric.to_string(), subject.to_string()), value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryMarkers / MemoryDeadLetters
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryMarkers {
    processed: Mutex<BTreeSet<String>>,
}

impl MemoryMarkers {
    pub fn contains(&self, event_id: &str) -> bool {
        self.processed.lock().expect("lock").contains(event_id)
    }
}

#[async_trait]
impl MarkerPort for MemoryMarkers {
    async fn already_processed(&self, event_id: &str) -> SagaResult<bool> {
        Ok(self.contains(event_id))
    }

    async fn mark_processed(&self, event_id: &str, _event_kind: &str) -> SagaResult<()> {
        self.processed.lock().expect("lock").insert(event_id.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRow {
    pub event_id: String,
    pub event_kind: String,
    pub payload: Value,
    pub reason: String,
}

#[derive(Default)]
pub struct MemoryDeadLetters {
    rows: Mutex<Vec<DeadLetterRow>>,
}

impl MemoryDeadLetters {
    pub fn rows(&self) -> Vec<DeadLetterRow> {
        self.rows.lock().expect("lock").clone()
    }
}

#[async_trait]
impl DeadLetterPort for MemoryDeadLetters {
    async fn record(
        &self,
        event_id: &str,
        event_kind: &str,
        payload: Value,
        reason: &str,
    ) -> SagaResult<()> {
        let mut rows = self.rows.lock().expect("lock");
        // Insert-if-absent, like the unique-keyed table in production.
        if !rows.iter().any(|r| r.event_id == event_id) {
            rows.push(DeadLetterRow {
                event_id: event_id.to_string(),
                event_kind: event_kind.to_string(),
                payload,
                reason: reason.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryJobStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryJobStore {
    storage_jobs: Mutex<BTreeMap<String, StorageJobRecord>>,
    completed: Mutex<Vec<ReconcileEvent>>,
}

impl MemoryJobStore {
    pub fn put_storage_job(&self, job: StorageJobRecord) {
        self.storage_jobs
            .lock()
            .expect("lock")
            .insert(job.job_id.clone(), job);
    }

    /// Register a completed job for the drift sweep to re-derive from.
    pub fn push_completed(&self, event: ReconcileEvent) {
        self.completed.lock().expect("lock").push(event);
    }
}

#[async_trait]
impl JobStorePort for MemoryJobStore {
    async fn fetch_storage_job(&self, job_id: &str) -> SagaResult<Option<StorageJobRecord>> {
        Ok(self.storage_jobs.lock().expect("lock").get(job_id).cloned())
    }

    async fn completed_events(&self) -> SagaResult<Vec<ReconcileEvent>> {
        Ok(self.completed.lock().expect("lock").clone())
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Fresh memory ports plus typed handles for assertions.
pub struct MemoryPorts {
    pub catalog: Arc<MemoryCatalog>,
    pub transactions: Arc<MemoryTransactions>,
    pub activity: Arc<MemoryActivity>,
    pub analytics: Arc<MemoryAnalytics>,
    pub markers: Arc<MemoryMarkers>,
    pub dead_letters: Arc<MemoryDeadLetters>,
    pub jobs: Arc<MemoryJobStore>,
}

impl MemoryPorts {
    pub fn saga_ports(&self) -> SagaPorts {
        SagaPorts {
            catalog: self.catalog.clone(),
            transactions: self.transactions.clone(),
            activity: self.activity.clone(),
            analytics: self.analytics.clone(),
            markers: self.markers.clone(),
            dead_letters: self.dead_letters.clone(),
            jobs: self.jobs.clone(),
        }
    }
}

pub fn memory_ports() -> MemoryPorts {
    MemoryPorts {
        catalog: Arc::new(MemoryCatalog::default()),
        transactions: Arc::new(MemoryTransactions::default()),
        activity: Arc::new(MemoryActivity::default()),
        analytics: Arc::new(MemoryAnalytics::default()),
        markers: Arc::new(MemoryMarkers::default()),
        dead_letters: Arc::new(MemoryDeadLetters::default()),
        jobs: Arc::new(MemoryJobStore::default()),
    }
}
