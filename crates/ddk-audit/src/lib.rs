//! ddk-audit
//!
//! Append-only operator log. Writes JSON Lines (one event per line) with an
//! optional hash chain so tampering with past entries is detectable.
//!
//! The reconciliation saga appends here for everything that demands operator
//! attention or an immutable trail: dead-lettered events, drift corrections,
//! benign skips. The log is for humans and forensics; the database rows stay
//! the system of record.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Categories with operator-facing meaning. Stable strings; dashboards and
/// alerting key on them.
pub const CATEGORY_DEAD_LETTER: &str = "DEAD_LETTER";
pub const CATEGORY_DRIFT_CORRECTED: &str = "DRIFT_CORRECTED";
pub const CATEGORY_BENIGN_SKIP: &str = "BENIGN_SKIP";

// ---------------------------------------------------------------------------
// OpsEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsEvent {
    /// Position in the log, starting at 0.
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    /// One of the CATEGORY_* constants (free-form values are allowed but
    /// won't alert).
    pub category: String,
    /// What the event is about — an event id, asset id, transaction id.
    pub subject: String,
    pub detail: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

// ---------------------------------------------------------------------------
// OpsLogWriter
// ---------------------------------------------------------------------------

/// Append-only writer. Not thread-safe; wrap in a mutex if shared.
pub struct OpsLogWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    seq: u64,
}

impl OpsLogWriter {
    /// Creates the writer and ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Restore chain state when resuming an existing log after restart:
    /// `seq` = number of events already written, `last_hash` = final line's
    /// hash_self.
    pub fn resume(&mut self, seq: u64, last_hash: Option<String>) {
        self.seq = seq;
        self.last_hash = last_hash;
    }

    pub fn append(&mut self, category: &str, subject: &str, detail: Value) -> Result<OpsEvent> {
        let mut ev = OpsEvent {
            seq: self.seq,
            ts_utc: Utc::now(),
            category: category.to_string(),
            subject: subject.to_string(),
            detail,
            hash_prev: None,
            hash_self: None,
        };
        self.seq += 1;

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            let self_hash = compute_event_hash(&ev)?;
            ev.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;
        Ok(ev)
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open ops log {:?}", path))?;
    f.write_all(line.as_bytes()).context("write ops line")?;
    f.write_all(b"\n").context("write newline")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Canonicalization + chain verification
// ---------------------------------------------------------------------------

/// Canonicalize by sorting keys recursively and emitting compact JSON. One
/// event == one line; the hash is computed over this form.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize ops event")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash over the canonical event WITHOUT hash_self (to avoid self-reference).
pub fn compute_event_hash(ev: &OpsEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;
    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Result of chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read ops log {:?}", path.as_ref()))?;
    verify_chain_str(&content)
}

pub fn verify_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let ev: OpsEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse ops event at line {}", i + 1))?;
        line_count += 1;

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }
        if let Some(ref claimed) = ev.hash_self {
            let recomputed = compute_event_hash(&ev)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }
        prev_hash = ev.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}
