//! ddk-testkit
//!
//! In-memory implementations of the reconciliation saga's ports, plus entity
//! fixtures, for tests that must run without Postgres. Every store is a
//! plain mutex-guarded map; injectable transient failures let tests exercise
//! the deferral path.

mod fixtures;
mod memory_ports;

pub use fixtures::{accepted_offer, offer_fixture, transaction_fixture};
pub use memory_ports::{
    memory_ports, ActivityEntry, DeadLetterRow, MemoryActivity, MemoryAnalytics, MemoryCatalog,
    MemoryDeadLetters, MemoryJobStore, MemoryMarkers, MemoryPorts, MemoryTransactions,
};
