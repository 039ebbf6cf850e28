//! ddk-daemon library surface.
//!
//! `main.rs` stays thin; everything testable lives here so the scenario
//! tests can compose the router in-process without binding a socket.

pub mod api_types;
pub mod guard;
pub mod routes;
pub mod state;
