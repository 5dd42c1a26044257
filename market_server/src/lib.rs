//! Market data read path: resilience and coordination services.
//!
//! The crate wires four core pieces into runnable services:
//!
//! - `circuit_breaker` — Closed/Open/Half-Open breaker guarding the upstream quote call.
//! - `broker` — topic registry with snapshot broadcast and self-healing, plus the
//!   broker's per-connection loop.
//! - `publisher` — single reconnecting link from the core service to the broker.
//! - `aggregator` — scatter/gather over the core service and the history shards.
//!
//! Around them sit the core quote service (`core_service`), the mock backends
//! (`mock`), and the shared accept loop (`listener`). Each binary under `src/bin`
//! builds one config struct from its arguments and hands it to these types.
#![warn(missing_docs)]
pub mod aggregator;
pub mod broker;
pub mod circuit_breaker;
pub mod core_service;
pub mod listener;
pub mod mock;
pub mod publisher;
