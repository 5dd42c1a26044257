//!
//! Common types and utilities shared by the market data services and client.
//!
//! This crate aggregates:
//! - `error` — unified error type `ServiceError` used across the workspace.
//! - `result` — handy `Result<T, ServiceError>` alias.
//! - `model` — `Quote`, `Transaction`, and the aggregated response record.
//! - `protocol` — the envelope type and its streaming JSON codec.
//! - `net` — default ports and the deadline-bounded request helper.
//! - `config` — per-service configuration structs.
//! - `logging` — logger bootstrap.
#![warn(missing_docs)]
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod net;
pub mod protocol;
pub mod result;

pub use error::ServiceError;
pub use protocol::{Envelope, MessageType};
pub use result::Result;
