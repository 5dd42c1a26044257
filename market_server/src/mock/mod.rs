//! Stand-in backends used to run the system locally.
//!
//! - `external` — a chaotic upstream quote source that drops or delays some requests.
//! - `shard` — a history shard serving a fixed set of generated transactions.
pub mod external;
pub mod shard;
