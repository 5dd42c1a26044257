//! Result type alias shared across the workspace.
//!
//! Defaults the error type to the common `ServiceError`, so functions can simply
//! return `Result<T>`.
use crate::error::ServiceError;

/// Workspace-wide `Result` alias with `ServiceError` as the default error.
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
