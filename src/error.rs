//! Crate-level error taxonomy for the operator-facing surface.
//!
//! Internal classifications (`ProbeClassification`, `breaker::BreakerError`)
//! never surface through this type — a probe tick always ends in a
//! recorded check, not a propagated error (see `prober`).

use thiserror::Error;

use crate::store::StoreError;

/// Result alias for fallible operator-facing operations.
pub type WatchtowerResult<T> = Result<T, WatchtowerError>;

/// Errors surfaced to the caller of [`crate::scheduler::Engine`].
#[derive(Debug, Error)]
pub enum WatchtowerError {
    /// Bad operator input: invalid URL scheme, out-of-range numbers,
    /// `timeout >= checkInterval`, or a duplicate endpoint name.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced endpoint id does not exist.
    #[error("endpoint not found: {0}")]
    NotFound(uuid::Uuid),

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Required configuration was missing or invalid at startup.
    #[error("configuration error: {0}")]
    Config(String),
}
