//! Error taxonomy for the stitching core.
//!
//! Argument validation fails fast and synchronously, before any side effect.
//! Sampling errors from a caller's matrix accessor propagate unchanged — the
//! core has no way to know whether a retry is safe. Arithmetic edge cases
//! (division by zero in the weighted reducer when every distance is
//! non-negative) resolve to the method's default value rather than an error.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced by the stitching core.
#[derive(Debug, Clone, Error)]
pub enum StitchError {
    /// Null/empty required input, mismatched `dim_count` across frames,
    /// destination, offset, or tile-size vectors, a non-positive
    /// `dim_count`, or a continuation mode of `None` passed where a
    /// concrete mode is required.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A rectangular area with `min > max` along some axis, zero
    /// dimensionality, or more than 63 dimensions.
    #[error("invalid area: {reason}")]
    InvalidArea { reason: String },

    /// The source or destination matrix declares an element type the
    /// requested operation cannot represent.
    #[error("element type {element_type:?} is not supported here")]
    ElementTypeUnsupported { element_type: crate::matrix::ElementType },

    /// The requested rectangle's element count, or an intermediate buffer
    /// it would require, exceeds the platform's index limit.
    #[error("requested result of {element_count} elements is too large")]
    TooLargeResult { element_count: u128 },

    /// Propagated unchanged from a caller's matrix accessor.
    #[error("I/O error from matrix accessor: {0}")]
    IoError(#[from] IoErrorSource),

    /// The progress context signaled cancellation mid-`stitch`.
    #[error("stitch operation was cancelled")]
    Cancelled,
}

/// Wraps an arbitrary accessor-supplied I/O failure so `StitchError` stays
/// `Clone` (trait objects aren't, so the source is shared behind an `Arc`).
#[derive(Debug, Clone)]
pub struct IoErrorSource(pub Arc<dyn std::error::Error + Send + Sync>);

impl fmt::Display for IoErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoErrorSource {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl StitchError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        StitchError::InvalidArgument { reason: reason.into() }
    }

    pub fn invalid_area(reason: impl Into<String>) -> Self {
        StitchError::InvalidArea { reason: reason.into() }
    }

    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StitchError::IoError(IoErrorSource(Arc::new(err)))
    }
}

pub type StitchResult<T> = Result<T, StitchError>;
