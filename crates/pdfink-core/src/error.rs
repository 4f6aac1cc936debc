//! Error taxonomy for the overlay core.

use thiserror::Error;

/// Errors raised by geometry, controller mapping and the edit overlay.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverlayError {
    /// A matrix used as a basis change is not invertible.
    #[error("Invalid matrix: determinant {det:e} is below tolerance")]
    InvalidMatrix { det: f64 },
    /// An IR object produced non-finite geometry and was skipped.
    #[error("Malformed object {id}: {reason}")]
    MalformedObject { id: String, reason: String },
    /// The backend declined the patch or the transport failed.
    #[error("Patch rejected: {0}")]
    PatchRejected(String),
    /// A patch resolution arrived for a surface that no longer exists.
    #[error("Stale surface (generation {generation}, page {page})")]
    StaleSurface { generation: u64, page: usize },
    #[error("Unknown page: {0}")]
    UnknownPage(usize),
    #[error("Unknown shape on page {page}")]
    UnknownShape { page: usize },
    /// Backend call failed outside of a patch (open, fetch, download).
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Rasterizer error: {0}")]
    Raster(String),
}

/// Result type for overlay operations.
pub type OverlayResult<T> = Result<T, OverlayError>;
