//! Renderer error types.

use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while decoding or exporting.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An image source could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Rasterizing or encoding the scene failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// The source kind is not handled in-process (e.g. a remote URL).
    #[error("Unsupported image source: {0}")]
    UnsupportedSource(String),
}
