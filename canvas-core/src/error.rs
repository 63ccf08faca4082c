//! Error types for canvas operations.

use thiserror::Error;

use crate::object::ObjectId;
use crate::router::RouterPhase;

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors that can occur in canvas operations.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// Object not found in the scene.
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// The object may not be removed or restyled by callers.
    #[error("Object is protected: {0}")]
    ProtectedObject(ObjectId),

    /// The mutation latch refused a phase change.
    #[error("Invalid latch transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Phase the latch was in.
        from: RouterPhase,
        /// Phase that was requested.
        to: RouterPhase,
    },

    /// Invalid operation or argument.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A color string could not be parsed.
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Scene serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
