//! # Tee Canvas Core
//!
//! Core logic for the t-shirt design canvas: the scene arena, the object
//! factory, structural invariants, the mutation latch, freehand drawing and
//! export debouncing. Nothing here renders or performs I/O.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                   CanvasEngine                    │
//! ├───────────────────────────────────────────────────┤
//! │  tool command / pointer event                     │
//! │        │                                          │
//! │        ▼                                          │
//! │  MutationRouter ──► ObjectFactory                 │
//! │   (latch)     │                                   │
//! │               ▼                                   │
//! │            Scene ──► InvariantManager             │
//! │                              │                    │
//! │                              ▼                    │
//! │                          Debouncer ──► export due │
//! └───────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod event;
pub mod factory;
pub mod freehand;
pub mod invariant;
pub mod object;
pub mod router;
pub mod scene;
pub mod tool;

pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::Debouncer;
pub use engine::{fit_scale, CanvasEngine, EngineConfig};
pub use error::{CanvasError, CanvasResult};
pub use event::{PointerEvent, PointerPhase};
pub use factory::ObjectFactory;
pub use freehand::FreehandTool;
pub use invariant::{InvariantManager, ReconcileReport};
pub use object::{
    Anchor, Bounds, Color, FontAttrs, FontStyle, FontWeight, ObjectId, ObjectKind, Point,
    RasterHandle, SceneObject, ShapeKind, Style, Transform,
};
pub use router::{
    Modification, MutationIntent, MutationOutcome, MutationRouter, Rejection, RouterPhase,
};
pub use scene::Scene;
pub use tool::{BrushSettings, StylePatch, TextStyle, ToolMode, ToolState};

/// Canvas core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
