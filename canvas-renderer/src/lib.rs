//! # Tee Canvas Renderer
//!
//! Turns a design scene into an immutable raster snapshot and turns uploaded
//! images into rasters the scene can hold.
//!
//! ## Export Pipeline
//!
//! ```text
//! ┌─────────┐    ┌─────────┐    ┌───────────┐    ┌──────────────┐    ┌─────┐
//! │  Scene  │ ─► │   SVG   │ ─► │ usvg Tree │ ─► │ resvg/Pixmap │ ─► │ PNG │
//! └─────────┘    └─────────┘    └───────────┘    └──────────────┘    └─────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod decode;
pub mod error;
pub mod export;

pub use decode::{decode_source, ImageFormat, ImageSource};
pub use error::{RenderError, RenderResult};
pub use export::{BoundaryExport, ExportConfig, ExportSnapshot, RasterExporter, RasterFormat};

/// Renderer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
