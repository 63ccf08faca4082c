//! # Tee Canvas Host
//!
//! Owns the design surface for its lifetime and composes the core engine,
//! the exporter and the image import pipeline behind one [`SceneHost`].
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p tee-canvas-host -- session.json --out design.png
//! ```
//!
//! ## Storing the result:
//!
//! ```bash
//! cargo run -p tee-canvas-host -- session.json --store-dir designs --theme retro
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `HostConfig` - Canvas size, safety inset, timings and export options
//! - `SceneHost` - Mount/unmount lifecycle, tool commands, polling
//! - `ImportTicket` - Generation-checked image decode handed to a worker
//! - `DesignStore` - Persistence contract used by the surrounding app

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod host;
mod import;
pub mod persistence;
pub mod script;

pub use host::{DesignListener, SceneHost};
pub use import::{ImportOutcome, ImportTicket};
pub use persistence::{
    DesignId, DesignMetadata, DesignRecord, DesignStore, DesignSubmission, DirectoryDesignStore,
    MemoryDesignStore, StoreError, StoredDesign,
};
pub use script::{ReplayReport, Script, ScriptError, ScriptStep};

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tee_canvas_core::{Color, EngineConfig};
use tee_canvas_renderer::{BoundaryExport, ExportConfig};

/// Errors loading or validating host configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`HostConfig`].
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Command-line arguments for tee-canvas.
#[derive(Debug, Clone, Parser)]
#[command(name = "tee-canvas")]
#[command(about = "Replay a design session against the tee canvas and write the design PNG")]
#[command(version)]
pub struct CliArgs {
    /// Session script (JSON array of steps)
    pub script: PathBuf,

    /// Host configuration file (JSON)
    #[arg(long, env = "TEE_CANVAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Initial design image to preload
    #[arg(long)]
    pub initial: Option<PathBuf>,

    /// Where to write the settled design PNG
    #[arg(long, default_value = "design.png")]
    pub out: PathBuf,

    /// Canvas width in pixels
    #[arg(long, env = "TEE_CANVAS_WIDTH")]
    pub width: Option<f32>,

    /// Canvas height in pixels
    #[arg(long, env = "TEE_CANVAS_HEIGHT")]
    pub height: Option<f32>,

    /// Draw the safety boundary into exports
    #[arg(long)]
    pub include_boundary: bool,

    /// Debounce window in milliseconds
    #[arg(long, env = "TEE_CANVAS_DEBOUNCE_MS")]
    pub debounce_ms: Option<u64>,

    /// Store the design in this directory
    #[arg(long, env = "TEE_CANVAS_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Theme recorded with the stored design
    #[arg(long, default_value = "custom")]
    pub theme: String,

    /// T-shirt color recorded with the stored design
    #[arg(long)]
    pub tshirt_color: Option<Color>,
}

/// Host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Canvas width in pixels.
    pub width: f32,
    /// Canvas height in pixels.
    pub height: f32,
    /// Canvas background.
    pub background: Color,
    /// Safety boundary inset from each edge.
    pub safety_inset: f32,
    /// Total margin kept free when fitting an imported image.
    pub import_margin: f32,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Periodic invariant sweep interval in milliseconds.
    pub sweep_ms: u64,
    /// Export resolution multiplier.
    pub export_multiplier: f32,
    /// Whether the safety boundary is drawn into exports.
    pub boundary_export: BoundaryExport,
    /// Latch watchdog in milliseconds, `None` to disable.
    pub watchdog_ms: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HostConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            width: 300.0,
            height: 300.0,
            background: Color::rgb(0xf0, 0xf0, 0xf0),
            safety_inset: 10.0,
            import_margin: 40.0,
            debounce_ms: 150,
            sweep_ms: 2000,
            export_multiplier: 2.0,
            boundary_export: BoundaryExport::Exclude,
            watchdog_ms: Some(5000),
        }
    }

    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_json_str`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "canvas size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.safety_inset < 0.0 || self.safety_inset * 2.0 >= self.width.min(self.height) {
            return Err(ConfigError::Invalid(format!(
                "safety inset {} does not fit the canvas",
                self.safety_inset
            )));
        }
        if self.import_margin < 0.0 || self.import_margin >= self.width.min(self.height) {
            return Err(ConfigError::Invalid(format!(
                "import margin {} does not fit the canvas",
                self.import_margin
            )));
        }
        if self.export_multiplier <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "export multiplier must be positive, got {}",
                self.export_multiplier
            )));
        }
        Ok(())
    }

    /// Settings for the core engine.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            width: self.width,
            height: self.height,
            background: self.background,
            safety_inset: self.safety_inset,
            debounce: Duration::from_millis(self.debounce_ms),
            sweep_interval: Duration::from_millis(self.sweep_ms),
            watchdog: self.watchdog_ms.map(Duration::from_millis),
        }
    }

    /// Settings for the exporter.
    #[must_use]
    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            multiplier: self.export_multiplier,
            boundary: self.boundary_export,
        }
    }

    /// Largest raster worth keeping: the exported resolution.
    #[must_use]
    pub fn max_raster_size(&self) -> (u32, u32) {
        self.export_config().output_size(self.width, self.height)
    }
}

impl TryFrom<&CliArgs> for HostConfig {
    type Error = ConfigError;

    fn try_from(args: &CliArgs) -> Result<Self, Self::Error> {
        let mut config = match &args.config {
            Some(path) => Self::from_path(path)?,
            None => Self::new(),
        };
        if let Some(width) = args.width {
            config.width = width;
        }
        if let Some(height) = args.height {
            config.height = height;
        }
        if args.include_boundary {
            config.boundary_export = BoundaryExport::Include;
        }
        if let Some(ms) = args.debounce_ms {
            config.debounce_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert!((config.width - 300.0).abs() < f32::EPSILON);
        assert_eq!(config.boundary_export, BoundaryExport::Exclude);
        assert_eq!(config.watchdog_ms, Some(5000));
        assert_eq!(config.max_raster_size(), (600, 600));
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = HostConfig::from_json_str(
            r#"{"width": 400, "boundary_export": "include", "watchdog_ms": null}"#,
        )
        .expect("parse");
        assert!((config.width - 400.0).abs() < f32::EPSILON);
        assert!((config.height - 300.0).abs() < f32::EPSILON);
        assert_eq!(config.boundary_export, BoundaryExport::Include);
        assert!(config.watchdog_ms.is_none());
        assert!(config.engine_config().watchdog.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            HostConfig::from_json_str(r#"{"width": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HostConfig::from_json_str(r#"{"import_margin": 500}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HostConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("host.json");
        std::fs::write(&path, r#"{"width": 500, "debounce_ms": 300}"#).expect("write");

        let args = CliArgs::parse_from([
            "tee-canvas",
            "session.json",
            "--config",
            path.to_str().expect("utf8 path"),
            "--debounce-ms",
            "50",
            "--include-boundary",
        ]);
        let config = HostConfig::try_from(&args).expect("config");
        assert!((config.width - 500.0).abs() < f32::EPSILON);
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.boundary_export, BoundaryExport::Include);
    }

    #[test]
    fn test_cli_args_parse_color() {
        let args = CliArgs::parse_from(["tee-canvas", "s.json", "--tshirt-color", "#112233"]);
        assert_eq!(args.tshirt_color, Some(Color::rgb(0x11, 0x22, 0x33)));
        assert_eq!(args.out, PathBuf::from("design.png"));
    }
}
