//! Session scripts: a JSON list of tool-panel commands and pointer events
//! replayed against a [`SceneHost`].
//!
//! ```json
//! [
//!   {"op": "add_text", "text": "Hello", "style": {"size": 20, "bold": true}},
//!   {"op": "add_shape", "shape": "circle", "color": "#cc0000"},
//!   {"op": "set_draw_mode", "enabled": true},
//!   {"op": "pointer", "phase": "down", "x": 10, "y": 10},
//!   {"op": "pointer", "phase": "up", "x": 50, "y": 50},
//!   {"op": "wait", "ms": 200},
//!   {"op": "save"}
//! ]
//! ```
//!
//! The runner waits for the surface to settle after each discrete command,
//! the way a person waits for the preview to update. Waits use the tokio
//! timer, so the host must run on a wall clock.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tee_canvas_core::{
    Color, MutationOutcome, PointerEvent, RouterPhase, ShapeKind, StylePatch, TextStyle,
};
use tee_canvas_renderer::ImageSource;

use crate::{ImportOutcome, SceneHost};

/// Errors loading or running a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// A file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The script is not valid JSON.
    #[error("Invalid script: {0}")]
    Parse(#[from] serde_json::Error),
    /// The decode worker panicked or was cancelled.
    #[error("Decode worker failed: {0}")]
    Worker(String),
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Add a text object.
    AddText {
        /// Text content.
        text: String,
        /// Typography.
        #[serde(default)]
        style: TextStyle,
    },
    /// Add a shape.
    AddShape {
        /// Shape kind.
        shape: ShapeKind,
        /// Shape color.
        #[serde(default)]
        color: Color,
    },
    /// Remove the active object.
    DeleteSelected,
    /// Remove all content.
    ClearCanvas,
    /// Restyle the active object.
    UpdateSelected {
        /// Fields to change.
        patch: StylePatch,
    },
    /// Switch draw mode on or off.
    SetDrawMode {
        /// Draw mode on.
        enabled: bool,
    },
    /// Set the brush width.
    SetBrushSize {
        /// Width in pixels.
        size: u8,
    },
    /// Set the brush color.
    SetBrushColor {
        /// Brush color.
        color: Color,
    },
    /// Import an image file, relative to the script.
    Upload {
        /// Image path.
        path: PathBuf,
    },
    /// Import a `data:` URL.
    UploadUrl {
        /// The URL.
        url: String,
    },
    /// A pointer event in canvas coordinates.
    Pointer(PointerEvent),
    /// Let time pass, firing due work.
    Wait {
        /// Milliseconds.
        ms: u64,
    },
    /// Explicit save.
    Save,
}

impl ScriptStep {
    /// Pointer events and waits run back to back; everything else settles
    /// the surface afterwards.
    const fn settles(&self) -> bool {
        !matches!(self, Self::Pointer(_) | Self::Wait { .. })
    }
}

/// A parsed session script.
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<ScriptStep>,
    base_dir: Option<PathBuf>,
}

impl Script {
    /// Build from steps; relative upload paths resolve against the working
    /// directory.
    #[must_use]
    pub const fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            base_dir: None,
        }
    }

    /// Parse a JSON array of steps.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Parse`] for malformed scripts.
    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Load a script file; upload paths resolve against its directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Io`] or [`ScriptError::Parse`].
    pub fn from_path(path: &Path) -> Result<Self, ScriptError> {
        let json = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut script = Self::from_json_str(&json)?;
        script.base_dir = path.parent().map(Path::to_path_buf);
        Ok(script)
    }

    /// The steps in order.
    #[must_use]
    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Tally of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Steps executed.
    pub steps: usize,
    /// Commands that changed the design.
    pub committed: usize,
    /// Commands that were refused.
    pub rejected: usize,
    /// Imports that failed to decode or were dropped.
    pub failed_imports: usize,
    /// Exports fired, debounced or explicit.
    pub exports: usize,
}

impl ReplayReport {
    fn record(&mut self, outcome: MutationOutcome) {
        match outcome.rejection() {
            None => self.committed += 1,
            Some(rejection) => {
                tracing::debug!("Step rejected: {}", rejection);
                self.rejected += 1;
            }
        }
    }
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} steps, {} committed, {} rejected, {} failed imports, {} exports",
            self.steps, self.committed, self.rejected, self.failed_imports, self.exports
        )
    }
}

/// Replay `script` against `host`, then wait for the surface to settle.
///
/// # Errors
///
/// Returns [`ScriptError`] when an upload file cannot be read or the
/// decode worker fails. Refused commands are counted, not errors.
pub async fn replay(host: &mut SceneHost, script: &Script) -> Result<ReplayReport, ScriptError> {
    let mut report = ReplayReport::default();
    for step in &script.steps {
        report.steps += 1;
        tracing::debug!("Step {}: {:?}", report.steps, step);
        match step {
            ScriptStep::AddText { text, style } => report.record(host.add_text(text, style)),
            ScriptStep::AddShape { shape, color } => {
                report.record(host.add_shape(*shape, *color));
            }
            ScriptStep::DeleteSelected => report.record(host.delete_selected()),
            ScriptStep::ClearCanvas => report.record(host.clear_canvas()),
            ScriptStep::UpdateSelected { patch } => {
                report.record(host.update_selected(patch.clone()));
            }
            ScriptStep::SetDrawMode { enabled } => {
                if host.set_draw_mode(*enabled).is_err() {
                    report.rejected += 1;
                }
            }
            ScriptStep::SetBrushSize { size } => {
                if host.set_brush_size(*size).is_err() {
                    report.rejected += 1;
                }
            }
            ScriptStep::SetBrushColor { color } => {
                if host.set_brush_color(*color).is_err() {
                    report.rejected += 1;
                }
            }
            ScriptStep::Upload { path } => {
                let path = script.resolve(path);
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| ScriptError::Io { path, source })?;
                import(host, ImageSource::Bytes(bytes), &mut report).await?;
            }
            ScriptStep::UploadUrl { url } => {
                import(host, ImageSource::Url(url.clone()), &mut report).await?;
            }
            ScriptStep::Pointer(event) => {
                if let Some(outcome) = host.pointer(*event) {
                    report.record(outcome);
                }
            }
            ScriptStep::Wait { ms } => wait(host, Duration::from_millis(*ms), &mut report).await,
            ScriptStep::Save => match host.export_now() {
                Some(_) => report.exports += 1,
                None => {
                    tracing::info!("Nothing to save yet");
                    report.rejected += 1;
                }
            },
        }
        if step.settles() {
            settle(host, &mut report).await;
        }
    }
    settle(host, &mut report).await;
    Ok(report)
}

/// Decode on a blocking worker, then complete on this task.
async fn import(
    host: &mut SceneHost,
    source: ImageSource,
    report: &mut ReplayReport,
) -> Result<(), ScriptError> {
    let Ok(ticket) = host.begin_import(source) else {
        report.failed_imports += 1;
        return Ok(());
    };
    let (ticket, result) = tokio::task::spawn_blocking(move || {
        let result = ticket.decode();
        (ticket, result)
    })
    .await
    .map_err(|e| ScriptError::Worker(e.to_string()))?;

    match host.complete_import(ticket, result) {
        ImportOutcome::Applied(_) => report.committed += 1,
        ImportOutcome::Parked => {}
        ImportOutcome::Superseded | ImportOutcome::Discarded | ImportOutcome::Failed => {
            report.failed_imports += 1;
        }
    }
    Ok(())
}

async fn sleep_until(deadline: Instant) {
    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
}

/// Poll at each deadline until nothing is in flight. An open gesture is
/// left for later pointer steps.
async fn settle(host: &mut SceneHost, report: &mut ReplayReport) {
    while host.is_mounted() && !host.is_settled() {
        if host.phase() == Some(RouterPhase::Gesture) {
            return;
        }
        if let Some(deadline) = host.next_deadline() {
            sleep_until(deadline).await;
        }
        if host.poll() {
            report.exports += 1;
        }
    }
}

async fn wait(host: &mut SceneHost, duration: Duration, report: &mut ReplayReport) {
    let until = Instant::now() + duration;
    loop {
        let next = host.next_deadline().map_or(until, |d| d.min(until));
        sleep_until(next).await;
        if host.poll() {
            report.exports += 1;
        }
        if Instant::now() >= until {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tee_canvas_core::PointerPhase;

    #[test]
    fn test_parse_steps() {
        let script = Script::from_json_str(
            r##"[
                {"op": "add_text", "text": "Hello", "style": {"size": 20}},
                {"op": "add_shape", "shape": "circle", "color": "#ff0000"},
                {"op": "delete_selected"},
                {"op": "pointer", "phase": "move", "x": 3, "y": 4},
                {"op": "wait", "ms": 10},
                {"op": "save"}
            ]"##,
        )
        .expect("parse");
        assert_eq!(script.steps().len(), 6);
        assert!(matches!(
            &script.steps()[0],
            ScriptStep::AddText { text, style } if text == "Hello" && (style.size - 20.0).abs() < f32::EPSILON
        ));
        assert_eq!(
            script.steps()[1],
            ScriptStep::AddShape {
                shape: ShapeKind::Circle,
                color: Color::rgb(255, 0, 0)
            }
        );
        match &script.steps()[3] {
            ScriptStep::Pointer(event) => assert_eq!(event.phase, PointerPhase::Move),
            other => panic!("expected pointer, got {other:?}"),
        }
        assert!(!script.steps()[3].settles());
        assert!(script.steps()[5].settles());
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(matches!(
            Script::from_json_str(r#"[{"op": "explode"}]"#),
            Err(ScriptError::Parse(_))
        ));
    }

    #[test]
    fn test_relative_paths_follow_script() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"[{"op": "upload", "path": "shirt.png"}]"#).expect("write");
        let script = Script::from_path(&path).expect("load");
        assert_eq!(
            script.resolve(Path::new("shirt.png")),
            dir.path().join("shirt.png")
        );
        assert_eq!(
            script.resolve(Path::new("/abs/shirt.png")),
            PathBuf::from("/abs/shirt.png")
        );
    }

    #[test]
    fn test_report_display() {
        let report = ReplayReport {
            steps: 3,
            committed: 2,
            rejected: 1,
            failed_imports: 0,
            exports: 1,
        };
        assert_eq!(
            report.to_string(),
            "3 steps, 2 committed, 1 rejected, 0 failed imports, 1 exports"
        );
    }
}
