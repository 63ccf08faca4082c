//! Scene export to an immutable raster snapshot.
//!
//! Renders a [`Scene`] through an SVG intermediate representation and the
//! resvg/tiny-skia rasterization pipeline. Exporting never mutates the scene.

use std::fmt::{self, Write};
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tee_canvas_core::{Color, FontStyle, FontWeight, ObjectKind, Scene, SceneObject};

use crate::error::{RenderError, RenderResult};

/// Default resolution multiplier applied to the canvas size.
pub const DEFAULT_MULTIPLIER: f32 = 2.0;

/// Whether the safety boundary decoration appears in exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryExport {
    /// Leave the boundary out; it is an on-screen guide only.
    #[default]
    Exclude,
    /// Draw the dashed boundary into the raster.
    Include,
}

/// Raster encoding of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    /// Lossless PNG.
    Png,
}

impl RasterFormat {
    /// MIME type of the encoding.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
        }
    }
}

/// Configuration for scene export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportConfig {
    /// Scale factor applied to the canvas size (2.0 doubles each edge).
    pub multiplier: f32,
    /// Safety boundary handling.
    pub boundary: BoundaryExport,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            boundary: BoundaryExport::default(),
        }
    }
}

impl ExportConfig {
    /// Output size in pixels for a canvas of the given size.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn output_size(&self, width: f32, height: f32) -> (u32, u32) {
        let w = (width * self.multiplier).round().max(1.0) as u32;
        let h = (height * self.multiplier).round().max(1.0) as u32;
        (w, h)
    }
}

/// An encoded raster of a settled scene. Never mutated after creation.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportSnapshot {
    format: RasterFormat,
    width: u32,
    height: u32,
    bytes: Arc<[u8]>,
    scene_version: u64,
}

impl ExportSnapshot {
    /// Encoding.
    #[must_use]
    pub const fn format(&self) -> RasterFormat {
        self.format
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Encoded bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Version of the scene this snapshot was rendered from.
    #[must_use]
    pub const fn scene_version(&self) -> u64 {
        self.scene_version
    }

    /// Self-contained `data:` URL of the raster.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{encoded}", self.format.mime())
    }
}

impl fmt::Debug for ExportSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportSnapshot")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .field("scene_version", &self.scene_version)
            .finish()
    }
}

/// Renders scenes to PNG snapshots.
pub struct RasterExporter {
    config: ExportConfig,
    options: usvg::Options<'static>,
}

impl fmt::Debug for RasterExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterExporter")
            .field("config", &self.config)
            .field("fonts", &self.options.fontdb.len())
            .finish()
    }
}

impl RasterExporter {
    /// Create an exporter. System fonts are loaded once here.
    #[must_use]
    pub fn new(config: ExportConfig) -> Self {
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();
        if options.fontdb.is_empty() {
            tracing::warn!("No system fonts found; text will be missing from exports");
        }
        Self { config, options }
    }

    /// Create an exporter with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ExportConfig::default())
    }

    /// Export configuration.
    #[must_use]
    pub const fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Render the scene to a PNG snapshot tagged with the scene version.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Export`] if rasterizing or encoding fails.
    pub fn export(&self, scene: &Scene) -> RenderResult<ExportSnapshot> {
        let svg = self.render_svg(scene);
        let pixmap = self.rasterize_svg(&svg)?;
        let (width, height) = (pixmap.width(), pixmap.height());
        let png = pixmap
            .encode_png()
            .map_err(|e| RenderError::Export(format!("PNG encoding failed: {e}")))?;
        tracing::debug!(
            "Exported scene v{} to {}x{} PNG ({} bytes)",
            scene.version(),
            width,
            height,
            png.len()
        );
        Ok(ExportSnapshot {
            format: RasterFormat::Png,
            width,
            height,
            bytes: png.into(),
            scene_version: scene.version(),
        })
    }

    /// Build the SVG document for a scene.
    pub(crate) fn render_svg(&self, scene: &Scene) -> String {
        let (out_w, out_h) = self.config.output_size(scene.width(), scene.height());
        let (view_w, view_h) = (scene.width(), scene.height());

        let mut svg = String::with_capacity(4096);
        let _ = write!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"{out_w}\" height=\"{out_h}\" viewBox=\"0 0 {view_w} {view_h}\">",
        );

        // Background
        let _ = write!(
            svg,
            "<rect width=\"100%\" height=\"100%\" {}/>",
            paint("fill", Some(scene.background())),
        );

        for object in scene.objects() {
            if object.is_boundary() && self.config.boundary == BoundaryExport::Exclude {
                continue;
            }
            render_object_svg(&mut svg, object);
        }

        svg.push_str("</svg>");
        svg
    }

    /// Rasterize an SVG string to a tiny-skia Pixmap.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn rasterize_svg(&self, svg_string: &str) -> RenderResult<tiny_skia::Pixmap> {
        let tree = usvg::Tree::from_str(svg_string, &self.options)
            .map_err(|e| RenderError::Export(format!("SVG parsing failed: {e}")))?;

        let px_w = tree.size().width().round() as u32;
        let px_h = tree.size().height().round() as u32;

        let mut pixmap = tiny_skia::Pixmap::new(px_w.max(1), px_h.max(1))
            .ok_or_else(|| RenderError::Export("Failed to create pixmap".to_string()))?;

        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        Ok(pixmap)
    }
}

/// Render a single object to SVG.
fn render_object_svg(svg: &mut String, object: &SceneObject) {
    let tf = &object.transform;
    let bounds = object.bounds();
    let rotated = tf.rotation_deg.abs() > f32::EPSILON;
    if rotated {
        let center = bounds.center();
        let _ = write!(
            svg,
            "<g transform=\"rotate({} {} {})\">",
            tf.rotation_deg, center.x, center.y
        );
    }

    let style = &object.style;
    let stroke_width = style.stroke_width * tf.scale_x;

    match &object.kind {
        ObjectKind::Text { content, font } => {
            let size = font.size * tf.scale_y;
            let baseline = bounds.y + size;
            let weight = match font.weight {
                FontWeight::Normal => "normal",
                FontWeight::Bold => "bold",
            };
            let slant = match font.style {
                FontStyle::Normal => "normal",
                FontStyle::Italic => "italic",
            };
            let decoration = if font.underline { "underline" } else { "none" };
            let _ = write!(
                svg,
                "<text x=\"{}\" y=\"{baseline}\" font-size=\"{size}\" font-family=\"{}\" font-weight=\"{weight}\" font-style=\"{slant}\" text-decoration=\"{decoration}\" {}>{}</text>",
                bounds.x,
                escape_xml(&font.family),
                paint("fill", style.fill.or(Some(Color::BLACK))),
                escape_xml(content),
            );
        }

        ObjectKind::Rectangle { .. } => {
            let _ = write!(
                svg,
                "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" {} {} stroke-width=\"{stroke_width}\"/>",
                bounds.x,
                bounds.y,
                bounds.width,
                bounds.height,
                paint("fill", style.fill),
                paint("stroke", style.stroke),
            );
        }

        ObjectKind::Circle { radius } => {
            let center = bounds.center();
            let _ = write!(
                svg,
                "<circle cx=\"{}\" cy=\"{}\" r=\"{}\" {} {} stroke-width=\"{stroke_width}\"/>",
                center.x,
                center.y,
                radius * tf.scale_x,
                paint("fill", style.fill),
                paint("stroke", style.stroke),
            );
        }

        ObjectKind::Stroke { points } => {
            if points.len() >= 2 {
                let mut d = String::with_capacity(points.len() * 16);
                for (i, p) in points.iter().enumerate() {
                    let cmd = if i == 0 { 'M' } else { 'L' };
                    let _ = write!(d, "{cmd}{} {} ", p.x + tf.x, p.y + tf.y);
                }
                let _ = write!(
                    svg,
                    "<path d=\"{}\" fill=\"none\" {} stroke-width=\"{}\" stroke-linecap=\"round\" stroke-linejoin=\"round\"/>",
                    d.trim_end(),
                    paint("stroke", style.stroke),
                    style.stroke_width,
                );
            }
        }

        ObjectKind::Image { raster } => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(raster.png());
            let _ = write!(
                svg,
                "<image x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" preserveAspectRatio=\"none\" xlink:href=\"data:image/png;base64,{encoded}\"/>",
                bounds.x, bounds.y, bounds.width, bounds.height,
            );
        }

        ObjectKind::SafetyBoundary { .. } => {
            let dash = style
                .dash
                .map(|[on, off]| format!(" stroke-dasharray=\"{on} {off}\""))
                .unwrap_or_default();
            let _ = write!(
                svg,
                "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"none\" {} stroke-width=\"{}\"{dash}/>",
                bounds.x,
                bounds.y,
                bounds.width,
                bounds.height,
                paint("stroke", style.stroke),
                style.stroke_width,
            );
        }

        // On-screen hint only.
        ObjectKind::Placeholder { .. } => {}
    }

    if rotated {
        svg.push_str("</g>");
    }
}

/// `fill="..."`/`stroke="..."` attributes for an optional color.
fn paint(attr: &str, color: Option<Color>) -> String {
    match color {
        Some(c) if !c.is_transparent() => {
            let opacity = f32::from(c.a) / 255.0;
            if c.a == 255 {
                format!("{attr}=\"rgb({},{},{})\"", c.r, c.g, c.b)
            } else {
                format!(
                    "{attr}=\"rgb({},{},{})\" {attr}-opacity=\"{opacity}\"",
                    c.r, c.g, c.b
                )
            }
        }
        _ => format!("{attr}=\"none\""),
    }
}

/// Escape special XML characters.
fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
