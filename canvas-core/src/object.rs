//! Scene objects - the typed building blocks of a design.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::{CanvasError, CanvasResult};

/// Source of object identities. Process-wide so ids never repeat across remounts.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity tag for a scene object.
///
/// Ids are monotonic and never reused, so a stale id held by a caller can
/// only miss; it can never alias a newer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Mint the next id.
    pub(crate) fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An RGBA color, written as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel (255 = opaque).
    pub a: u8,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    /// Create an opaque color.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` or the keyword `transparent`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidColor`] for anything else.
    pub fn parse(input: &str) -> CanvasResult<Self> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("transparent") {
            return Ok(Self::TRANSPARENT);
        }
        let invalid = || CanvasError::InvalidColor(input.to_string());
        let hex = trimmed.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let expand = |i: usize| channel(&hex[i..=i].repeat(2));
                Ok(Self::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            8 => Ok(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
                a: channel(&hex[6..8])?,
            }),
            _ => Err(invalid()),
        }
    }

    /// Hex form; the alpha byte is only written when not opaque.
    #[must_use]
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Whether the color paints nothing.
    #[must_use]
    pub const fn is_transparent(self) -> bool {
        self.a == 0
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Color {
    type Error = CanvasError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// A point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X position (pixels from left).
    pub x: f32,
    /// Y position (pixels from top).
    pub y: f32,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Which point of the object `Transform::x`/`y` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Position is the top-left corner.
    #[default]
    TopLeft,
    /// Position is the center.
    Center,
}

/// Placement of an object on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// X position of the anchor point.
    pub x: f32,
    /// Y position of the anchor point.
    pub y: f32,
    /// Horizontal scale factor.
    pub scale_x: f32,
    /// Vertical scale factor.
    pub scale_y: f32,
    /// Rotation in degrees, clockwise, about the object center.
    pub rotation_deg: f32,
    /// Anchor the position refers to.
    pub anchor: Anchor,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation_deg: 0.0,
            anchor: Anchor::TopLeft,
        }
    }
}

impl Transform {
    /// Top-left anchored transform at `(x, y)`.
    #[must_use]
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    /// Center anchored transform at `(x, y)`.
    #[must_use]
    pub fn centered(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            anchor: Anchor::Center,
            ..Self::default()
        }
    }

    /// Apply a uniform scale.
    #[must_use]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale_x = scale;
        self.scale_y = scale;
        self
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Bounds {
    /// Whether the point lies inside (edges inclusive).
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Font weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    /// Regular weight.
    #[default]
    Normal,
    /// Bold weight.
    Bold,
}

/// Font slant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    /// Upright.
    #[default]
    Normal,
    /// Italic.
    Italic,
}

/// Typography for text objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontAttrs {
    /// Font family name.
    pub family: String,
    /// Font size in pixels.
    pub size: f32,
    /// Weight.
    pub weight: FontWeight,
    /// Slant.
    pub style: FontStyle,
    /// Underline decoration.
    pub underline: bool,
}

impl Default for FontAttrs {
    fn default() -> Self {
        Self {
            family: "Arial".to_string(),
            size: 20.0,
            weight: FontWeight::Normal,
            style: FontStyle::Normal,
            underline: false,
        }
    }
}

/// Paint attributes shared by every object kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Style {
    /// Interior paint, `None` for unfilled.
    pub fill: Option<Color>,
    /// Outline paint, `None` for no outline.
    pub stroke: Option<Color>,
    /// Outline width in pixels.
    pub stroke_width: f32,
    /// Dash pattern `[on, off]`, `None` for solid.
    pub dash: Option<[f32; 2]>,
}

/// A decoded raster, shared cheaply between the scene and exports.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterHandle {
    width: u32,
    height: u32,
    png: Arc<[u8]>,
}

impl RasterHandle {
    /// Wrap PNG-encoded pixels of the given dimensions.
    #[must_use]
    pub fn new(width: u32, height: u32, png: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            png: png.into(),
        }
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

    /// PNG-encoded bytes.
    #[must_use]
    pub fn png(&self) -> &[u8] {
        &self.png
    }
}

impl fmt::Debug for RasterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterHandle")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

// Layout metadata only carries the dimensions, never the pixels.
impl Serialize for RasterHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RasterHandle", 2)?;
        state.serialize_field("width", &self.width)?;
        state.serialize_field("height", &self.height)?;
        state.end()
    }
}

/// Shapes offered by the tool panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// Axis-aligned rectangle.
    Rectangle,
    /// Circle.
    Circle,
}

impl FromStr for ShapeKind {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rectangle" | "rect" | "square" => Ok(Self::Rectangle),
            "circle" => Ok(Self::Circle),
            other => Err(CanvasError::InvalidOperation(format!(
                "unknown shape: {other}"
            ))),
        }
    }
}

/// What an object draws.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectKind {
    /// A single line of text.
    Text {
        /// Text content.
        content: String,
        /// Typography.
        font: FontAttrs,
    },

    /// A rectangle of unscaled size `width` x `height`.
    Rectangle {
        /// Width in pixels.
        width: f32,
        /// Height in pixels.
        height: f32,
    },

    /// A circle of unscaled radius `radius`.
    Circle {
        /// Radius in pixels.
        radius: f32,
    },

    /// The main imported raster.
    Image {
        /// Decoded pixels.
        raster: RasterHandle,
    },

    /// A freehand stroke through absolute canvas points.
    Stroke {
        /// Polyline vertices.
        points: Vec<Point>,
    },

    /// Dashed outline of the printable area.
    SafetyBoundary {
        /// Width in pixels.
        width: f32,
        /// Height in pixels.
        height: f32,
    },

    /// Hint shown on an empty design.
    Placeholder {
        /// Hint text.
        content: String,
        /// Typography.
        font: FontAttrs,
    },
}

impl ObjectKind {
    /// Short lowercase name used in tags and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Rectangle { .. } => "rectangle",
            Self::Circle { .. } => "circle",
            Self::Image { .. } => "image",
            Self::Stroke { .. } => "stroke",
            Self::SafetyBoundary { .. } => "safety_boundary",
            Self::Placeholder { .. } => "placeholder",
        }
    }

    /// Whether the object is part of the user's design.
    #[must_use]
    pub const fn is_content(&self) -> bool {
        !matches!(self, Self::SafetyBoundary { .. } | Self::Placeholder { .. })
    }
}

/// A scene object with content, placement, paint and interactivity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneObject {
    /// Identity tag.
    pub id: ObjectId,
    /// What the object draws.
    pub kind: ObjectKind,
    /// Placement.
    pub transform: Transform,
    /// Paint.
    pub style: Style,
    /// Whether the object can become the selection.
    pub selectable: bool,
    /// Whether pointer events hit the object.
    pub evented: bool,
}

impl SceneObject {
    /// Create an interactive object with a fresh id.
    pub(crate) fn new(kind: ObjectKind, transform: Transform, style: Style) -> Self {
        Self {
            id: ObjectId::next(),
            kind,
            transform,
            style,
            selectable: true,
            evented: true,
        }
    }

    /// Mark the object non-selectable and non-evented.
    #[must_use]
    pub(crate) fn inert(mut self) -> Self {
        self.selectable = false;
        self.evented = false;
        self
    }

    /// Readable tag such as `circle_17`.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}_{}", self.kind.name(), self.id.0)
    }

    /// Whether callers may never remove this object.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        matches!(self.kind, ObjectKind::SafetyBoundary { .. })
    }

    /// Whether this is the safety boundary.
    #[must_use]
    pub const fn is_boundary(&self) -> bool {
        self.is_protected()
    }

    /// Whether this is the empty-design placeholder.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self.kind, ObjectKind::Placeholder { .. })
    }

    /// Whether this is an imported raster.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self.kind, ObjectKind::Image { .. })
    }

    /// Unscaled, unrotated size of the object.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn intrinsic_size(&self) -> (f32, f32) {
        match &self.kind {
            ObjectKind::Text { content, font } | ObjectKind::Placeholder { content, font } => {
                // No font metrics here; an average advance of 0.6em is close enough for hit testing.
                let chars = content.chars().count() as f32;
                (chars * font.size * 0.6, font.size * 1.2)
            }
            ObjectKind::Rectangle { width, height }
            | ObjectKind::SafetyBoundary { width, height } => (*width, *height),
            ObjectKind::Circle { radius } => (radius * 2.0, radius * 2.0),
            ObjectKind::Image { raster } => (raster.width() as f32, raster.height() as f32),
            ObjectKind::Stroke { points } => {
                let (min, max) = point_extent(points);
                (max.x - min.x, max.y - min.y)
            }
        }
    }

    /// Axis-aligned bounds on the canvas, ignoring rotation.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        let t = &self.transform;
        if let ObjectKind::Stroke { points } = &self.kind {
            let (min, max) = point_extent(points);
            let pad = self.style.stroke_width / 2.0;
            return Bounds {
                x: min.x + t.x - pad,
                y: min.y + t.y - pad,
                width: max.x - min.x + pad * 2.0,
                height: max.y - min.y + pad * 2.0,
            };
        }

        let (w, h) = self.intrinsic_size();
        let width = w * t.scale_x;
        let height = h * t.scale_y;
        let (x, y) = match t.anchor {
            Anchor::TopLeft => (t.x, t.y),
            Anchor::Center => (t.x - width / 2.0, t.y - height / 2.0),
        };
        Bounds {
            x,
            y,
            width,
            height,
        }
    }

    /// Check if a point (in canvas coordinates) is within this object.
    #[must_use]
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        self.bounds().contains(x, y)
    }

    /// Move the object by a delta.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.transform.x += dx;
        self.transform.y += dy;
    }
}

fn point_extent(points: &[Point]) -> (Point, Point) {
    let Some(first) = points.first() else {
        return (Point::new(0.0, 0.0), Point::new(0.0, 0.0));
    };
    points.iter().fold((*first, *first), |(min, max), p| {
        (
            Point::new(min.x.min(p.x), min.y.min(p.y)),
            Point::new(max.x.max(p.x), max.y.max(p.y)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse_forms() {
        assert_eq!(Color::parse("#000000").expect("hex6"), Color::BLACK);
        assert_eq!(Color::parse("#fff").expect("hex3"), Color::WHITE);
        assert_eq!(
            Color::parse("#5cb85c").expect("green"),
            Color::rgb(0x5c, 0xb8, 0x5c)
        );
        assert_eq!(
            Color::parse("transparent").expect("keyword"),
            Color::TRANSPARENT
        );
        let half = Color::parse("#ff000080").expect("hex8");
        assert_eq!(half.a, 0x80);
        assert_eq!(half.to_hex(), "#ff000080");
    }

    #[test]
    fn test_color_parse_rejects_garbage() {
        assert!(Color::parse("red").is_err());
        assert!(Color::parse("#12345").is_err());
        assert!(Color::parse("#gggggg").is_err());
        assert!(Color::parse("").is_err());
    }

    #[test]
    fn test_color_serde_as_hex_string() {
        let json = serde_json::to_string(&Color::rgb(1, 2, 3)).expect("serialize");
        assert_eq!(json, "\"#010203\"");
        let back: Color = serde_json::from_str("\"#0a0b0c\"").expect("deserialize");
        assert_eq!(back, Color::rgb(10, 11, 12));
    }

    #[test]
    fn test_ids_are_monotonic() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert!(b > a);
    }

    #[test]
    fn test_center_anchored_bounds() {
        let obj = SceneObject::new(
            ObjectKind::Rectangle {
                width: 100.0,
                height: 50.0,
            },
            Transform::centered(150.0, 150.0).with_scale(2.0),
            Style::default(),
        );
        let b = obj.bounds();
        assert!((b.x - 50.0).abs() < f32::EPSILON);
        assert!((b.y - 100.0).abs() < f32::EPSILON);
        assert!((b.width - 200.0).abs() < f32::EPSILON);
        assert!(obj.contains_point(150.0, 150.0));
        assert!(!obj.contains_point(20.0, 20.0));
    }

    #[test]
    fn test_stroke_bounds_follow_translation() {
        let mut obj = SceneObject::new(
            ObjectKind::Stroke {
                points: vec![Point::new(10.0, 10.0), Point::new(50.0, 30.0)],
            },
            Transform::default(),
            Style {
                stroke: Some(Color::BLACK),
                stroke_width: 4.0,
                ..Style::default()
            },
        );
        obj.translate(5.0, 0.0);
        let b = obj.bounds();
        assert!((b.x - 13.0).abs() < f32::EPSILON);
        assert!((b.width - 44.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_tag_uses_kind_name() {
        let obj = SceneObject::new(
            ObjectKind::Circle { radius: 30.0 },
            Transform::default(),
            Style::default(),
        );
        assert!(obj.tag().starts_with("circle_"));
        assert!(ObjectKind::Circle { radius: 1.0 }.is_content());
        assert!(!ObjectKind::Placeholder {
            content: String::new(),
            font: FontAttrs::default()
        }
        .is_content());
    }
}
