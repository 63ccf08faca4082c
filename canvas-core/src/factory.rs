//! Object Factory: the only place scene objects are constructed.
//!
//! Every object leaves the factory with a fresh [`ObjectId`], so two circles
//! created back to back are always distinguishable. Toolbar text and shapes
//! land on fixed anchors rather than under the pointer.

use crate::{
    BrushSettings, Color, FontAttrs, ObjectKind, Point, RasterHandle, SceneObject, ShapeKind,
    Style, TextStyle, Transform,
};

/// Hint text shown on an empty design.
pub const PLACEHOLDER_TEXT: &str = "upload your design";
/// Placeholder text color.
pub const PLACEHOLDER_COLOR: Color = Color::rgb(0x99, 0x99, 0x99);
/// Safety boundary outline color.
pub const BOUNDARY_COLOR: Color = Color::rgb(0x5c, 0xb8, 0x5c);
/// Safety boundary dash pattern.
pub const BOUNDARY_DASH: [f32; 2] = [5.0, 5.0];

const CIRCLE_RADIUS: f32 = 30.0;
const RECTANGLE_SIZE: f32 = 100.0;
const RECTANGLE_OUTLINE: f32 = 2.0;

/// Builds typed scene objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectFactory {
    /// Where toolbar text is placed.
    pub text_anchor: Point,
    /// Where toolbar shapes are placed.
    pub shape_anchor: Point,
}

impl Default for ObjectFactory {
    fn default() -> Self {
        Self {
            text_anchor: Point::new(50.0, 50.0),
            shape_anchor: Point::new(100.0, 100.0),
        }
    }
}

impl ObjectFactory {
    /// A text object at the text anchor.
    #[must_use]
    pub fn create_text(&self, value: &str, style: &TextStyle) -> SceneObject {
        SceneObject::new(
            ObjectKind::Text {
                content: value.to_string(),
                font: style.to_font_attrs(),
            },
            Transform::at(self.text_anchor.x, self.text_anchor.y),
            Style {
                fill: Some(style.color),
                ..Style::default()
            },
        )
    }

    /// A shape at the shape anchor.
    ///
    /// Circles are filled with `color`; rectangles are hollow with a 2px
    /// outline in `color`.
    #[must_use]
    pub fn create_shape(&self, kind: ShapeKind, color: Color) -> SceneObject {
        let transform = Transform::at(self.shape_anchor.x, self.shape_anchor.y);
        match kind {
            ShapeKind::Circle => SceneObject::new(
                ObjectKind::Circle {
                    radius: CIRCLE_RADIUS,
                },
                transform,
                Style {
                    fill: Some(color),
                    ..Style::default()
                },
            ),
            ShapeKind::Rectangle => SceneObject::new(
                ObjectKind::Rectangle {
                    width: RECTANGLE_SIZE,
                    height: RECTANGLE_SIZE,
                },
                transform,
                Style {
                    fill: Some(Color::TRANSPARENT),
                    stroke: Some(color),
                    stroke_width: RECTANGLE_OUTLINE,
                    dash: None,
                },
            ),
        }
    }

    /// A freehand stroke through absolute canvas points.
    #[must_use]
    pub fn create_stroke(&self, points: Vec<Point>, brush: &BrushSettings) -> SceneObject {
        SceneObject::new(
            ObjectKind::Stroke { points },
            Transform::default(),
            Style {
                fill: None,
                stroke: Some(brush.color),
                stroke_width: f32::from(brush.width()),
                dash: None,
            },
        )
    }

    /// An imported raster centered on `center` at a uniform `scale`.
    #[must_use]
    pub fn create_image(&self, raster: RasterHandle, center: Point, scale: f32) -> SceneObject {
        SceneObject::new(
            ObjectKind::Image { raster },
            Transform::centered(center.x, center.y).with_scale(scale),
            Style::default(),
        )
    }

    /// The empty-design hint, centered and inert.
    #[must_use]
    pub fn create_placeholder(&self, canvas_width: f32, canvas_height: f32) -> SceneObject {
        SceneObject::new(
            ObjectKind::Placeholder {
                content: PLACEHOLDER_TEXT.to_string(),
                font: FontAttrs::default(),
            },
            Transform::centered(canvas_width / 2.0, canvas_height / 2.0),
            Style {
                fill: Some(PLACEHOLDER_COLOR),
                ..Style::default()
            },
        )
        .inert()
    }

    /// The dashed print-area outline, inset on all sides.
    ///
    /// Only the invariant manager creates boundaries.
    pub(crate) fn create_safety_boundary(
        canvas_width: f32,
        canvas_height: f32,
        inset: f32,
    ) -> SceneObject {
        SceneObject::new(
            ObjectKind::SafetyBoundary {
                width: (canvas_width - inset * 2.0).max(0.0),
                height: (canvas_height - inset * 2.0).max(0.0),
            },
            Transform::at(inset, inset),
            Style {
                fill: None,
                stroke: Some(BOUNDARY_COLOR),
                stroke_width: 1.0,
                dash: Some(BOUNDARY_DASH),
            },
        )
        .inert()
    }
}
