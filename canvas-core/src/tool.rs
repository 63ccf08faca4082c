//! Tool-panel state: interaction mode, brush and text authoring settings.

use serde::{Deserialize, Serialize};

use crate::{Color, FontAttrs, FontStyle, FontWeight, ObjectKind, SceneObject};

/// Smallest brush width.
pub const MIN_BRUSH_WIDTH: u8 = 1;
/// Largest brush width.
pub const MAX_BRUSH_WIDTH: u8 = 20;

/// Interaction mode for pointer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    /// Select and drag objects.
    #[default]
    Select,
    /// Freehand drawing.
    Draw,
}

/// Brush used for new freehand strokes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BrushFields")]
pub struct BrushSettings {
    width: u8,
    /// Stroke color.
    pub color: Color,
}

impl BrushSettings {
    /// Create a brush; the width is clamped to 1-20.
    #[must_use]
    pub fn new(width: u8, color: Color) -> Self {
        Self {
            width: width.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH),
            color,
        }
    }

    /// Stroke width in pixels.
    #[must_use]
    pub const fn width(&self) -> u8 {
        self.width
    }

    /// Set the width, clamped to 1-20.
    pub fn set_width(&mut self, width: u8) {
        self.width = width.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH);
    }
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self::new(5, Color::BLACK)
    }
}

/// Unchecked wire form of [`BrushSettings`].
#[derive(Deserialize)]
struct BrushFields {
    width: u8,
    color: Color,
}

impl From<BrushFields> for BrushSettings {
    fn from(fields: BrushFields) -> Self {
        Self::new(fields.width, fields.color)
    }
}

/// Parameters for new text objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Font family.
    pub family: String,
    /// Font size in pixels.
    pub size: f32,
    /// Bold weight.
    pub bold: bool,
    /// Italic slant.
    pub italic: bool,
    /// Underline decoration.
    pub underline: bool,
    /// Fill color.
    pub color: Color,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            family: "Arial".to_string(),
            size: 20.0,
            bold: false,
            italic: false,
            underline: false,
            color: Color::BLACK,
        }
    }
}

impl TextStyle {
    /// Font attributes for the factory.
    #[must_use]
    pub fn to_font_attrs(&self) -> FontAttrs {
        FontAttrs {
            family: self.family.clone(),
            size: self.size,
            weight: if self.bold {
                FontWeight::Bold
            } else {
                FontWeight::Normal
            },
            style: if self.italic {
                FontStyle::Italic
            } else {
                FontStyle::Normal
            },
            underline: self.underline,
        }
    }
}

/// Everything the tool panel remembers between commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    /// Current pointer mode.
    pub mode: ToolMode,
    /// Brush for the next stroke.
    pub brush: BrushSettings,
    /// Text parameters for the next text object.
    pub text: TextStyle,
    /// Color for the next shape.
    pub shape_color: Color,
}

impl ToolState {
    /// Whether pointer input draws strokes.
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.mode == ToolMode::Draw
    }
}

/// Edits applied to the active object by the tool panel.
///
/// Fields left `None` are untouched. Font fields only affect text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylePatch {
    /// New fill color.
    pub fill: Option<Color>,
    /// New outline color.
    pub stroke: Option<Color>,
    /// New font size.
    pub font_size: Option<f32>,
    /// Bold on/off.
    pub bold: Option<bool>,
    /// Italic on/off.
    pub italic: Option<bool>,
    /// Underline on/off.
    pub underline: Option<bool>,
}

impl StylePatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to an object in place.
    pub fn apply(&self, object: &mut SceneObject) {
        if let Some(fill) = self.fill {
            object.style.fill = Some(fill);
        }
        if let Some(stroke) = self.stroke {
            object.style.stroke = Some(stroke);
        }
        if let ObjectKind::Text { font, .. } = &mut object.kind {
            if let Some(size) = self.font_size {
                font.size = size.max(1.0);
            }
            if let Some(bold) = self.bold {
                font.weight = if bold {
                    FontWeight::Bold
                } else {
                    FontWeight::Normal
                };
            }
            if let Some(italic) = self.italic {
                font.style = if italic {
                    FontStyle::Italic
                } else {
                    FontStyle::Normal
                };
            }
            if let Some(underline) = self.underline {
                font.underline = underline;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectFactory;

    #[test]
    fn test_brush_width_is_clamped() {
        let mut brush = BrushSettings::new(0, Color::BLACK);
        assert_eq!(brush.width(), MIN_BRUSH_WIDTH);
        brush.set_width(99);
        assert_eq!(brush.width(), MAX_BRUSH_WIDTH);
        brush.set_width(7);
        assert_eq!(brush.width(), 7);
    }

    #[test]
    fn test_text_style_to_font_attrs() {
        let style = TextStyle {
            bold: true,
            underline: true,
            size: 32.0,
            ..TextStyle::default()
        };
        let font = style.to_font_attrs();
        assert_eq!(font.weight, FontWeight::Bold);
        assert_eq!(font.style, FontStyle::Normal);
        assert!(font.underline);
        assert!((font.size - 32.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_style_patch_on_text() {
        let factory = ObjectFactory::default();
        let mut text = factory.create_text("Hi", &TextStyle::default());
        let patch = StylePatch {
            fill: Some(Color::rgb(255, 0, 0)),
            italic: Some(true),
            font_size: Some(48.0),
            ..StylePatch::default()
        };
        patch.apply(&mut text);

        assert_eq!(text.style.fill, Some(Color::rgb(255, 0, 0)));
        let ObjectKind::Text { font, .. } = &text.kind else {
            panic!("expected text");
        };
        assert_eq!(font.style, FontStyle::Italic);
        assert!((font.size - 48.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_tool_state_deserializes_partial() {
        let state: ToolState =
            serde_json::from_str(r##"{"mode":"draw","brush":{"width":3,"color":"#ff0000"},"text":{},"shape_color":"#000"}"##)
                .expect("deserialize");
        assert!(state.is_drawing());
        assert_eq!(state.brush.width(), 3);
        assert!(StylePatch::default().is_empty());
    }

    #[test]
    fn test_brush_width_clamped_when_deserialized() {
        let thin: BrushSettings =
            serde_json::from_str(r##"{"width":0,"color":"#000000"}"##).expect("deserialize");
        assert_eq!(thin.width(), MIN_BRUSH_WIDTH);
        let thick: BrushSettings =
            serde_json::from_str(r##"{"width":99,"color":"#000000"}"##).expect("deserialize");
        assert_eq!(thick.width(), MAX_BRUSH_WIDTH);

        let state: ToolState = serde_json::from_str(
            r##"{"mode":"draw","brush":{"width":250,"color":"#ff0000"},"text":{},"shape_color":"#000"}"##,
        )
        .expect("deserialize");
        assert_eq!(state.brush.width(), MAX_BRUSH_WIDTH);
    }
}
