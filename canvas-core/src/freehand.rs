//! Freehand Tool: turns a pointer trajectory into one stroke.
//!
//! The in-progress stroke lives here, outside the scene, and enters the scene
//! only when [`FreehandTool::finish`] hands it to the router. The brush is
//! captured at pointer-down, so later brush changes never touch it.

use crate::{BrushSettings, ObjectFactory, Point, SceneObject};

#[derive(Debug, Clone)]
struct ActiveStroke {
    points: Vec<Point>,
    brush: BrushSettings,
}

/// Accumulates pointer samples into a single stroke.
#[derive(Debug, Clone, Default)]
pub struct FreehandTool {
    active: Option<ActiveStroke>,
}

impl FreehandTool {
    /// Create an idle tool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stroke is being drawn.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Points captured so far.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        self.active.as_ref().map_or(&[], |s| s.points.as_slice())
    }

    /// Start a stroke seeded with `point`, capturing the brush.
    ///
    /// A stroke already in progress is discarded.
    pub fn begin(&mut self, point: Point, brush: &BrushSettings) {
        if self.active.is_some() {
            tracing::debug!("Discarding unfinished stroke on new pointer-down");
        }
        self.active = Some(ActiveStroke {
            points: vec![point],
            brush: *brush,
        });
    }

    /// Append a sample. Returns `false` when idle or the point repeats the
    /// last one.
    pub fn extend(&mut self, point: Point) -> bool {
        let Some(stroke) = self.active.as_mut() else {
            return false;
        };
        if stroke.points.last() == Some(&point) {
            return false;
        }
        stroke.points.push(point);
        true
    }

    /// Finish the stroke and build its scene object.
    pub fn finish(&mut self, factory: &ObjectFactory) -> Option<SceneObject> {
        let stroke = self.active.take()?;
        Some(factory.create_stroke(stroke.points, &stroke.brush))
    }

    /// Abandon the stroke.
    pub fn cancel(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Color, ObjectKind};

    #[test]
    fn test_one_stroke_per_gesture() {
        let factory = ObjectFactory::default();
        let mut tool = FreehandTool::new();
        tool.begin(Point::new(10.0, 10.0), &BrushSettings::default());
        for i in 1..=10u8 {
            let p = 10.0 + f32::from(i) * 4.0;
            assert!(tool.extend(Point::new(p, p)));
        }
        let stroke = tool.finish(&factory).expect("stroke");
        let ObjectKind::Stroke { points } = &stroke.kind else {
            panic!("expected stroke");
        };
        assert_eq!(points.len(), 11);
        assert_eq!(points.last(), Some(&Point::new(50.0, 50.0)));
        assert!(!tool.is_active());
    }

    #[test]
    fn test_duplicate_points_dropped() {
        let mut tool = FreehandTool::new();
        tool.begin(Point::new(1.0, 1.0), &BrushSettings::default());
        assert!(!tool.extend(Point::new(1.0, 1.0)));
        assert!(tool.extend(Point::new(2.0, 1.0)));
        assert_eq!(tool.points().len(), 2);
    }

    #[test]
    fn test_brush_is_fixed_at_start() {
        let factory = ObjectFactory::default();
        let mut brush = BrushSettings::new(3, Color::rgb(255, 0, 0));
        let mut tool = FreehandTool::new();
        tool.begin(Point::new(0.0, 0.0), &brush);
        brush.set_width(20);
        brush.color = Color::BLACK;
        tool.extend(Point::new(5.0, 5.0));

        let stroke = tool.finish(&factory).expect("stroke");
        assert!((stroke.style.stroke_width - 3.0).abs() < f32::EPSILON);
        assert_eq!(stroke.style.stroke, Some(Color::rgb(255, 0, 0)));
    }

    #[test]
    fn test_extend_without_begin_is_ignored() {
        let mut tool = FreehandTool::new();
        assert!(!tool.extend(Point::new(1.0, 1.0)));
        assert!(tool.finish(&ObjectFactory::default()).is_none());
    }
}
