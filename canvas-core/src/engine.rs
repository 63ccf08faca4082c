//! The canvas engine: scene, factory, invariants, latch, debouncer and tools
//! composed behind tool-panel commands and pointer input.
//!
//! The engine never reads the clock itself; every entry point takes `now`.
//! Rendering is left to the caller: [`CanvasEngine::poll`] reports when an
//! export is due, the caller renders [`CanvasEngine::scene`], then calls
//! [`CanvasEngine::finish_export`].

use std::time::{Duration, Instant};

use crate::debounce::DEFAULT_DEBOUNCE;
use crate::invariant::{DEFAULT_SAFETY_INSET, DEFAULT_SWEEP_INTERVAL};
use crate::router::DEFAULT_WATCHDOG;
use crate::{
    Color, Debouncer, FreehandTool, InvariantManager, Modification, MutationIntent,
    MutationOutcome, MutationRouter, ObjectFactory, ObjectId, ObjectKind, Point, PointerEvent,
    PointerPhase, RasterHandle, Rejection, RouterPhase, Scene, ShapeKind, StylePatch, TextStyle,
    ToolMode, ToolState,
};

/// Engine settings fixed at mount.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Canvas width in pixels.
    pub width: f32,
    /// Canvas height in pixels.
    pub height: f32,
    /// Background fill.
    pub background: Color,
    /// Safety boundary inset.
    pub safety_inset: f32,
    /// Debounce window.
    pub debounce: Duration,
    /// Periodic invariant sweep interval.
    pub sweep_interval: Duration,
    /// Latch watchdog, `None` to disable.
    pub watchdog: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 300.0,
            height: 300.0,
            background: Color::rgb(0xf0, 0xf0, 0xf0),
            safety_inset: DEFAULT_SAFETY_INSET,
            debounce: DEFAULT_DEBOUNCE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            watchdog: Some(DEFAULT_WATCHDOG),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    id: ObjectId,
    last: Point,
    moved: bool,
}

/// Uniform scale that fits a `w` x `h` raster inside the canvas minus
/// `margin` without distortion.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fit_scale(canvas_width: f32, canvas_height: f32, margin: f32, w: u32, h: u32) -> f32 {
    if w == 0 || h == 0 {
        return 1.0;
    }
    let sx = (canvas_width - margin).max(1.0) / w as f32;
    let sy = (canvas_height - margin).max(1.0) / h as f32;
    sx.min(sy)
}

/// The interactive design surface.
#[derive(Debug)]
pub struct CanvasEngine {
    scene: Scene,
    factory: ObjectFactory,
    invariants: InvariantManager,
    router: MutationRouter,
    debouncer: Debouncer,
    freehand: FreehandTool,
    tools: ToolState,
    drag: Option<Drag>,
}

impl CanvasEngine {
    /// Create the scene and install the safety boundary.
    #[must_use]
    pub fn new(config: &EngineConfig, now: Instant) -> Self {
        let mut scene = Scene::new(config.width, config.height, config.background);
        let mut invariants =
            InvariantManager::new(config.safety_inset, config.sweep_interval, now);
        let report = invariants.reconcile(&mut scene);
        tracing::debug!(
            "Scene {}x{} created ({} boundary)",
            config.width,
            config.height,
            report.boundaries_created
        );
        Self {
            scene,
            factory: ObjectFactory::default(),
            invariants,
            router: MutationRouter::new(config.watchdog, now),
            debouncer: Debouncer::new(config.debounce),
            freehand: FreehandTool::new(),
            tools: ToolState::default(),
            drag: None,
        }
    }

    /// Show the empty-design hint. Only used while mounting; schedules no
    /// export.
    pub fn install_placeholder(&mut self) {
        if self.scene.placeholder_count() > 0 || self.scene.content_count() > 0 {
            return;
        }
        let placeholder = self
            .factory
            .create_placeholder(self.scene.width(), self.scene.height());
        self.scene.add(placeholder);
    }

    /// The scene, for rendering and inspection.
    #[must_use]
    pub const fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Tool-panel state.
    #[must_use]
    pub const fn tools(&self) -> &ToolState {
        &self.tools
    }

    /// Current latch state.
    #[must_use]
    pub const fn phase(&self) -> RouterPhase {
        self.router.phase()
    }

    /// Whether the latch is free.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.router.is_idle()
    }

    /// Whether a debounced export is scheduled.
    #[must_use]
    pub const fn export_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    fn submit(&mut self, intent: MutationIntent, now: Instant) -> MutationOutcome {
        self.router.submit(
            &mut self.scene,
            &mut self.invariants,
            &mut self.debouncer,
            intent,
            now,
        )
    }

    /// Add a text object at the text anchor and select it.
    pub fn add_text(&mut self, text: &str, style: &TextStyle, now: Instant) -> MutationOutcome {
        if text.trim().is_empty() {
            return MutationOutcome::Rejected(Rejection::EmptyText);
        }
        self.tools.text = style.clone();
        let object = self.factory.create_text(text, style);
        self.submit(MutationIntent::Add(object), now)
    }

    /// Add a shape at the shape anchor and select it.
    pub fn add_shape(&mut self, kind: ShapeKind, color: Color, now: Instant) -> MutationOutcome {
        self.tools.shape_color = color;
        let object = self.factory.create_shape(kind, color);
        self.submit(MutationIntent::Add(object), now)
    }

    /// Remove the active object.
    pub fn delete_selected(&mut self, now: Instant) -> MutationOutcome {
        let Some(id) = self.scene.selected_id() else {
            return MutationOutcome::Rejected(Rejection::NothingSelected);
        };
        self.submit(MutationIntent::Remove(id), now)
    }

    /// Restyle the active object.
    pub fn update_selected(&mut self, patch: StylePatch, now: Instant) -> MutationOutcome {
        let Some(id) = self.scene.selected_id() else {
            return MutationOutcome::Rejected(Rejection::NothingSelected);
        };
        self.submit(MutationIntent::Modify(id, Modification::Restyle(patch)), now)
    }

    /// Remove every content object, keeping the boundary and showing the
    /// placeholder again.
    pub fn clear(&mut self, now: Instant) -> MutationOutcome {
        let placeholder = self
            .factory
            .create_placeholder(self.scene.width(), self.scene.height());
        self.submit(MutationIntent::Clear { placeholder }, now)
    }

    /// Make an object the active selection.
    pub fn select(&mut self, id: ObjectId) -> MutationOutcome {
        if self.router.phase() == RouterPhase::Gesture {
            return MutationOutcome::Rejected(Rejection::LatchHeld);
        }
        let Some(object) = self.scene.get(id) else {
            return MutationOutcome::Rejected(Rejection::ObjectMissing);
        };
        if !object.selectable {
            return MutationOutcome::Rejected(Rejection::NotSelectable);
        }
        if self.scene.select(id).is_err() {
            return MutationOutcome::Rejected(Rejection::NotSelectable);
        }
        self.after_selection_change();
        MutationOutcome::Committed(id)
    }

    fn after_selection_change(&mut self) {
        if let Some(report) = self.invariants.request(&mut self.scene, self.router.phase()) {
            if !report.is_clean() {
                tracing::warn!("Selection disturbed invariants: {}", report);
            }
        }
    }

    /// Switch between select and draw mode. Leaving a mode finishes any
    /// gesture in progress; entering draw mode clears the selection.
    pub fn set_draw_mode(&mut self, enabled: bool, now: Instant) {
        let mode = if enabled {
            ToolMode::Draw
        } else {
            ToolMode::Select
        };
        if self.tools.mode == mode {
            return;
        }
        let _ = self.finish_gesture(now);
        self.tools.mode = mode;
        if enabled && self.scene.selected_id().is_some() {
            self.scene.deselect();
            self.after_selection_change();
        }
        tracing::debug!("Tool mode: {:?}", mode);
    }

    /// Set the brush width for future strokes (clamped to 1-20).
    pub fn set_brush_size(&mut self, width: u8) {
        self.tools.brush.set_width(width);
    }

    /// Set the brush color for future strokes.
    pub fn set_brush_color(&mut self, color: Color) {
        self.tools.brush.color = color;
    }

    /// Fit a decoded raster inside the canvas minus `margin`, center it, and
    /// make it the main image.
    pub fn place_image(
        &mut self,
        raster: RasterHandle,
        margin: f32,
        now: Instant,
    ) -> MutationOutcome {
        let (w, h) = (self.scene.width(), self.scene.height());
        let scale = fit_scale(w, h, margin, raster.width(), raster.height());
        tracing::debug!(
            "Placing {}x{} image at scale {:.3}",
            raster.width(),
            raster.height(),
            scale
        );
        let object = self
            .factory
            .create_image(raster, Point::new(w / 2.0, h / 2.0), scale);
        self.submit(MutationIntent::Add(object), now)
    }

    /// Feed a pointer event.
    ///
    /// Returns `Some` when the event ends a gesture that committed a change
    /// or when a gesture could not start; intermediate events return `None`.
    pub fn pointer(&mut self, event: PointerEvent, now: Instant) -> Option<MutationOutcome> {
        let point = event.point();
        match (self.tools.mode, event.phase) {
            (ToolMode::Draw, PointerPhase::Down) => {
                if let Err(rejection) = self.router.begin_gesture(now) {
                    return Some(MutationOutcome::Rejected(rejection));
                }
                self.freehand.begin(point, &self.tools.brush);
                None
            }
            (ToolMode::Draw, PointerPhase::Move) => {
                if self.freehand.extend(point) {
                    self.router.touch(now);
                }
                None
            }
            (ToolMode::Draw, PointerPhase::Up) => {
                if !self.freehand.is_active() {
                    return None;
                }
                self.freehand.extend(point);
                self.finish_gesture(now)
            }
            (ToolMode::Select, PointerPhase::Down) => {
                let Some(id) = self.scene.object_at(event.x, event.y) else {
                    if self.router.phase() != RouterPhase::Gesture
                        && self.scene.selected_id().is_some()
                    {
                        self.scene.deselect();
                        self.after_selection_change();
                    }
                    return None;
                };
                if let Err(rejection) = self.router.begin_gesture(now) {
                    return Some(MutationOutcome::Rejected(rejection));
                }
                // Hit-tested objects are evented, and evented objects here are selectable.
                let _ = self.scene.select(id);
                self.drag = Some(Drag {
                    id,
                    last: point,
                    moved: false,
                });
                None
            }
            (ToolMode::Select, PointerPhase::Move) => {
                let drag = self.drag.as_mut()?;
                let (dx, dy) = (point.x - drag.last.x, point.y - drag.last.y);
                if dx.abs() < f32::EPSILON && dy.abs() < f32::EPSILON {
                    return None;
                }
                drag.last = point;
                let outcome = self.router.gesture_translate(
                    &mut self.scene,
                    &mut self.debouncer,
                    drag.id,
                    dx,
                    dy,
                    now,
                );
                if outcome.is_committed() {
                    drag.moved = true;
                }
                None
            }
            (ToolMode::Select, PointerPhase::Up) => self.finish_gesture(now),
        }
    }

    /// End whatever gesture holds the latch, as if the pointer were released.
    fn finish_gesture(&mut self, now: Instant) -> Option<MutationOutcome> {
        if self.freehand.is_active() {
            let commit = self
                .freehand
                .finish(&self.factory)
                .filter(|stroke| match &stroke.kind {
                    ObjectKind::Stroke { points } => points.len() >= 2,
                    _ => false,
                })
                .map(MutationIntent::Add);
            return self.router.end_gesture(
                &mut self.scene,
                &mut self.invariants,
                &mut self.debouncer,
                commit,
                false,
                now,
            );
        }
        if let Some(drag) = self.drag.take() {
            let _ = self.router.end_gesture(
                &mut self.scene,
                &mut self.invariants,
                &mut self.debouncer,
                None,
                drag.moved,
                now,
            );
            return drag.moved.then_some(MutationOutcome::Committed(drag.id));
        }
        None
    }

    /// Advance timers. Returns `true` when an export is due; the latch is
    /// then in `Exporting` until [`Self::finish_export`].
    pub fn poll(&mut self, now: Instant) -> bool {
        self.check_watchdog(now);

        let phase = self.router.phase();
        if !phase.defers_reconcile() {
            if let Some(report) = self.invariants.run_deferred(&mut self.scene) {
                if !report.is_clean() {
                    tracing::warn!("Deferred reconcile corrected drift: {}", report);
                }
            }
        }
        if let Some(report) = self.invariants.sweep_if_due(&mut self.scene, phase, now) {
            if !report.is_clean() {
                tracing::warn!("Periodic sweep corrected drift: {}", report);
            }
        }

        if !matches!(phase, RouterPhase::Idle | RouterPhase::ExportPending) {
            return false;
        }
        match self.debouncer.take_if_due(now) {
            Some(coalesced) => {
                tracing::debug!("Export due, coalesced {} changes", coalesced);
                self.router.transition(RouterPhase::Exporting, now).is_ok()
            }
            None => false,
        }
    }

    fn check_watchdog(&mut self, now: Instant) {
        if !self.router.watchdog_expired(now) {
            return;
        }
        match self.router.phase() {
            RouterPhase::ExportPending if self.debouncer.is_pending() => {}
            _ => self.router.force_release(now),
        }
    }

    /// Take the latch for an explicit save. Returns `true` when the caller
    /// should render now; refused on an empty design or while a mutation or
    /// gesture is in flight.
    pub fn request_export(&mut self, now: Instant) -> bool {
        if self.scene.content_count() == 0 {
            return false;
        }
        if !matches!(
            self.router.phase(),
            RouterPhase::Idle | RouterPhase::ExportPending
        ) {
            return false;
        }
        if self.router.transition(RouterPhase::Exporting, now).is_err() {
            return false;
        }
        self.debouncer.cancel();
        true
    }

    /// Release the latch after rendering.
    pub fn finish_export(&mut self, now: Instant) {
        if self.router.phase() == RouterPhase::Exporting {
            if self.router.transition(RouterPhase::Idle, now).is_err() {
                self.router.force_release(now);
            }
        }
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let export = if self.router.phase() == RouterPhase::Gesture {
            None
        } else {
            self.debouncer.deadline()
        };
        [
            export,
            Some(self.invariants.next_sweep()),
            self.router.watchdog_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Remove every object and cancel all pending work.
    pub fn teardown(&mut self, now: Instant) -> usize {
        self.freehand.cancel();
        self.drag = None;
        self.debouncer.cancel();
        self.router.force_release(now);
        self.scene.clear()
    }
}
