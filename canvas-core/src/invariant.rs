//! Invariant Manager: keeps the scene structurally valid.
//!
//! A single pass of [`InvariantManager::reconcile`] establishes:
//!
//! - exactly one safety boundary, back-most, non-selectable and non-evented;
//! - at most one placeholder, and none once content exists;
//! - at most one imported image (the newest wins).
//!
//! Passes are idempotent: running one over a valid scene changes nothing,
//! including the scene version. Requests that arrive while a mutation or
//! gesture holds the latch are deferred and replayed once it settles.

use std::fmt;
use std::time::{Duration, Instant};

use crate::{ObjectFactory, RouterPhase, Scene};

/// Default inset of the safety boundary from each canvas edge.
pub const DEFAULT_SAFETY_INSET: f32 = 10.0;
/// Default interval of the periodic sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// What a reconciliation pass had to fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Boundaries created because none existed.
    pub boundaries_created: usize,
    /// Surplus boundaries removed.
    pub boundaries_removed: usize,
    /// Whether the boundary had to be moved to the back.
    pub boundary_restacked: bool,
    /// Whether the boundary's inert flags or selection had drifted.
    pub boundary_flags_restored: bool,
    /// Placeholders removed.
    pub placeholders_removed: usize,
    /// Older images removed.
    pub images_removed: usize,
}

impl ReconcileReport {
    /// Whether the scene was already valid.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "boundaries +{}/-{}, restacked={}, flags={}, placeholders -{}, images -{}",
            self.boundaries_created,
            self.boundaries_removed,
            self.boundary_restacked,
            self.boundary_flags_restored,
            self.placeholders_removed,
            self.images_removed
        )
    }
}

/// Enforces the scene's structural invariants.
#[derive(Debug, Clone)]
pub struct InvariantManager {
    safety_inset: f32,
    sweep_interval: Duration,
    next_sweep: Instant,
    deferred: bool,
}

impl InvariantManager {
    /// Create a manager whose first sweep is one interval after `now`.
    #[must_use]
    pub fn new(safety_inset: f32, sweep_interval: Duration, now: Instant) -> Self {
        Self {
            safety_inset,
            sweep_interval,
            next_sweep: now + sweep_interval,
            deferred: false,
        }
    }

    /// Boundary inset in pixels.
    #[must_use]
    pub const fn safety_inset(&self) -> f32 {
        self.safety_inset
    }

    /// Whether a deferred pass is waiting.
    #[must_use]
    pub const fn has_deferred(&self) -> bool {
        self.deferred
    }

    /// When the next periodic sweep is due.
    #[must_use]
    pub const fn next_sweep(&self) -> Instant {
        self.next_sweep
    }

    /// Reconcile now unless the latch is mid-mutation, in which case the
    /// pass is deferred.
    pub fn request(&mut self, scene: &mut Scene, phase: RouterPhase) -> Option<ReconcileReport> {
        if phase.defers_reconcile() {
            tracing::debug!("Deferring reconcile while latch is {:?}", phase);
            self.deferred = true;
            return None;
        }
        Some(self.reconcile(scene))
    }

    /// Run a pass deferred by [`Self::request`].
    pub fn run_deferred(&mut self, scene: &mut Scene) -> Option<ReconcileReport> {
        if !self.deferred {
            return None;
        }
        Some(self.reconcile(scene))
    }

    /// Run the periodic sweep if due. Skips (and reschedules) while the
    /// latch is mid-mutation.
    pub fn sweep_if_due(
        &mut self,
        scene: &mut Scene,
        phase: RouterPhase,
        now: Instant,
    ) -> Option<ReconcileReport> {
        if now < self.next_sweep {
            return None;
        }
        self.next_sweep = now + self.sweep_interval;
        self.request(scene, phase)
    }

    /// Bring the scene back to a valid state.
    pub fn reconcile(&mut self, scene: &mut Scene) -> ReconcileReport {
        self.deferred = false;
        let mut report = ReconcileReport::default();

        let boundaries = scene.ids_where(crate::SceneObject::is_boundary);
        let survivor = match boundaries.iter().min() {
            Some(&keep) => {
                for &id in boundaries.iter().filter(|&&id| id != keep) {
                    scene.remove_unchecked(id);
                    report.boundaries_removed += 1;
                }
                keep
            }
            None => {
                let boundary = ObjectFactory::create_safety_boundary(
                    scene.width(),
                    scene.height(),
                    self.safety_inset,
                );
                report.boundaries_created = 1;
                scene.add_at_back(boundary)
            }
        };

        report.boundary_restacked = scene.send_to_back(survivor);

        let drifted = scene
            .get(survivor)
            .is_some_and(|b| b.selectable || b.evented);
        if drifted {
            // The id was just read back from the scene.
            let _ = scene.update(survivor, |b| {
                b.selectable = false;
                b.evented = false;
            });
            report.boundary_flags_restored = true;
        }
        if scene.selected_id() == Some(survivor) {
            scene.deselect();
            report.boundary_flags_restored = true;
        }

        let placeholders = scene.ids_where(crate::SceneObject::is_placeholder);
        let keep_placeholder = if scene.content_count() > 0 {
            None
        } else {
            placeholders.iter().min().copied()
        };
        for &id in placeholders.iter().filter(|&&id| Some(id) != keep_placeholder) {
            scene.remove_unchecked(id);
            report.placeholders_removed += 1;
        }

        let images = scene.ids_where(crate::SceneObject::is_image);
        if let Some(&newest) = images.iter().max() {
            for &id in images.iter().filter(|&&id| id != newest) {
                scene.remove_unchecked(id);
                report.images_removed += 1;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Color, RasterHandle, ShapeKind};

    fn setup() -> (Scene, InvariantManager) {
        let scene = Scene::new(300.0, 300.0, Color::WHITE);
        let manager =
            InvariantManager::new(DEFAULT_SAFETY_INSET, DEFAULT_SWEEP_INTERVAL, Instant::now());
        (scene, manager)
    }

    #[test]
    fn test_creates_missing_boundary_at_back() {
        let (mut scene, mut manager) = setup();
        let factory = ObjectFactory::default();
        let circle = scene.add(factory.create_shape(ShapeKind::Circle, Color::BLACK));

        let report = manager.reconcile(&mut scene);
        assert_eq!(report.boundaries_created, 1);
        assert_eq!(scene.boundary_count(), 1);
        assert_eq!(scene.z_index(circle), Some(1));
        let back = scene.objects().next().expect("object");
        assert!(back.is_boundary());
    }

    #[test]
    fn test_keeps_first_boundary_and_restacks() {
        let (mut scene, mut manager) = setup();
        let first = scene.add(ObjectFactory::create_safety_boundary(300.0, 300.0, 10.0));
        let factory = ObjectFactory::default();
        scene.add(factory.create_shape(ShapeKind::Rectangle, Color::BLACK));
        scene.add(ObjectFactory::create_safety_boundary(300.0, 300.0, 10.0));
        scene.send_to_back(scene.ids()[1]);

        let report = manager.reconcile(&mut scene);
        assert_eq!(report.boundaries_removed, 1);
        assert!(report.boundary_restacked);
        assert_eq!(scene.boundary_count(), 1);
        assert_eq!(scene.ids()[0], first);
    }

    #[test]
    fn test_clean_pass_is_idempotent() {
        let (mut scene, mut manager) = setup();
        manager.reconcile(&mut scene);
        let version = scene.version();
        let ids = scene.ids().to_vec();

        let report = manager.reconcile(&mut scene);
        assert!(report.is_clean());
        assert_eq!(scene.version(), version);
        assert_eq!(scene.ids(), ids.as_slice());
    }

    #[test]
    fn test_restores_boundary_flags() {
        let (mut scene, mut manager) = setup();
        manager.reconcile(&mut scene);
        let boundary = scene.ids()[0];
        scene
            .update(boundary, |b| b.selectable = true)
            .expect("update");
        scene.select(boundary).expect("select");

        let report = manager.reconcile(&mut scene);
        assert!(report.boundary_flags_restored);
        assert!(scene.selected_id().is_none());
        assert!(!scene.get(boundary).expect("boundary").selectable);
    }

    #[test]
    fn test_placeholder_removed_once_content_exists() {
        let (mut scene, mut manager) = setup();
        let factory = ObjectFactory::default();
        scene.add(factory.create_placeholder(300.0, 300.0));
        scene.add(factory.create_placeholder(300.0, 300.0));
        manager.reconcile(&mut scene);
        assert_eq!(scene.placeholder_count(), 1);

        scene.add(factory.create_text("hi", &crate::TextStyle::default()));
        let report = manager.reconcile(&mut scene);
        assert_eq!(report.placeholders_removed, 1);
        assert_eq!(scene.placeholder_count(), 0);
    }

    #[test]
    fn test_newest_image_wins() {
        let (mut scene, mut manager) = setup();
        let factory = ObjectFactory::default();
        let raster = RasterHandle::new(10, 10, Vec::new());
        let center = crate::Point::new(150.0, 150.0);
        scene.add(factory.create_image(raster.clone(), center, 1.0));
        let newest = scene.add(factory.create_image(raster, center, 1.0));

        let report = manager.reconcile(&mut scene);
        assert_eq!(report.images_removed, 1);
        assert_eq!(scene.image_count(), 1);
        assert!(scene.contains(newest));
    }

    #[test]
    fn test_request_defers_while_mutating() {
        let (mut scene, mut manager) = setup();
        assert!(manager.request(&mut scene, RouterPhase::Mutating).is_none());
        assert!(manager.has_deferred());
        assert_eq!(scene.boundary_count(), 0);

        let report = manager.run_deferred(&mut scene).expect("deferred pass");
        assert_eq!(report.boundaries_created, 1);
        assert!(!manager.has_deferred());
        assert!(manager.run_deferred(&mut scene).is_none());
    }

    #[test]
    fn test_sweep_runs_on_interval() {
        let start = Instant::now();
        let mut scene = Scene::new(300.0, 300.0, Color::WHITE);
        let mut manager = InvariantManager::new(10.0, Duration::from_secs(2), start);
        assert!(manager
            .sweep_if_due(&mut scene, RouterPhase::Idle, start + Duration::from_secs(1))
            .is_none());
        let report = manager
            .sweep_if_due(&mut scene, RouterPhase::Idle, start + Duration::from_secs(2))
            .expect("sweep");
        assert_eq!(report.boundaries_created, 1);
        assert_eq!(manager.next_sweep(), start + Duration::from_secs(4));
    }
}
