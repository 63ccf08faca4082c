//! Mutation Router: the sole entry point for structural scene changes.
//!
//! Every change passes through a reentrancy latch modelled as an explicit
//! state machine ([`RouterPhase`]). A committed mutation walks
//! `Mutating -> Reconciling -> ExportPending`, and the latch stays held until
//! the debounced export has run. Requests that arrive while it is held are
//! rejected with [`Rejection::LatchHeld`] and leave the scene untouched.
//!
//! Pointer gestures hold the latch in `Gesture` from pointer-down to
//! pointer-up. A gesture may start while an export is pending; it simply
//! extends the burst.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{
    CanvasError, CanvasResult, Debouncer, InvariantManager, ObjectId, Scene, SceneObject,
    StylePatch,
};

/// Default time a latch may be held before the watchdog releases it.
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(5);

/// State of the reentrancy latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterPhase {
    /// Latch free; requests are accepted.
    Idle,
    /// A discrete mutation is being applied.
    Mutating,
    /// A pointer gesture (stroke or drag) is in progress.
    Gesture,
    /// Invariants are being restored after a mutation.
    Reconciling,
    /// Waiting for the debounced export.
    ExportPending,
    /// The export is being rendered.
    Exporting,
}

impl RouterPhase {
    /// Whether the state machine allows `self -> next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use RouterPhase::{ExportPending, Exporting, Gesture, Idle, Mutating, Reconciling};
        matches!(
            (self, next),
            (Idle, Mutating | Gesture | Exporting)
                | (Mutating, Reconciling | Idle)
                | (Gesture, Reconciling)
                | (Reconciling, ExportPending | Idle)
                | (ExportPending, Gesture | Exporting)
                | (Exporting, Idle)
        )
    }

    /// Whether invariant passes must wait for this phase to end.
    #[must_use]
    pub const fn defers_reconcile(self) -> bool {
        matches!(self, Self::Mutating | Self::Gesture)
    }

    /// Whether a gesture may start from this phase.
    #[must_use]
    pub const fn allows_gesture(self) -> bool {
        matches!(self, Self::Idle | Self::ExportPending)
    }
}

/// Why a request was refused. Refusals are silent to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Another mutation or its pending export holds the latch.
    LatchHeld,
    /// The safety boundary cannot be removed or edited.
    ProtectedObject,
    /// The command needs an active object.
    NothingSelected,
    /// The referenced object no longer exists.
    ObjectMissing,
    /// The object cannot be selected.
    NotSelectable,
    /// Text content was empty.
    EmptyText,
    /// The host has been torn down.
    SurfaceInvalid,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::LatchHeld => "mutation latch held",
            Self::ProtectedObject => "object is protected",
            Self::NothingSelected => "nothing selected",
            Self::ObjectMissing => "object missing",
            Self::NotSelectable => "object not selectable",
            Self::EmptyText => "empty text",
            Self::SurfaceInvalid => "surface torn down",
        };
        f.write_str(reason)
    }
}

/// Result of a routed request.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The change was applied; carries the affected object.
    Committed(ObjectId),
    /// The change was refused and the scene is unchanged.
    Rejected(Rejection),
}

impl MutationOutcome {
    /// Whether the change was applied.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// The affected object, if committed.
    #[must_use]
    pub const fn object(&self) -> Option<ObjectId> {
        match self {
            Self::Committed(id) => Some(*id),
            Self::Rejected(_) => None,
        }
    }

    /// The refusal reason, if rejected.
    #[must_use]
    pub const fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Committed(_) => None,
            Self::Rejected(r) => Some(*r),
        }
    }
}

/// An in-place edit of an existing object.
#[derive(Debug, Clone, PartialEq)]
pub enum Modification {
    /// Apply tool-panel style edits.
    Restyle(StylePatch),
    /// Move by a delta.
    Translate {
        /// Horizontal delta.
        dx: f32,
        /// Vertical delta.
        dy: f32,
    },
}

/// A structural change request.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationIntent {
    /// Add a new object and select it. A new image replaces the previous one.
    Add(SceneObject),
    /// Edit an existing object.
    Modify(ObjectId, Modification),
    /// Remove an object.
    Remove(ObjectId),
    /// Remove every content object and show the given placeholder.
    Clear {
        /// Placeholder to install.
        placeholder: SceneObject,
    },
}

impl MutationIntent {
    fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Modify(..) => "modify",
            Self::Remove(_) => "remove",
            Self::Clear { .. } => "clear",
        }
    }
}

/// Holds the latch and applies mutations.
#[derive(Debug, Clone)]
pub struct MutationRouter {
    phase: RouterPhase,
    entered_at: Instant,
    watchdog: Option<Duration>,
}

impl MutationRouter {
    /// Create an idle router. `watchdog` of `None` disables latch recovery.
    #[must_use]
    pub const fn new(watchdog: Option<Duration>, now: Instant) -> Self {
        Self {
            phase: RouterPhase::Idle,
            entered_at: now,
            watchdog,
        }
    }

    /// Current latch state.
    #[must_use]
    pub const fn phase(&self) -> RouterPhase {
        self.phase
    }

    /// Whether the latch is free.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase == RouterPhase::Idle
    }

    /// Move the latch to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidTransition`] if the state machine does
    /// not allow the move; the phase is left unchanged.
    pub fn transition(&mut self, to: RouterPhase, now: Instant) -> CanvasResult<()> {
        if !self.phase.can_transition_to(to) {
            return Err(CanvasError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::trace!("Latch {:?} -> {:?}", self.phase, to);
        self.phase = to;
        self.entered_at = now;
        Ok(())
    }

    /// Record activity in the current phase, holding off the watchdog.
    pub fn touch(&mut self, now: Instant) {
        self.entered_at = now;
    }

    /// When the watchdog would release the current hold. Gestures end on
    /// pointer-up, a mode switch or teardown, so they are never timed out.
    #[must_use]
    pub fn watchdog_deadline(&self) -> Option<Instant> {
        if matches!(self.phase, RouterPhase::Idle | RouterPhase::Gesture) {
            return None;
        }
        self.watchdog.map(|limit| self.entered_at + limit)
    }

    /// Whether the latch has been held past the watchdog limit.
    #[must_use]
    pub fn watchdog_expired(&self, now: Instant) -> bool {
        self.watchdog_deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Drop the latch unconditionally (watchdog, teardown).
    pub fn force_release(&mut self, now: Instant) {
        if !self.is_idle() {
            tracing::warn!("Force-releasing mutation latch held in {:?}", self.phase);
        }
        self.phase = RouterPhase::Idle;
        self.entered_at = now;
    }

    /// Apply a discrete mutation and run the post-mutation pipeline.
    ///
    /// Refused unless the latch is idle.
    pub fn submit(
        &mut self,
        scene: &mut Scene,
        invariants: &mut InvariantManager,
        debouncer: &mut Debouncer,
        intent: MutationIntent,
        now: Instant,
    ) -> MutationOutcome {
        if let Err(err) = self.transition(RouterPhase::Mutating, now) {
            tracing::debug!("Ignoring {} request: {}", intent.name(), err);
            return MutationOutcome::Rejected(Rejection::LatchHeld);
        }

        match Self::apply(scene, intent) {
            Ok(id) => {
                self.settle(scene, invariants, debouncer, true, now);
                MutationOutcome::Committed(id)
            }
            Err(rejection) => {
                tracing::debug!("Mutation rejected: {}", rejection);
                if self.transition(RouterPhase::Idle, now).is_err() {
                    self.force_release(now);
                }
                MutationOutcome::Rejected(rejection)
            }
        }
    }

    /// Move an object while a drag gesture holds the latch.
    ///
    /// The change goes through the same checks as a discrete modification and
    /// schedules an export; reconciliation waits for the gesture to end.
    /// Refused with [`Rejection::LatchHeld`] outside a gesture.
    pub fn gesture_translate(
        &mut self,
        scene: &mut Scene,
        debouncer: &mut Debouncer,
        id: ObjectId,
        dx: f32,
        dy: f32,
        now: Instant,
    ) -> MutationOutcome {
        if self.phase != RouterPhase::Gesture {
            tracing::debug!("Ignoring translate while latch is {:?}", self.phase);
            return MutationOutcome::Rejected(Rejection::LatchHeld);
        }
        let intent = MutationIntent::Modify(id, Modification::Translate { dx, dy });
        match Self::apply(scene, intent) {
            Ok(id) => {
                debouncer.notify(now);
                self.touch(now);
                MutationOutcome::Committed(id)
            }
            Err(rejection) => {
                tracing::debug!("Translate rejected: {}", rejection);
                MutationOutcome::Rejected(rejection)
            }
        }
    }

    /// Take the latch for a pointer gesture.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::LatchHeld`] unless the latch is idle or only
    /// waiting on an export.
    pub fn begin_gesture(&mut self, now: Instant) -> Result<(), Rejection> {
        if !self.phase.allows_gesture() {
            tracing::debug!("Gesture refused while latch is {:?}", self.phase);
            return Err(Rejection::LatchHeld);
        }
        self.transition(RouterPhase::Gesture, now)
            .map_err(|_| Rejection::LatchHeld)
    }

    /// Finish a gesture, optionally committing one more change, and run the
    /// post-mutation pipeline. `dirty` reports whether the gesture already
    /// changed the scene.
    pub fn end_gesture(
        &mut self,
        scene: &mut Scene,
        invariants: &mut InvariantManager,
        debouncer: &mut Debouncer,
        commit: Option<MutationIntent>,
        dirty: bool,
        now: Instant,
    ) -> Option<MutationOutcome> {
        if self.phase != RouterPhase::Gesture {
            return None;
        }
        let outcome = commit.map(|intent| match Self::apply(scene, intent) {
            Ok(id) => MutationOutcome::Committed(id),
            Err(rejection) => MutationOutcome::Rejected(rejection),
        });
        let changed = dirty || outcome.is_some_and(|o| o.is_committed());
        self.settle(scene, invariants, debouncer, changed, now);
        outcome
    }

    /// Reconcile, schedule the export and move to `ExportPending` (or back
    /// to `Idle` when nothing is waiting).
    fn settle(
        &mut self,
        scene: &mut Scene,
        invariants: &mut InvariantManager,
        debouncer: &mut Debouncer,
        changed: bool,
        now: Instant,
    ) {
        if self.transition(RouterPhase::Reconciling, now).is_err() {
            self.force_release(now);
            return;
        }
        let report = invariants.reconcile(scene);
        if !report.is_clean() {
            tracing::warn!("Reconciliation corrected drift: {}", report);
        }
        if changed {
            debouncer.notify(now);
        }
        let next = if debouncer.is_pending() {
            RouterPhase::ExportPending
        } else {
            RouterPhase::Idle
        };
        if self.transition(next, now).is_err() {
            self.force_release(now);
        }
    }

    fn apply(scene: &mut Scene, intent: MutationIntent) -> Result<ObjectId, Rejection> {
        match intent {
            MutationIntent::Add(object) => {
                if object.is_protected() {
                    return Err(Rejection::ProtectedObject);
                }
                if object.is_image() {
                    for id in scene.ids_where(SceneObject::is_image) {
                        scene.remove_unchecked(id);
                    }
                }
                if object.kind.is_content() {
                    for id in scene.ids_where(SceneObject::is_placeholder) {
                        scene.remove_unchecked(id);
                    }
                }
                let selectable = object.selectable;
                tracing::debug!("Adding {}", object.tag());
                let id = scene.add(object);
                if selectable {
                    // Just added, so it exists and is selectable.
                    let _ = scene.select(id);
                }
                Ok(id)
            }
            MutationIntent::Modify(id, modification) => {
                let object = scene.get(id).ok_or(Rejection::ObjectMissing)?;
                if object.is_protected() {
                    return Err(Rejection::ProtectedObject);
                }
                scene
                    .update(id, |object| match &modification {
                        Modification::Restyle(patch) => patch.apply(object),
                        Modification::Translate { dx, dy } => object.translate(*dx, *dy),
                    })
                    .map_err(|_| Rejection::ObjectMissing)?;
                Ok(id)
            }
            MutationIntent::Remove(id) => match scene.remove(id) {
                Ok(object) => {
                    tracing::debug!("Removed {}", object.tag());
                    Ok(id)
                }
                Err(CanvasError::ProtectedObject(_)) => Err(Rejection::ProtectedObject),
                Err(_) => Err(Rejection::ObjectMissing),
            },
            MutationIntent::Clear { placeholder } => {
                let doomed = scene.ids_where(|o| o.kind.is_content() || o.is_placeholder());
                tracing::debug!("Clearing {} objects", doomed.len());
                for id in doomed {
                    scene.remove_unchecked(id);
                }
                Ok(scene.add(placeholder))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Color, ObjectFactory, ShapeKind, TextStyle};

    struct Rig {
        scene: Scene,
        invariants: InvariantManager,
        debouncer: Debouncer,
        router: MutationRouter,
        factory: ObjectFactory,
        now: Instant,
    }

    impl Rig {
        fn new() -> Self {
            let now = Instant::now();
            let mut scene = Scene::new(300.0, 300.0, Color::WHITE);
            let mut invariants = InvariantManager::new(10.0, Duration::from_secs(2), now);
            invariants.reconcile(&mut scene);
            Self {
                scene,
                invariants,
                debouncer: Debouncer::new(Duration::from_millis(150)),
                router: MutationRouter::new(Some(DEFAULT_WATCHDOG), now),
                factory: ObjectFactory::default(),
                now,
            }
        }

        fn submit(&mut self, intent: MutationIntent) -> MutationOutcome {
            self.router.submit(
                &mut self.scene,
                &mut self.invariants,
                &mut self.debouncer,
                intent,
                self.now,
            )
        }

        fn settle_export(&mut self) {
            self.now += Duration::from_millis(200);
            assert!(self.debouncer.take_if_due(self.now).is_some());
            self.router
                .transition(RouterPhase::Exporting, self.now)
                .expect("exporting");
            self.router
                .transition(RouterPhase::Idle, self.now)
                .expect("idle");
        }
    }

    #[test]
    fn test_transition_table() {
        use RouterPhase::{ExportPending, Exporting, Gesture, Idle, Mutating, Reconciling};
        let all = [Idle, Mutating, Gesture, Reconciling, ExportPending, Exporting];
        let allowed = [
            (Idle, Mutating),
            (Idle, Gesture),
            (Idle, Exporting),
            (Mutating, Reconciling),
            (Mutating, Idle),
            (Gesture, Reconciling),
            (Reconciling, ExportPending),
            (Reconciling, Idle),
            (ExportPending, Gesture),
            (ExportPending, Exporting),
            (Exporting, Idle),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn test_rejection_reasons() {
        let all = [
            (Rejection::LatchHeld, "latch_held"),
            (Rejection::ProtectedObject, "protected_object"),
            (Rejection::NothingSelected, "nothing_selected"),
            (Rejection::ObjectMissing, "object_missing"),
            (Rejection::NotSelectable, "not_selectable"),
            (Rejection::EmptyText, "empty_text"),
            (Rejection::SurfaceInvalid, "surface_invalid"),
        ];
        for (rejection, name) in all {
            let json = serde_json::to_string(&rejection).expect("serialize");
            assert_eq!(json, format!("\"{name}\""));
            assert!(!rejection.to_string().is_empty());
        }
    }

    #[test]
    fn test_invalid_transition_is_refused() {
        let mut router = MutationRouter::new(None, Instant::now());
        let err = router
            .transition(RouterPhase::Reconciling, Instant::now())
            .expect_err("idle cannot reconcile");
        assert!(matches!(err, CanvasError::InvalidTransition { .. }));
        assert_eq!(router.phase(), RouterPhase::Idle);
    }

    #[test]
    fn test_commit_holds_latch_until_export() {
        let mut rig = Rig::new();
        let shape = rig.factory.create_shape(ShapeKind::Circle, Color::BLACK);
        let outcome = rig.submit(MutationIntent::Add(shape));
        assert!(outcome.is_committed());
        assert_eq!(rig.router.phase(), RouterPhase::ExportPending);
        assert_eq!(rig.scene.selected_id(), outcome.object());

        let count = rig.scene.len();
        let second = rig.factory.create_shape(ShapeKind::Rectangle, Color::BLACK);
        assert_eq!(
            rig.submit(MutationIntent::Add(second)),
            MutationOutcome::Rejected(Rejection::LatchHeld)
        );
        assert_eq!(rig.scene.len(), count);

        rig.settle_export();
        assert!(rig.router.is_idle());
    }

    #[test]
    fn test_boundary_removal_rejected() {
        let mut rig = Rig::new();
        let boundary = rig.scene.ids()[0];
        assert_eq!(
            rig.submit(MutationIntent::Remove(boundary)),
            MutationOutcome::Rejected(Rejection::ProtectedObject)
        );
        assert!(rig.router.is_idle());
        assert_eq!(rig.scene.boundary_count(), 1);
    }

    #[test]
    fn test_add_boundary_rejected() {
        let mut rig = Rig::new();
        let extra = ObjectFactory::create_safety_boundary(300.0, 300.0, 10.0);
        assert_eq!(
            rig.submit(MutationIntent::Add(extra)),
            MutationOutcome::Rejected(Rejection::ProtectedObject)
        );
        assert_eq!(rig.scene.boundary_count(), 1);
    }

    #[test]
    fn test_content_add_removes_placeholder() {
        let mut rig = Rig::new();
        rig.scene.add(rig.factory.create_placeholder(300.0, 300.0));
        let text = rig.factory.create_text("Hello", &TextStyle::default());
        let _ = rig.submit(MutationIntent::Add(text));
        assert_eq!(rig.scene.placeholder_count(), 0);
        assert_eq!(rig.scene.content_count(), 1);
    }

    #[test]
    fn test_gesture_may_start_during_pending_export() {
        let mut rig = Rig::new();
        let shape = rig.factory.create_shape(ShapeKind::Circle, Color::BLACK);
        let id = rig
            .submit(MutationIntent::Add(shape))
            .object()
            .expect("committed");

        rig.router.begin_gesture(rig.now).expect("gesture");
        assert!(rig
            .router
            .gesture_translate(&mut rig.scene, &mut rig.debouncer, id, 5.0, 0.0, rig.now)
            .is_committed());
        let outcome = rig.router.end_gesture(
            &mut rig.scene,
            &mut rig.invariants,
            &mut rig.debouncer,
            None,
            true,
            rig.now,
        );
        assert!(outcome.is_none());
        assert_eq!(rig.router.phase(), RouterPhase::ExportPending);
    }

    #[test]
    fn test_clean_gesture_returns_to_idle() {
        let mut rig = Rig::new();
        rig.router.begin_gesture(rig.now).expect("gesture");
        let _ = rig.router.end_gesture(
            &mut rig.scene,
            &mut rig.invariants,
            &mut rig.debouncer,
            None,
            false,
            rig.now,
        );
        assert!(rig.router.is_idle());
        assert!(!rig.debouncer.is_pending());
    }

    #[test]
    fn test_watchdog_expiry() {
        let start = Instant::now();
        let mut router = MutationRouter::new(Some(Duration::from_secs(5)), start);
        assert!(!router.watchdog_expired(start + Duration::from_secs(60)));
        router.transition(RouterPhase::Mutating, start).expect("mutating");
        assert!(!router.watchdog_expired(start + Duration::from_secs(4)));
        router.touch(start + Duration::from_secs(4));
        assert!(!router.watchdog_expired(start + Duration::from_secs(8)));
        assert!(router.watchdog_expired(start + Duration::from_secs(9)));
        router.force_release(start + Duration::from_secs(9));
        assert!(router.is_idle());
    }

    #[test]
    fn test_watchdog_ignores_gesture() {
        let start = Instant::now();
        let mut router = MutationRouter::new(Some(Duration::from_secs(5)), start);
        router.begin_gesture(start).expect("gesture");
        assert!(router.watchdog_deadline().is_none());
        assert!(!router.watchdog_expired(start + Duration::from_secs(60)));
        assert_eq!(router.phase(), RouterPhase::Gesture);
    }

    #[test]
    fn test_gesture_translate_moves_and_schedules_export() {
        let mut rig = Rig::new();
        let shape = rig.factory.create_shape(ShapeKind::Rectangle, Color::BLACK);
        let id = rig
            .submit(MutationIntent::Add(shape))
            .object()
            .expect("committed");
        rig.settle_export();
        let before = rig.scene.get(id).expect("rect").transform.x;

        rig.router.begin_gesture(rig.now).expect("gesture");
        let outcome =
            rig.router
                .gesture_translate(&mut rig.scene, &mut rig.debouncer, id, 12.0, 0.0, rig.now);
        assert_eq!(outcome, MutationOutcome::Committed(id));
        assert!(rig.debouncer.is_pending());
        let after = rig.scene.get(id).expect("rect").transform.x;
        assert!((after - before - 12.0).abs() < f32::EPSILON);
        assert_eq!(rig.router.phase(), RouterPhase::Gesture);
    }

    #[test]
    fn test_gesture_translate_outside_gesture_rejected() {
        let mut rig = Rig::new();
        let shape = rig.factory.create_shape(ShapeKind::Circle, Color::BLACK);
        let id = rig
            .submit(MutationIntent::Add(shape))
            .object()
            .expect("committed");
        rig.settle_export();
        let version = rig.scene.version();

        let outcome =
            rig.router
                .gesture_translate(&mut rig.scene, &mut rig.debouncer, id, 3.0, 3.0, rig.now);
        assert_eq!(outcome, MutationOutcome::Rejected(Rejection::LatchHeld));
        assert_eq!(rig.scene.version(), version);
        assert!(!rig.debouncer.is_pending());
    }

    #[test]
    fn test_gesture_translate_refuses_boundary() {
        let mut rig = Rig::new();
        let boundary = rig.scene.ids()[0];
        rig.router.begin_gesture(rig.now).expect("gesture");
        let outcome = rig.router.gesture_translate(
            &mut rig.scene,
            &mut rig.debouncer,
            boundary,
            4.0,
            4.0,
            rig.now,
        );
        assert_eq!(outcome, MutationOutcome::Rejected(Rejection::ProtectedObject));
        assert!(!rig.debouncer.is_pending());
    }

    #[test]
    fn test_clear_keeps_boundary_and_installs_placeholder() {
        let mut rig = Rig::new();
        let shape = rig.factory.create_shape(ShapeKind::Circle, Color::BLACK);
        let _ = rig.submit(MutationIntent::Add(shape));
        rig.settle_export();

        let placeholder = rig.factory.create_placeholder(300.0, 300.0);
        assert!(rig
            .submit(MutationIntent::Clear { placeholder })
            .is_committed());
        assert_eq!(rig.scene.content_count(), 0);
        assert_eq!(rig.scene.placeholder_count(), 1);
        assert_eq!(rig.scene.boundary_count(), 1);
    }
}
