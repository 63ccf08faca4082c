//! The scene host: owns the engine and exporter between mount and unmount.

use std::fmt;
use std::time::Instant;

use tee_canvas_core::{
    CanvasEngine, Clock, Color, MutationOutcome, ObjectId, PointerEvent, RasterHandle, Rejection,
    RouterPhase, Scene, ShapeKind, StylePatch, TextStyle, ToolState,
};
use tee_canvas_renderer::{decode_source, ExportSnapshot, ImageSource, RasterExporter, RenderResult};
use uuid::Uuid;

use crate::import::{next_epoch, ImportOutcome, ImportTicket};
use crate::HostConfig;

/// Receives host notifications.
pub trait DesignListener {
    /// Initial objects are installed. Called once per mount.
    fn on_ready(&mut self) {}

    /// A settled design was exported.
    fn on_design_change(&mut self, snapshot: &ExportSnapshot);
}

struct Surface {
    engine: CanvasEngine,
    exporter: RasterExporter,
}

/// Owns one design surface for its lifetime.
///
/// Every command is a no-op returning [`Rejection::SurfaceInvalid`] once
/// the host is unmounted.
pub struct SceneHost {
    config: HostConfig,
    session: Uuid,
    epoch: u64,
    import_generation: u64,
    surface: Option<Surface>,
    parked: Option<(ImportTicket, RasterHandle)>,
    listener: Box<dyn DesignListener>,
    clock: Box<dyn Clock>,
    latest: Option<ExportSnapshot>,
}

impl fmt::Debug for SceneHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneHost")
            .field("session", &self.session)
            .field("epoch", &self.epoch)
            .field("mounted", &self.surface.is_some())
            .field("import_generation", &self.import_generation)
            .field("parked", &self.parked.is_some())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl SceneHost {
    /// Create the surface, install the safety boundary and either the
    /// initial image or the placeholder, then signal ready.
    ///
    /// A failed initial decode is logged and falls back to the placeholder.
    #[must_use]
    pub fn mount(
        config: HostConfig,
        initial: Option<ImageSource>,
        listener: Box<dyn DesignListener>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let session = Uuid::new_v4();
        let mut engine = CanvasEngine::new(&config.engine_config(), now);
        let exporter = RasterExporter::new(config.export_config());

        let initial = initial.and_then(|source| {
            match decode_source(&source, Some(config.max_raster_size())) {
                Ok(raster) => Some(raster),
                Err(e) => {
                    tracing::error!(
                        "Initial design {} failed to decode: {}",
                        source.describe(),
                        e
                    );
                    None
                }
            }
        });
        match initial {
            Some(raster) => {
                let outcome = engine.place_image(raster, config.import_margin, now);
                if let Some(rejection) = outcome.rejection() {
                    tracing::warn!("Initial design not placed: {}", rejection);
                    engine.install_placeholder();
                }
            }
            None => engine.install_placeholder(),
        }

        tracing::info!(
            "Mounted design surface {} ({}x{})",
            session,
            config.width,
            config.height
        );
        let mut host = Self {
            config,
            session,
            epoch: next_epoch(),
            import_generation: 0,
            surface: Some(Surface { engine, exporter }),
            parked: None,
            listener,
            clock,
            latest: None,
        };
        host.listener.on_ready();
        host
    }

    /// Identifier of this mount, for logs.
    #[must_use]
    pub const fn session(&self) -> Uuid {
        self.session
    }

    /// The configuration the surface was mounted with.
    #[must_use]
    pub const fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Whether the surface is still alive.
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.surface.is_some()
    }

    /// The live scene.
    #[must_use]
    pub fn scene(&self) -> Option<&Scene> {
        self.surface.as_ref().map(|s| s.engine.scene())
    }

    /// The layout of the live scene as JSON, without pixel data.
    #[must_use]
    pub fn layout_json(&self) -> Option<String> {
        match self.scene()?.to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!("Failed to serialize layout: {}", e);
                None
            }
        }
    }

    /// Tool-panel state.
    #[must_use]
    pub fn tools(&self) -> Option<&ToolState> {
        self.surface.as_ref().map(|s| s.engine.tools())
    }

    /// Current latch state.
    #[must_use]
    pub fn phase(&self) -> Option<RouterPhase> {
        self.surface.as_ref().map(|s| s.engine.phase())
    }

    /// The most recent export, kept after unmount.
    #[must_use]
    pub const fn latest_snapshot(&self) -> Option<&ExportSnapshot> {
        self.latest.as_ref()
    }

    /// Nothing is in flight: latch free, no export scheduled, no parked
    /// import.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.surface
            .as_ref()
            .is_some_and(|s| s.engine.is_idle() && !s.engine.export_pending())
            && self.parked.is_none()
    }

    fn command(
        &mut self,
        f: impl FnOnce(&mut CanvasEngine, Instant) -> MutationOutcome,
    ) -> MutationOutcome {
        let now = self.clock.now();
        match self.surface.as_mut() {
            Some(surface) => f(&mut surface.engine, now),
            None => {
                tracing::debug!("Command on unmounted surface {} ignored", self.session);
                MutationOutcome::Rejected(Rejection::SurfaceInvalid)
            }
        }
    }

    /// Add a text object.
    pub fn add_text(&mut self, text: &str, style: &TextStyle) -> MutationOutcome {
        self.command(|engine, now| engine.add_text(text, style, now))
    }

    /// Add a shape.
    pub fn add_shape(&mut self, kind: ShapeKind, color: Color) -> MutationOutcome {
        self.command(|engine, now| engine.add_shape(kind, color, now))
    }

    /// Remove the active object.
    pub fn delete_selected(&mut self) -> MutationOutcome {
        self.command(CanvasEngine::delete_selected)
    }

    /// Restyle the active object.
    pub fn update_selected(&mut self, patch: StylePatch) -> MutationOutcome {
        self.command(|engine, now| engine.update_selected(patch, now))
    }

    /// Remove all content and show the placeholder again.
    pub fn clear_canvas(&mut self) -> MutationOutcome {
        self.command(CanvasEngine::clear)
    }

    /// Make an object the active selection.
    pub fn select(&mut self, id: ObjectId) -> MutationOutcome {
        self.command(|engine, _| engine.select(id))
    }

    /// Switch between select and draw mode.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::SurfaceInvalid`] after unmount.
    pub fn set_draw_mode(&mut self, enabled: bool) -> Result<(), Rejection> {
        let now = self.clock.now();
        let surface = self.surface.as_mut().ok_or(Rejection::SurfaceInvalid)?;
        surface.engine.set_draw_mode(enabled, now);
        Ok(())
    }

    /// Set the brush width (clamped to 1-20).
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::SurfaceInvalid`] after unmount.
    pub fn set_brush_size(&mut self, width: u8) -> Result<(), Rejection> {
        let surface = self.surface.as_mut().ok_or(Rejection::SurfaceInvalid)?;
        surface.engine.set_brush_size(width);
        Ok(())
    }

    /// Set the brush color.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::SurfaceInvalid`] after unmount.
    pub fn set_brush_color(&mut self, color: Color) -> Result<(), Rejection> {
        let surface = self.surface.as_mut().ok_or(Rejection::SurfaceInvalid)?;
        surface.engine.set_brush_color(color);
        Ok(())
    }

    /// Feed a pointer event.
    pub fn pointer(&mut self, event: PointerEvent) -> Option<MutationOutcome> {
        let now = self.clock.now();
        match self.surface.as_mut() {
            Some(surface) => surface.engine.pointer(event, now),
            None => Some(MutationOutcome::Rejected(Rejection::SurfaceInvalid)),
        }
    }

    /// Start an import. Any earlier ticket, and any parked result, is
    /// superseded.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::SurfaceInvalid`] after unmount.
    pub fn begin_import(&mut self, source: ImageSource) -> Result<ImportTicket, Rejection> {
        if self.surface.is_none() {
            return Err(Rejection::SurfaceInvalid);
        }
        self.import_generation += 1;
        if self.parked.take().is_some() {
            tracing::debug!("Parked import dropped for a newer one");
        }
        tracing::info!(
            "Import {} started: {}",
            self.import_generation,
            source.describe()
        );
        Ok(ImportTicket::new(
            self.epoch,
            self.import_generation,
            source,
            self.config.max_raster_size(),
        ))
    }

    /// Apply a finished decode, unless the ticket is stale.
    pub fn complete_import(
        &mut self,
        ticket: ImportTicket,
        result: RenderResult<RasterHandle>,
    ) -> ImportOutcome {
        if ticket.epoch != self.epoch || self.surface.is_none() {
            tracing::debug!("Import {} completed after unmount", ticket.generation);
            return ImportOutcome::Discarded;
        }
        if ticket.generation != self.import_generation {
            tracing::debug!(
                "Import {} superseded by {}",
                ticket.generation,
                self.import_generation
            );
            return ImportOutcome::Superseded;
        }
        match result {
            Ok(raster) => self.place(ticket, raster),
            Err(e) => {
                tracing::error!("Import {} failed: {}", ticket.generation, e);
                ImportOutcome::Failed
            }
        }
    }

    /// Decode on the calling thread and apply.
    pub fn upload_image(&mut self, source: ImageSource) -> ImportOutcome {
        match self.begin_import(source) {
            Ok(ticket) => {
                let result = ticket.decode();
                self.complete_import(ticket, result)
            }
            Err(_) => ImportOutcome::Discarded,
        }
    }

    fn place(&mut self, ticket: ImportTicket, raster: RasterHandle) -> ImportOutcome {
        let now = self.clock.now();
        let Some(surface) = self.surface.as_mut() else {
            return ImportOutcome::Discarded;
        };
        match surface
            .engine
            .place_image(raster.clone(), self.config.import_margin, now)
        {
            MutationOutcome::Committed(id) => {
                tracing::info!("Import {} placed as {}", ticket.generation, id);
                ImportOutcome::Applied(id)
            }
            MutationOutcome::Rejected(Rejection::LatchHeld) => {
                tracing::debug!("Import {} parked until the latch frees", ticket.generation);
                self.parked = Some((ticket, raster));
                ImportOutcome::Parked
            }
            MutationOutcome::Rejected(rejection) => {
                tracing::warn!("Import {} rejected: {}", ticket.generation, rejection);
                ImportOutcome::Failed
            }
        }
    }

    /// Run due work: watchdog, deferred reconciliation, sweeps, the
    /// debounced export and any parked import. Returns `true` when a design
    /// change was exported.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.now();
        let Some(surface) = self.surface.as_mut() else {
            return false;
        };
        let exported = surface.engine.poll(now) && self.export_scene(now).is_some();

        let idle = self.surface.as_ref().is_some_and(|s| s.engine.is_idle());
        if idle {
            if let Some((ticket, raster)) = self.parked.take() {
                if ticket.generation == self.import_generation {
                    let _ = self.place(ticket, raster);
                }
            }
        }
        exported
    }

    /// Export immediately, bypassing the debounce. Returns `None` for an
    /// empty design or while a change is in flight.
    pub fn export_now(&mut self) -> Option<ExportSnapshot> {
        let now = self.clock.now();
        let surface = self.surface.as_mut()?;
        if !surface.engine.request_export(now) {
            return None;
        }
        self.export_scene(now)
    }

    fn export_scene(&mut self, now: Instant) -> Option<ExportSnapshot> {
        let surface = self.surface.as_mut()?;
        let result = surface.exporter.export(surface.engine.scene());
        surface.engine.finish_export(now);
        match result {
            Ok(snapshot) => {
                tracing::debug!("Design exported: {:?}", snapshot);
                self.listener.on_design_change(&snapshot);
                self.latest = Some(snapshot.clone());
                Some(snapshot)
            }
            Err(e) => {
                tracing::error!("Export failed: {}", e);
                None
            }
        }
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.surface.as_ref()?.engine.next_deadline()
    }

    /// Remove every object, cancel pending timers and invalidate
    /// outstanding import tickets. Idempotent.
    pub fn unmount(&mut self) {
        let Some(mut surface) = self.surface.take() else {
            return;
        };
        let removed = surface.engine.teardown(self.clock.now());
        self.parked = None;
        tracing::info!(
            "Unmounted design surface {} ({} objects removed)",
            self.session,
            removed
        );
    }
}

impl Drop for SceneHost {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tee_canvas_core::ManualClock;

    #[derive(Debug)]
    struct Silent;

    impl DesignListener for Silent {
        fn on_design_change(&mut self, _snapshot: &ExportSnapshot) {}
    }

    fn host() -> (SceneHost, ManualClock) {
        let clock = ManualClock::new();
        let host = SceneHost::mount(
            HostConfig::default(),
            None,
            Box::new(Silent),
            Box::new(clock.clone()),
        );
        (host, clock)
    }

    #[test]
    fn test_mount_installs_boundary_and_placeholder() {
        let (host, _) = host();
        let scene = host.scene().expect("mounted");
        assert_eq!(scene.boundary_count(), 1);
        assert_eq!(scene.placeholder_count(), 1);
        assert!(host.is_settled());
    }

    #[test]
    fn test_bad_initial_image_falls_back_to_placeholder() {
        let clock = ManualClock::new();
        let host = SceneHost::mount(
            HostConfig::default(),
            Some(ImageSource::Bytes(b"definitely not a png".to_vec())),
            Box::new(Silent),
            Box::new(clock),
        );
        let scene = host.scene().expect("mounted");
        assert_eq!(scene.placeholder_count(), 1);
        assert_eq!(scene.image_count(), 0);
    }

    #[test]
    fn test_commands_after_unmount_are_rejected() {
        let (mut host, _) = host();
        host.unmount();
        assert_eq!(
            host.add_shape(ShapeKind::Circle, Color::BLACK),
            MutationOutcome::Rejected(Rejection::SurfaceInvalid)
        );
        assert_eq!(host.set_draw_mode(true), Err(Rejection::SurfaceInvalid));
        assert_eq!(
            host.pointer(PointerEvent::down(1.0, 1.0)),
            Some(MutationOutcome::Rejected(Rejection::SurfaceInvalid))
        );
        assert!(host.begin_import(ImageSource::Bytes(Vec::new())).is_err());
        assert!(!host.poll());
        assert!(host.next_deadline().is_none());
        assert!(host.scene().is_none());
    }

    #[test]
    fn test_unmount_is_idempotent() {
        let (mut host, _) = host();
        host.unmount();
        host.unmount();
        assert!(!host.is_mounted());
    }

    #[test]
    fn test_export_now_on_empty_design() {
        let (mut host, _) = host();
        assert!(host.export_now().is_none());
        let _ = host.add_text("Hi", &TextStyle::default());
        let snapshot = host.export_now().expect("export");
        assert_eq!(host.latest_snapshot(), Some(&snapshot));
        assert!(host.is_settled());
    }

    #[test]
    fn test_debug_does_not_need_listener() {
        let (host, _) = host();
        let rendered = format!("{host:?}");
        assert!(rendered.contains("mounted: true"));
    }
}
