//! Scene arena owning every object on the design surface.

use std::collections::HashMap;

use serde::Serialize;

use crate::{CanvasError, CanvasResult, Color, ObjectId, SceneObject};

/// The set of objects composed on the design surface.
///
/// Objects live in an arena keyed by [`ObjectId`]; `order` holds the z-order
/// from back to front. Callers only ever hold ids, never references.
#[derive(Debug, Clone)]
pub struct Scene {
    /// All objects, indexed by id.
    objects: HashMap<ObjectId, SceneObject>,
    /// Z-order, back-most first.
    order: Vec<ObjectId>,
    /// Active object, if any.
    selected: Option<ObjectId>,
    /// Canvas width in pixels.
    width: f32,
    /// Canvas height in pixels.
    height: f32,
    /// Background fill.
    background: Color,
    /// Bumped on every change that can alter an export.
    version: u64,
}

/// Serializable description of the layout, without pixel data.
#[derive(Debug, Serialize)]
struct LayoutDocument<'a> {
    width: f32,
    height: f32,
    background: Color,
    version: u64,
    objects: Vec<&'a SceneObject>,
}

impl Scene {
    /// Create an empty scene with a fixed size and background.
    #[must_use]
    pub fn new(width: f32, height: f32, background: Color) -> Self {
        Self {
            objects: HashMap::new(),
            order: Vec::new(),
            selected: None,
            width,
            height,
            background,
            version: 0,
        }
    }

    /// Canvas width in pixels.
    #[must_use]
    pub const fn width(&self) -> f32 {
        self.width
    }

    /// Canvas height in pixels.
    #[must_use]
    pub const fn height(&self) -> f32 {
        self.height
    }

    /// Background fill.
    #[must_use]
    pub const fn background(&self) -> Color {
        self.background
    }

    /// Scene-state version; exports are tagged with it.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    /// Add an object on top of the z-order.
    pub fn add(&mut self, object: SceneObject) -> ObjectId {
        let id = object.id;
        self.order.push(id);
        self.objects.insert(id, object);
        self.touch();
        id
    }

    /// Add an object below everything else.
    pub(crate) fn add_at_back(&mut self, object: SceneObject) -> ObjectId {
        let id = object.id;
        self.order.insert(0, id);
        self.objects.insert(id, object);
        self.touch();
        id
    }

    /// Remove an object.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::ProtectedObject`] for the safety boundary and
    /// [`CanvasError::ObjectNotFound`] for unknown ids.
    pub fn remove(&mut self, id: ObjectId) -> CanvasResult<SceneObject> {
        match self.objects.get(&id) {
            Some(object) if object.is_protected() => Err(CanvasError::ProtectedObject(id)),
            Some(_) => self
                .remove_unchecked(id)
                .ok_or(CanvasError::ObjectNotFound(id)),
            None => Err(CanvasError::ObjectNotFound(id)),
        }
    }

    /// Remove any object, protected or not.
    pub(crate) fn remove_unchecked(&mut self, id: ObjectId) -> Option<SceneObject> {
        let object = self.objects.remove(&id)?;
        self.order.retain(|&eid| eid != id);
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.touch();
        Some(object)
    }

    /// Get an object by id.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    /// Whether the id is live in this scene.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Mutate an object in place.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::ObjectNotFound`] for unknown ids.
    pub fn update<F>(&mut self, id: ObjectId, f: F) -> CanvasResult<()>
    where
        F: FnOnce(&mut SceneObject),
    {
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(CanvasError::ObjectNotFound(id))?;
        f(object);
        self.touch();
        Ok(())
    }

    /// Objects in z-order, back-most first.
    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.order.iter().filter_map(|id| self.objects.get(id))
    }

    /// Ids in z-order, back-most first.
    #[must_use]
    pub fn ids(&self) -> &[ObjectId] {
        &self.order
    }

    /// Ids of objects matching a predicate, in z-order.
    pub fn ids_where<P>(&self, mut predicate: P) -> Vec<ObjectId>
    where
        P: FnMut(&SceneObject) -> bool,
    {
        self.objects()
            .filter(|object| predicate(object))
            .map(|object| object.id)
            .collect()
    }

    /// Number of safety boundaries (1 in every settled state).
    #[must_use]
    pub fn boundary_count(&self) -> usize {
        self.objects().filter(|o| o.is_boundary()).count()
    }

    /// Number of placeholders.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.objects().filter(|o| o.is_placeholder()).count()
    }

    /// Number of imported images.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.objects().filter(|o| o.is_image()).count()
    }

    /// Number of objects that belong to the user's design.
    #[must_use]
    pub fn content_count(&self) -> usize {
        self.objects().filter(|o| o.kind.is_content()).count()
    }

    /// Position in the z-order (0 = back-most).
    #[must_use]
    pub fn z_index(&self, id: ObjectId) -> Option<usize> {
        self.order.iter().position(|&eid| eid == id)
    }

    /// Move an object to the back. Returns whether the order changed.
    pub fn send_to_back(&mut self, id: ObjectId) -> bool {
        match self.z_index(id) {
            Some(0) | None => false,
            Some(index) => {
                self.order.remove(index);
                self.order.insert(0, id);
                self.touch();
                true
            }
        }
    }

    /// Make an object the active selection.
    ///
    /// Selection is not part of the export, so the version is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::ObjectNotFound`] for unknown ids and
    /// [`CanvasError::InvalidOperation`] for non-selectable objects.
    pub fn select(&mut self, id: ObjectId) -> CanvasResult<()> {
        let object = self.objects.get(&id).ok_or(CanvasError::ObjectNotFound(id))?;
        if !object.selectable {
            return Err(CanvasError::InvalidOperation(format!(
                "{} is not selectable",
                object.tag()
            )));
        }
        self.selected = Some(id);
        Ok(())
    }

    /// Clear the selection.
    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Id of the active object.
    #[must_use]
    pub const fn selected_id(&self) -> Option<ObjectId> {
        self.selected
    }

    /// The active object.
    #[must_use]
    pub fn selected(&self) -> Option<&SceneObject> {
        self.selected.and_then(|id| self.objects.get(&id))
    }

    /// Find the front-most evented object under a canvas point.
    #[must_use]
    pub fn object_at(&self, x: f32, y: f32) -> Option<ObjectId> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.objects.get(id))
            .find(|o| o.evented && o.contains_point(x, y))
            .map(|o| o.id)
    }

    /// Get the number of objects in the scene.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the scene is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Remove every object, boundary included. Only teardown may call this.
    pub fn clear(&mut self) -> usize {
        let removed = self.objects.len();
        self.objects.clear();
        self.order.clear();
        self.selected = None;
        if removed > 0 {
            self.touch();
        }
        removed
    }

    /// Serialize the layout (no pixel data) to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CanvasResult<String> {
        let doc = LayoutDocument {
            width: self.width,
            height: self.height,
            background: self.background,
            version: self.version,
            objects: self.objects().collect(),
        };
        serde_json::to_string(&doc).map_err(CanvasError::Serialization)
    }
}
