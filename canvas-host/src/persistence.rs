//! Design persistence.
//!
//! The canvas never stores anything itself. The surrounding application
//! hands the latest [`ExportSnapshot`] plus its theme and questionnaire
//! answers to a [`DesignStore`] and gets back an opaque [`DesignId`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tee_canvas_core::Color;
use tee_canvas_renderer::ExportSnapshot;
use uuid::Uuid;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The internal lock was poisoned by a panicking thread.
    #[error("Lock poisoned")]
    LockPoisoned,
    /// No design with this id.
    #[error("Design not found: {0}")]
    NotFound(DesignId),
    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Opaque identifier returned by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesignId(Uuid);

impl DesignId {
    /// A fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DesignId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DesignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DesignId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What the user picked around the design.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignMetadata {
    /// Design theme.
    pub theme: String,
    /// Garment color, if chosen.
    pub tshirt_color: Option<Color>,
    /// Questionnaire answers keyed by question.
    pub answers: BTreeMap<String, String>,
}

/// A design ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignSubmission {
    /// The exported raster.
    pub snapshot: ExportSnapshot,
    /// Theme and answers.
    pub metadata: DesignMetadata,
    /// Scene layout JSON, kept so the design can be inspected without the raster.
    pub layout: Option<String>,
}

/// A design read back from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDesign {
    /// Id assigned at save time.
    pub id: DesignId,
    /// PNG bytes.
    pub png: Vec<u8>,
    /// Record written alongside the image.
    pub record: DesignRecord,
}

/// The JSON record kept next to each stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignRecord {
    /// Design id.
    pub id: DesignId,
    /// Raster width in pixels.
    pub width: u32,
    /// Raster height in pixels.
    pub height: u32,
    /// Scene version the raster was taken from.
    pub scene_version: u64,
    /// Save time, Unix milliseconds.
    pub saved_at_ms: u64,
    /// Theme and answers.
    pub metadata: DesignMetadata,
    /// Scene layout at save time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<serde_json::Value>,
}

impl DesignRecord {
    fn new(id: DesignId, submission: &DesignSubmission) -> Result<Self, StoreError> {
        let layout = submission
            .layout
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self {
            id,
            width: submission.snapshot.width(),
            height: submission.snapshot.height(),
            scene_version: submission.snapshot.scene_version(),
            saved_at_ms: current_timestamp_ms(),
            metadata: submission.metadata.clone(),
            layout,
        })
    }
}

/// Where finished designs go.
pub trait DesignStore {
    /// Store a design and return its id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the design cannot be written.
    fn save(&self, submission: &DesignSubmission) -> Result<DesignId, StoreError>;

    /// Read a design back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown ids.
    fn fetch(&self, id: DesignId) -> Result<StoredDesign, StoreError>;
}

/// In-process store, for tests and previews.
#[derive(Debug, Clone, Default)]
pub struct MemoryDesignStore {
    designs: Arc<RwLock<HashMap<DesignId, StoredDesign>>>,
}

impl MemoryDesignStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored designs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.designs
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DesignStore for MemoryDesignStore {
    fn save(&self, submission: &DesignSubmission) -> Result<DesignId, StoreError> {
        let id = DesignId::new();
        let stored = StoredDesign {
            id,
            png: submission.snapshot.bytes().to_vec(),
            record: DesignRecord::new(id, submission)?,
        };
        self.designs
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(id, stored);
        tracing::debug!("Stored design {} in memory", id);
        Ok(id)
    }

    fn fetch(&self, id: DesignId) -> Result<StoredDesign, StoreError> {
        self.designs
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

/// Writes `<id>.png` and `<id>.json` into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDesignStore {
    dir: PathBuf,
}

impl DirectoryDesignStore {
    /// Use `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the stored image for `id`.
    #[must_use]
    pub fn png_path(&self, id: DesignId) -> PathBuf {
        self.dir.join(format!("{id}.png"))
    }

    fn record_path(&self, id: DesignId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl DesignStore for DirectoryDesignStore {
    fn save(&self, submission: &DesignSubmission) -> Result<DesignId, StoreError> {
        let id = DesignId::new();
        let record = DesignRecord::new(id, submission)?;
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(self.png_path(id), submission.snapshot.bytes())?;
        std::fs::write(self.record_path(id), json)?;
        tracing::info!("Stored design {} in {}", id, self.dir.display());
        Ok(id)
    }

    fn fetch(&self, id: DesignId) -> Result<StoredDesign, StoreError> {
        let record_path = self.record_path(id);
        if !record_path.exists() {
            return Err(StoreError::NotFound(id));
        }
        let contents = std::fs::read_to_string(&record_path)?;
        let record: DesignRecord = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let png = std::fs::read(self.png_path(id))?;
        Ok(StoredDesign { id, png, record })
    }
}

/// Get the current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| {
        #[allow(clippy::cast_possible_truncation)]
        {
            d.as_millis() as u64
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tee_canvas_core::{CanvasEngine, EngineConfig, ShapeKind};
    use tee_canvas_renderer::RasterExporter;

    fn submission() -> DesignSubmission {
        let now = std::time::Instant::now();
        let mut engine = CanvasEngine::new(&EngineConfig::default(), now);
        let _ = engine.add_shape(ShapeKind::Circle, Color::rgb(200, 0, 0), now);
        let layout = engine.scene().to_json().expect("layout");
        let snapshot = RasterExporter::with_defaults()
            .export(engine.scene())
            .expect("export");
        let mut answers = BTreeMap::new();
        answers.insert("vibe".to_string(), "bold".to_string());
        DesignSubmission {
            snapshot,
            metadata: DesignMetadata {
                theme: "retro".to_string(),
                tshirt_color: Some(Color::WHITE),
                answers,
            },
            layout: Some(layout),
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryDesignStore::new();
        assert!(store.is_empty());
        let submission = submission();
        let id = store.save(&submission).expect("save");
        let stored = store.fetch(id).expect("fetch");
        assert_eq!(stored.png, submission.snapshot.bytes());
        assert_eq!(stored.record.metadata.theme, "retro");
        assert_eq!(stored.record.width, 600);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_unknown_id() {
        let store = MemoryDesignStore::new();
        assert!(matches!(
            store.fetch(DesignId::new()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_directory_store_writes_png_and_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DirectoryDesignStore::new(dir.path().join("designs")).expect("store");
        let submission = submission();
        let id = store.save(&submission).expect("save");

        let png = std::fs::read(store.png_path(id)).expect("png");
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);

        let json = std::fs::read_to_string(dir.path().join("designs").join(format!("{id}.json")))
            .expect("json");
        assert!(json.contains("\"theme\": \"retro\""));
        assert!(json.contains("\"vibe\": \"bold\""));

        let stored = store.fetch(id).expect("fetch");
        assert_eq!(stored.record.scene_version, submission.snapshot.scene_version());
        assert_eq!(stored.record.metadata, submission.metadata);
        let layout = stored.record.layout.expect("layout");
        let objects = layout["objects"].as_array().expect("objects");
        assert!(objects.iter().any(|o| o["kind"]["type"] == "circle"));
    }

    #[test]
    fn test_malformed_layout_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DirectoryDesignStore::new(dir.path()).expect("store");
        let mut submission = submission();
        submission.layout = Some("{not json".to_string());
        assert!(matches!(
            store.save(&submission),
            Err(StoreError::Serialization(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn test_directory_store_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = DirectoryDesignStore::new(dir.path())
            .expect("store")
            .save(&submission())
            .expect("save");
        let reopened = DirectoryDesignStore::new(dir.path()).expect("store2");
        assert_eq!(reopened.fetch(id).expect("fetch").id, id);
        assert!(matches!(
            reopened.fetch(DesignId::new()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_design_id_parse() {
        let id = DesignId::new();
        let parsed: DesignId = id.to_string().parse().expect("parse");
        assert_eq!(parsed, id);
        assert!("nope".parse::<DesignId>().is_err());
    }
}
