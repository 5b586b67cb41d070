//! # tandem-core: scene model for Tandem
//!
//! Scene objects, their geometry, the group-to-absolute transform
//! normalizer, identifier allocation and the [`SceneStore`] seam that the
//! collaboration layer drives.
//!
//! ## Modules
//!
//! - [`geometry`]: affine math, [`Geometry`], [`GeometryPatch`]
//! - [`transform`]: [`normalize`] for group-relative objects
//! - [`id`]: random hex identifiers
//! - [`scene`]: [`SceneEvent`], [`SceneStore`] and the in-memory [`Scene`]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod geometry;
pub mod id;
pub mod scene;
pub mod transform;

pub use geometry::{Affine, Decomposed, Geometry, GeometryPatch, GestureKind, Point};
pub use id::{new_id, new_id_with_len, DEFAULT_ID_LEN};
pub use scene::{Modification, ObjectKey, Scene, SceneEvent, SceneStore};
pub use transform::{absolute, normalize};

fn default_kind() -> String {
    "object".to_string()
}

/// A positioned, transformable object in the scene.
///
/// Serializes to the flat JSON shape peers exchange: `id`, `type`, the
/// geometry keys, `extra`, and any opaque render attributes alongside.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    /// Assigned once, the first time the object is observed locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    /// Application payload, carried but never interpreted.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extra: Value,
    /// Fill, stroke and whatever else the renderer needs.
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
    /// Enclosing transient selection, if any. Never leaves the peer.
    #[serde(skip)]
    pub group: Option<Affine>,
    /// Set while a history replay is about to surface this object through
    /// a scene event.
    #[serde(skip)]
    pub programmatic: bool,
    #[serde(skip)]
    coords: [Point; 4],
}

impl SceneObject {
    pub fn new(kind: impl Into<String>, geometry: Geometry) -> Self {
        let mut object = Self {
            id: None,
            kind: kind.into(),
            geometry,
            extra: Value::Null,
            attrs: Map::new(),
            group: None,
            programmatic: false,
            coords: [Point::default(); 4],
        };
        object.refresh_coords();
        object
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Cached corner points, valid after the last geometry change.
    pub fn coords(&self) -> &[Point; 4] {
        &self.coords
    }

    pub fn refresh_coords(&mut self) {
        let corners = self.geometry.corners();
        self.coords = match &self.group {
            Some(group) => corners.map(|p| group.apply(p)),
            None => corners,
        };
    }

    /// Replaces the geometry and recomputes cached coordinates.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
        self.refresh_coords();
    }

    pub fn apply_patch(&mut self, patch: &GeometryPatch) {
        patch.apply_to(&mut self.geometry);
        self.refresh_coords();
    }
}

/// Full serialization of a scene, exchanged at handshake and re-sync.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub objects: Vec<SceneObject>,
}

impl Snapshot {
    pub fn new(objects: Vec<SceneObject>) -> Self {
        Self { objects }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().filter_map(|o| o.id())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
