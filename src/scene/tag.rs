//! Tags attached to polygon objects.
//!
//! Tags are a closed set of variants. Parameter data that the host keeps in
//! generic key/value containers is modelled by [`Container`], which can nest.

use serde::{Deserialize, Serialize};

use crate::util::{DVec2, DVec3};

/// Identity of a material in the host document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub u64);

/// A single value stored in a [`Container`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Vector(DVec3),
    /// Reference to another host object or asset by identity.
    Link(u64),
    Container(Container),
}

/// Ordered key/value parameter storage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Container {
    pub entries: Vec<(u32, Value)>,
}

impl Container {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, id: u32, value: Value) -> Self {
        self.set(id, value);
        self
    }

    /// Set a value, replacing an existing entry with the same id.
    pub fn set(&mut self, id: u32, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((id, value)),
        }
    }

    /// Get a value by id.
    pub fn get(&self, id: u32) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| *k == id).map(|(_, v)| v)
    }

    /// Number of direct entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the container has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Material assignment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureTag {
    pub name: String,
    /// Assigned material. A tag without material has no effect.
    pub material: Option<MaterialId>,
    /// Name of a polygon selection tag on the same object limiting the assignment.
    pub restriction: Option<String>,
    /// Projection, tiling, offsets and the rest of the tag parameters.
    pub data: Container,
}

/// Phong shading parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhongTag {
    pub name: String,
    pub data: Container,
}

/// Explicit vertex normals as raw host payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalTag {
    pub name: String,
    pub payload: Vec<u8>,
}

impl NormalTag {
    /// Pack per-polygon-corner normals as little-endian f64 triples.
    pub fn from_normals(name: impl Into<String>, normals: &[DVec3]) -> Self {
        let words: Vec<u64> = normals
            .iter()
            .flat_map(|n| n.to_array())
            .map(|v| v.to_bits().to_le())
            .collect();
        Self {
            name: name.into(),
            payload: bytemuck::cast_slice(words.as_slice()).to_vec(),
        }
    }
}

/// UV coordinates as raw host payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UvwTag {
    pub name: String,
    pub payload: Vec<u8>,
}

impl UvwTag {
    /// Pack per-polygon-corner UVs as little-endian f64 pairs.
    pub fn from_uvs(name: impl Into<String>, uvs: &[DVec2]) -> Self {
        let words: Vec<u64> = uvs
            .iter()
            .flat_map(|uv| uv.to_array())
            .map(|v| v.to_bits().to_le())
            .collect();
        Self {
            name: name.into(),
            payload: bytemuck::cast_slice(words.as_slice()).to_vec(),
        }
    }
}

/// What a selection tag selects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    #[default]
    Polygon,
    Point,
    Edge,
}

/// Named polygon/point/edge selection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionTag {
    pub name: String,
    pub kind: SelectionKind,
    pub indices: Vec<u32>,
}

impl SelectionTag {
    /// Sorted, deduplicated indices below `limit`.
    ///
    /// Two selections that select the same elements compare equal here even
    /// when stored in a different order or with stale out-of-range entries.
    pub fn normalized(&self, limit: usize) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .indices
            .iter()
            .copied()
            .filter(|&i| (i as usize) < limit)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Any tag kind without dedicated handling.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherTag {
    pub name: String,
    /// Host plugin/type id.
    pub type_id: u32,
    pub data: Container,
}

/// A tag on a polygon object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tag {
    Texture(TextureTag),
    Phong(PhongTag),
    Normal(NormalTag),
    Uvw(UvwTag),
    Selection(SelectionTag),
    Other(OtherTag),
}

impl Tag {
    pub fn as_texture(&self) -> Option<&TextureTag> {
        match self {
            Self::Texture(t) => Some(t),
            _ => None,
        }
    }
}
