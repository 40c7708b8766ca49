//! Scene access.
//!
//! The instancing core never owns the scene. It reads geometry through
//! [`MeshView`] and edits the hierarchy through [`SceneHost`], both of which a
//! host application implements. [`Scene`] is the in-memory implementation used
//! by the CLI and the tests.

mod memory;
mod tag;

pub use memory::*;
pub use tag::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::util::{DAffine3, DVec3, Result};

/// Identity of a node in the host scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Polygon as four point indices. Triangles repeat `c` in `d`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polygon {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl Polygon {
    pub const fn tri(a: u32, b: u32, c: u32) -> Self {
        Self { a, b, c, d: c }
    }

    pub const fn quad(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }

    pub fn is_triangle(&self) -> bool {
        self.c == self.d
    }

    /// Point indices without the repeated corner of a triangle.
    pub fn indices(&self) -> impl Iterator<Item = u32> {
        let n = if self.is_triangle() { 3 } else { 4 };
        [self.a, self.b, self.c, self.d].into_iter().take(n)
    }
}

/// Read-only view of a polygon object's data.
pub trait MeshView {
    /// Point positions in object space.
    fn points(&self) -> &[DVec3];

    /// Polygons indexing into [`points`](Self::points).
    fn polygons(&self) -> &[Polygon];

    /// Tags in host order.
    fn tags(&self) -> &[Tag];

    fn point_count(&self) -> usize {
        self.points().len()
    }

    fn polygon_count(&self) -> usize {
        self.polygons().len()
    }

    /// Material tags in host order.
    fn texture_tags(&self) -> Vec<TextureTag> {
        self.tags().iter().filter_map(Tag::as_texture).cloned().collect()
    }
}

/// Kind of change recorded in an undo group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndoKind {
    /// Record before inserting a freshly created node.
    NewObject,
    /// Record before removing a node from the hierarchy.
    DeleteObject,
    /// Record before moving a node under another parent. Covers a
    /// transform change made right after the move.
    MoveObject,
}

/// Host scene interface: lookups, node edits and undo recording.
///
/// Node edits are only reversible when bracketed by
/// [`start_undo`](Self::start_undo)/[`end_undo`](Self::end_undo) and
/// announced with [`add_undo`](Self::add_undo); see [`UndoGroup`].
pub trait SceneHost {
    type Mesh: MeshView + ?Sized;

    /// Display name of a live node.
    fn name(&self, id: NodeId) -> Option<&str>;

    /// Mesh data if the node is a polygon object.
    fn mesh(&self, id: NodeId) -> Option<&Self::Mesh>;

    /// Transform relative to the parent.
    fn local_transform(&self, id: NodeId) -> Option<DAffine3>;

    /// Transform relative to the scene root.
    fn world_transform(&self, id: NodeId) -> Option<DAffine3>;

    /// Parent of a live node, `None` at the top level.
    fn parent(&self, id: NodeId) -> Option<NodeId>;

    /// Direct children in order.
    fn children(&self, id: NodeId) -> Vec<NodeId>;

    /// Create a detached instance node displaying `reference`.
    fn create_instance(&mut self, reference: NodeId) -> Result<NodeId>;

    fn set_name(&mut self, id: NodeId, name: &str) -> Result<()>;

    fn set_local_transform(&mut self, id: NodeId, transform: DAffine3) -> Result<()>;

    fn add_tag(&mut self, id: NodeId, tag: Tag) -> Result<()>;

    /// Insert a detached node directly after `pred`, under the same parent.
    fn insert_after(&mut self, id: NodeId, pred: NodeId) -> Result<()>;

    /// Move a node to the end of `parent`'s children. The local transform
    /// is kept as is.
    fn move_under(&mut self, id: NodeId, parent: NodeId) -> Result<()>;

    /// Remove a node (and its subtree) from the hierarchy.
    fn remove(&mut self, id: NodeId) -> Result<()>;

    fn start_undo(&mut self);

    fn add_undo(&mut self, kind: UndoKind, id: NodeId);

    fn end_undo(&mut self);
}

/// Open undo group, closed on drop.
///
/// Closing on drop means an edit batch that fails halfway is still one
/// undo step for the user.
pub struct UndoGroup<'a, S: SceneHost + ?Sized> {
    scene: &'a mut S,
}

impl<'a, S: SceneHost + ?Sized> UndoGroup<'a, S> {
    pub fn open(scene: &'a mut S) -> Self {
        scene.start_undo();
        Self { scene }
    }
}

impl<S: SceneHost + ?Sized> Deref for UndoGroup<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.scene
    }
}

impl<S: SceneHost + ?Sized> DerefMut for UndoGroup<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.scene
    }
}

impl<S: SceneHost + ?Sized> Drop for UndoGroup<'_, S> {
    fn drop(&mut self) {
        self.scene.end_undo();
    }
}
