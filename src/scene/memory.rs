//! In-memory scene graph with undo.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::{MeshView, NodeId, Polygon, SceneHost, Tag, UndoKind};
use crate::util::{DAffine3, DVec3, Error, Result};

/// Polygon object data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mesh {
    pub points: Vec<DVec3>,
    pub polygons: Vec<Polygon>,
    pub tags: Vec<Tag>,
}

impl Mesh {
    pub fn new(points: Vec<DVec3>, polygons: Vec<Polygon>) -> Self {
        Self { points, polygons, tags: Vec::new() }
    }

    /// Axis-aligned cube centered at the origin, 8 points and 6 quads.
    pub fn cube(size: f64) -> Self {
        let h = size * 0.5;
        let points = vec![
            DVec3::new(-h, -h, -h),
            DVec3::new(-h, h, -h),
            DVec3::new(h, -h, -h),
            DVec3::new(h, h, -h),
            DVec3::new(h, -h, h),
            DVec3::new(h, h, h),
            DVec3::new(-h, -h, h),
            DVec3::new(-h, h, h),
        ];
        let polygons = vec![
            Polygon::quad(0, 1, 3, 2),
            Polygon::quad(2, 3, 5, 4),
            Polygon::quad(4, 5, 7, 6),
            Polygon::quad(6, 7, 1, 0),
            Polygon::quad(1, 7, 5, 3),
            Polygon::quad(6, 0, 2, 4),
        ];
        Self::new(points, polygons)
    }

    /// Flat grid of `cols` x `rows` quads in the XZ plane.
    pub fn plane(width: f64, depth: f64, cols: u32, rows: u32) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let mut points = Vec::with_capacity(((cols + 1) * (rows + 1)) as usize);
        for r in 0..=rows {
            for c in 0..=cols {
                let x = width * (c as f64 / cols as f64 - 0.5);
                let z = depth * (r as f64 / rows as f64 - 0.5);
                points.push(DVec3::new(x, 0.0, z));
            }
        }
        let stride = cols + 1;
        let mut polygons = Vec::with_capacity((cols * rows) as usize);
        for r in 0..rows {
            for c in 0..cols {
                let i = r * stride + c;
                polygons.push(Polygon::quad(i, i + stride, i + stride + 1, i + 1));
            }
        }
        Self::new(points, polygons)
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }
}

impl MeshView for Mesh {
    fn points(&self) -> &[DVec3] {
        &self.points
    }

    fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }
}

/// Instance node displaying another object's geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceNode {
    pub reference: NodeId,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// What a node holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Null,
    Mesh(Mesh),
    Instance(InstanceNode),
}

/// A scene node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Transform relative to the parent.
    pub transform: DAffine3,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    alive: bool,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn instance(&self) -> Option<&InstanceNode> {
        match &self.kind {
            NodeKind::Instance(i) => Some(i),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
enum UndoEntry {
    NewObject(NodeId),
    DeleteObject {
        id: NodeId,
        parent: Option<NodeId>,
        position: usize,
    },
    MoveObject {
        id: NodeId,
        parent: Option<NodeId>,
        position: usize,
        transform: DAffine3,
    },
}

#[derive(Clone, Debug, Default)]
struct UndoStack {
    done: Vec<Vec<UndoEntry>>,
    open: Vec<UndoEntry>,
    depth: usize,
}

/// In-memory scene graph.
///
/// Nodes live in an arena and are never deallocated; removing a node only
/// detaches it, which keeps undo cheap and ids stable.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scene {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    #[serde(skip)]
    undo: UndoStack,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a scene from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let scene: Self = serde_json::from_str(&text)?;
        scene.validate()?;
        debug!("Loaded scene {} ({} nodes)", path.display(), scene.len());
        Ok(scene)
    }

    /// Save the scene as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check parent/child links of a deserialized scene.
    fn validate(&self) -> Result<()> {
        let count = self.nodes.len();
        let in_range = |id: &NodeId| (id.0 as usize) < count;
        if !self.roots.iter().all(in_range) {
            return Err(Error::other("scene root id out of range"));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if !node.children.iter().all(in_range) || !node.parent.iter().all(in_range) {
                return Err(Error::other(format!("node {} links out of range", i)));
            }
            if let NodeKind::Instance(inst) = &node.kind {
                if !in_range(&inst.reference) {
                    return Err(Error::other(format!("node {} references missing object", i)));
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, name: &str, kind: NodeKind, parent: Option<NodeId>, transform: DAffine3) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            name: name.to_string(),
            transform,
            kind,
            parent: None,
            children: Vec::new(),
            alive: true,
        });
        match parent.filter(|p| self.node(*p).is_some()) {
            Some(p) => {
                self.nodes[p.0 as usize].children.push(id);
                self.nodes[id.0 as usize].parent = Some(p);
            }
            None => self.roots.push(id),
        }
        id
    }

    /// Add an empty grouping node. A dead or unknown parent adds at root level.
    pub fn add_null(&mut self, name: &str, parent: Option<NodeId>, transform: DAffine3) -> NodeId {
        self.push(name, NodeKind::Null, parent, transform)
    }

    /// Add a polygon object. A dead or unknown parent adds at root level.
    pub fn add_mesh(&mut self, name: &str, mesh: Mesh, parent: Option<NodeId>, transform: DAffine3) -> NodeId {
        self.push(name, NodeKind::Mesh(mesh), parent, transform)
    }

    /// Live node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).filter(|n| n.alive)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0 as usize)
            .filter(|n| n.alive)
            .ok_or_else(|| Error::ObjectNotFound(id.to_string()))
    }

    /// Top-level nodes in order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Depth-first traversal of the live hierarchy.
    ///
    /// Starts at `root` or, when `None`, at every top-level node. The iterator
    /// borrows the scene and is `Clone`, so a traversal can be restarted or
    /// forked without touching any shared state.
    pub fn descendants(&self, root: Option<NodeId>) -> Descendants<'_> {
        let stack = match root {
            Some(id) if self.node(id).is_some() => vec![id],
            Some(_) => Vec::new(),
            None => self.roots.iter().rev().copied().collect(),
        };
        Descendants { scene: self, stack }
    }

    /// All polygon objects in hierarchy order.
    pub fn mesh_objects(&self) -> Vec<NodeId> {
        self.descendants(None)
            .filter(|id| self.node(*id).is_some_and(|n| n.mesh().is_some()))
            .collect()
    }

    /// All instance nodes in hierarchy order.
    pub fn instances(&self) -> Vec<NodeId> {
        self.descendants(None)
            .filter(|id| self.node(*id).is_some_and(|n| n.instance().is_some()))
            .collect()
    }

    /// First node in hierarchy order with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.descendants(None)
            .find(|id| self.node(*id).is_some_and(|n| n.name == name))
    }

    /// Number of nodes reachable from the roots.
    pub fn len(&self) -> usize {
        self.descendants(None).count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Siblings list holding `id`: the parent's children or the roots.
    fn siblings_mut(&mut self, parent: Option<NodeId>) -> &mut Vec<NodeId> {
        match parent {
            Some(p) => &mut self.nodes[p.0 as usize].children,
            None => &mut self.roots,
        }
    }

    /// Detach `id` from its siblings, returning the position it held.
    fn detach(&mut self, id: NodeId) -> Option<usize> {
        let parent = self.nodes[id.0 as usize].parent;
        let siblings = self.siblings_mut(parent);
        let position = siblings.iter().position(|s| *s == id)?;
        siblings.remove(position);
        Some(position)
    }

    /// Parent and sibling position of a live node.
    fn slot(&self, id: NodeId) -> Option<(Option<NodeId>, usize)> {
        let parent = self.node(id)?.parent;
        let siblings = match parent {
            Some(p) => &self.nodes[p.0 as usize].children,
            None => &self.roots,
        };
        let position = siblings.iter().position(|s| *s == id).unwrap_or(usize::MAX);
        Some((parent, position))
    }

    /// Put `id` back at `position` under `parent`, wherever it is now.
    fn reattach(&mut self, id: NodeId, parent: Option<NodeId>, position: usize) {
        if self.is_attached(id) {
            self.detach(id);
        }
        self.nodes[id.0 as usize].parent = parent;
        let siblings = self.siblings_mut(parent);
        let position = position.min(siblings.len());
        siblings.insert(position, id);
    }

    fn is_attached(&self, id: NodeId) -> bool {
        let parent = self.nodes[id.0 as usize].parent;
        match parent {
            Some(p) => self.nodes[p.0 as usize].children.contains(&id),
            None => self.roots.contains(&id),
        }
    }

    /// Revert the most recent undo group. Returns false if there was none.
    pub fn undo(&mut self) -> bool {
        let Some(entries) = self.undo.done.pop() else {
            return false;
        };
        for entry in entries.into_iter().rev() {
            match entry {
                UndoEntry::NewObject(id) => {
                    if self.is_attached(id) {
                        self.detach(id);
                    }
                    self.nodes[id.0 as usize].alive = false;
                }
                UndoEntry::DeleteObject { id, parent, position } => {
                    self.nodes[id.0 as usize].alive = true;
                    self.reattach(id, parent, position);
                }
                UndoEntry::MoveObject { id, parent, position, transform } => {
                    self.nodes[id.0 as usize].transform = transform;
                    self.reattach(id, parent, position);
                }
            }
        }
        true
    }

    /// Number of undo groups available.
    pub fn undo_depth(&self) -> usize {
        self.undo.done.len()
    }
}

/// Depth-first iterator over live nodes, see [`Scene::descendants`].
#[derive(Clone)]
pub struct Descendants<'a> {
    scene: &'a Scene,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        if let Some(node) = self.scene.node(id) {
            self.stack.extend(node.children.iter().rev().copied());
        }
        Some(id)
    }
}

impl SceneHost for Scene {
    type Mesh = Mesh;

    fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    fn mesh(&self, id: NodeId) -> Option<&Mesh> {
        self.node(id).and_then(Node::mesh)
    }

    fn local_transform(&self, id: NodeId) -> Option<DAffine3> {
        self.node(id).map(|n| n.transform)
    }

    fn world_transform(&self, id: NodeId) -> Option<DAffine3> {
        let mut node = self.node(id)?;
        let mut world = node.transform;
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            world = node.transform * world;
        }
        Some(world)
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn create_instance(&mut self, reference: NodeId) -> Result<NodeId> {
        if self.node(reference).is_none() {
            return Err(Error::InstanceCreation(format!("reference {} does not exist", reference)));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            name: String::from("Instance"),
            transform: DAffine3::IDENTITY,
            kind: NodeKind::Instance(InstanceNode { reference, tags: Vec::new() }),
            parent: None,
            children: Vec::new(),
            alive: true,
        });
        Ok(id)
    }

    fn set_name(&mut self, id: NodeId, name: &str) -> Result<()> {
        self.node_mut(id)?.name = name.to_string();
        Ok(())
    }

    fn set_local_transform(&mut self, id: NodeId, transform: DAffine3) -> Result<()> {
        self.node_mut(id)?.transform = transform;
        Ok(())
    }

    fn add_tag(&mut self, id: NodeId, tag: Tag) -> Result<()> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Mesh(m) => m.tags.push(tag),
            NodeKind::Instance(i) => i.tags.push(tag),
            NodeKind::Null => return Err(Error::other(format!("node {} cannot hold tags", id))),
        }
        Ok(())
    }

    fn insert_after(&mut self, id: NodeId, pred: NodeId) -> Result<()> {
        let parent = self
            .node(pred)
            .ok_or_else(|| Error::ObjectNotFound(pred.to_string()))?
            .parent;
        self.node_mut(id)?;
        if self.is_attached(id) {
            self.detach(id);
        }
        self.nodes[id.0 as usize].parent = parent;
        let siblings = self.siblings_mut(parent);
        let position = siblings
            .iter()
            .position(|s| *s == pred)
            .map_or(siblings.len(), |p| p + 1);
        siblings.insert(position, id);
        Ok(())
    }

    fn move_under(&mut self, id: NodeId, parent: NodeId) -> Result<()> {
        self.node_mut(id)?;
        self.node_mut(parent)?;
        let mut up = Some(parent);
        while let Some(p) = up {
            if p == id {
                return Err(Error::other(format!("cannot move {} below itself", id)));
            }
            up = self.nodes[p.0 as usize].parent;
        }
        if self.is_attached(id) {
            self.detach(id);
        }
        self.nodes[id.0 as usize].parent = Some(parent);
        self.nodes[parent.0 as usize].children.push(id);
        Ok(())
    }

    fn remove(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?;
        self.detach(id);
        self.nodes[id.0 as usize].alive = false;
        Ok(())
    }

    fn start_undo(&mut self) {
        self.undo.depth += 1;
    }

    fn add_undo(&mut self, kind: UndoKind, id: NodeId) {
        let entry = match kind {
            UndoKind::NewObject => UndoEntry::NewObject(id),
            UndoKind::DeleteObject | UndoKind::MoveObject => {
                let Some((parent, position)) = self.slot(id) else {
                    warn!("Undo for missing object {} ignored", id);
                    return;
                };
                if kind == UndoKind::DeleteObject {
                    UndoEntry::DeleteObject { id, parent, position }
                } else {
                    let transform = self.nodes[id.0 as usize].transform;
                    UndoEntry::MoveObject { id, parent, position, transform }
                }
            }
        };
        if self.undo.depth == 0 {
            warn!("Undo recorded outside of an undo group");
            self.undo.done.push(vec![entry]);
        } else {
            self.undo.open.push(entry);
        }
    }

    fn end_undo(&mut self) {
        if self.undo.depth == 0 {
            return;
        }
        self.undo.depth -= 1;
        if self.undo.depth == 0 && !self.undo.open.is_empty() {
            let group = std::mem::take(&mut self.undo.open);
            self.undo.done.push(group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{affine_approx_eq, trs};

    fn names(scene: &Scene, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| scene.node(*id).unwrap().name.clone()).collect()
    }

    #[test]
    fn test_hierarchy_order() {
        let mut scene = Scene::new();
        let group = scene.add_null("Group", None, DAffine3::IDENTITY);
        let a = scene.add_mesh("A", Mesh::cube(1.0), Some(group), DAffine3::IDENTITY);
        let b = scene.add_mesh("B", Mesh::cube(1.0), Some(group), DAffine3::IDENTITY);
        let c = scene.add_mesh("C", Mesh::cube(1.0), None, DAffine3::IDENTITY);

        let all: Vec<_> = scene.descendants(None).collect();
        assert_eq!(all, vec![group, a, b, c]);
        assert_eq!(scene.mesh_objects(), vec![a, b, c]);
        assert_eq!(scene.find_by_name("B"), Some(b));
        assert_eq!(scene.len(), 4);
    }

    #[test]
    fn test_descendants_restartable() {
        let mut scene = Scene::new();
        let group = scene.add_null("Group", None, DAffine3::IDENTITY);
        scene.add_mesh("A", Mesh::cube(1.0), Some(group), DAffine3::IDENTITY);

        let walk = scene.descendants(Some(group));
        let first: Vec<_> = walk.clone().collect();
        let second: Vec<_> = walk.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_world_transform_composes_parents() {
        let mut scene = Scene::new();
        let parent = scene.add_null("P", None, trs(DVec3::new(10.0, 0.0, 0.0), DVec3::ZERO, 2.0));
        let child = scene.add_mesh("C", Mesh::cube(1.0), Some(parent), trs(DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO, 1.0));

        let world = scene.world_transform(child).unwrap();
        assert!((world.transform_point3(DVec3::ZERO) - DVec3::new(12.0, 0.0, 0.0)).length() < 1e-12);
        assert!(affine_approx_eq(&scene.local_transform(child).unwrap(), &trs(DVec3::X, DVec3::ZERO, 1.0), 1e-12));
    }

    #[test]
    fn test_insert_remove_undo() {
        let mut scene = Scene::new();
        let a = scene.add_mesh("A", Mesh::cube(1.0), None, DAffine3::IDENTITY);
        let b = scene.add_mesh("B", Mesh::cube(1.0), None, DAffine3::IDENTITY);

        scene.start_undo();
        let inst = scene.create_instance(b).unwrap();
        scene.set_name(inst, "A").unwrap();
        scene.add_undo(UndoKind::NewObject, inst);
        scene.insert_after(inst, a).unwrap();
        scene.add_undo(UndoKind::DeleteObject, a);
        scene.remove(a).unwrap();
        scene.end_undo();

        assert_eq!(scene.roots(), &[inst, b]);
        assert!(scene.node(a).is_none());
        assert_eq!(scene.instances(), vec![inst]);

        assert!(scene.undo());
        assert_eq!(scene.roots(), &[a, b]);
        assert!(scene.node(inst).is_none());
        assert_eq!(names(&scene, scene.roots()), vec!["A", "B"]);
        assert!(!scene.undo());
    }

    #[test]
    fn test_move_under_undo() {
        let mut scene = Scene::new();
        let p = scene.add_null("P", None, DAffine3::IDENTITY);
        let a = scene.add_mesh("A", Mesh::cube(1.0), Some(p), trs(DVec3::X, DVec3::ZERO, 1.0));
        let b = scene.add_mesh("B", Mesh::cube(1.0), Some(p), DAffine3::IDENTITY);
        let q = scene.add_null("Q", None, DAffine3::IDENTITY);

        scene.start_undo();
        for id in [a, b] {
            scene.add_undo(UndoKind::MoveObject, id);
            scene.move_under(id, q).unwrap();
            scene.set_local_transform(id, trs(DVec3::Y, DVec3::ZERO, 3.0)).unwrap();
        }
        scene.end_undo();

        assert_eq!(scene.children(q), vec![a, b]);
        assert!(scene.children(p).is_empty());
        assert_eq!(scene.parent(a), Some(q));

        assert!(scene.undo());
        assert_eq!(scene.children(p), vec![a, b]);
        assert!(scene.children(q).is_empty());
        assert_eq!(scene.parent(b), Some(p));
        assert!(affine_approx_eq(&scene.local_transform(a).unwrap(), &trs(DVec3::X, DVec3::ZERO, 1.0), 1e-12));
    }

    #[test]
    fn test_move_under_rejects_cycle() {
        let mut scene = Scene::new();
        let p = scene.add_null("P", None, DAffine3::IDENTITY);
        let c = scene.add_null("C", Some(p), DAffine3::IDENTITY);
        assert!(scene.move_under(p, c).is_err());
        assert!(scene.move_under(p, p).is_err());
        assert_eq!(scene.parent(c), Some(p));
        assert_eq!(scene.roots(), &[p]);
    }

    #[test]
    fn test_create_instance_missing_reference() {
        let mut scene = Scene::new();
        let err = scene.create_instance(NodeId(3)).unwrap_err();
        assert!(matches!(err, Error::InstanceCreation(_)));
    }

    #[test]
    fn test_add_tag_to_null_fails() {
        let mut scene = Scene::new();
        let n = scene.add_null("N", None, DAffine3::IDENTITY);
        let tag = Tag::Phong(Default::default());
        assert!(scene.add_tag(n, tag).is_err());
    }

    #[test]
    fn test_plane_topology() {
        let plane = Mesh::plane(2.0, 2.0, 3, 2);
        assert_eq!(plane.point_count(), 12);
        assert_eq!(plane.polygon_count(), 6);
        assert!(plane.polygons.iter().all(|p| p.indices().all(|i| (i as usize) < 12)));
    }

    #[test]
    fn test_save_load() {
        let mut scene = Scene::new();
        let group = scene.add_null("Group", None, DAffine3::IDENTITY);
        scene.add_mesh("Cube", Mesh::cube(2.0), Some(group), trs(DVec3::ONE, DVec3::ZERO, 1.0));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        scene.save(&path).unwrap();

        let loaded = Scene::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        let cube = loaded.find_by_name("Cube").unwrap();
        assert_eq!(loaded.mesh(cube).unwrap(), &Mesh::cube(2.0));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Scene::load("/nonexistent/scene.json").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
