//! Replacement of duplicates with instance nodes.

use tracing::debug;

use crate::grouper::{GroupMember, Groups};
use crate::progress::Progress;
use crate::scene::{NodeId, SceneHost, Tag, UndoGroup, UndoKind};
use crate::util::{DAffine3, Error, Result};

/// One replaced object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Newly created instance node.
    pub instance: NodeId,
    /// Object the instance displays.
    pub representative: NodeId,
    /// Object the instance took the place of (now removed).
    pub replaced: NodeId,
}

/// Local transform placing `rep`'s geometry where `member`'s geometry was.
///
/// The instance becomes a sibling of the member, so composing in the
/// member's local space gives the same world result.
pub fn relative_transform(member_local: DAffine3, member: &GroupMember, rep: &GroupMember) -> DAffine3 {
    member_local * member.frame.matrix() * rep.frame.inverse()
}

/// Applies a grouping to the scene.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstanceSubstitutor;

impl InstanceSubstitutor {
    pub fn new() -> Self {
        Self
    }

    /// Replace every non-representative member of every multi-member group.
    ///
    /// All edits go into one undo group which is closed even when an edit
    /// fails. Reports 50-100% progress and stops the progress bar on return.
    pub fn run<S: SceneHost + ?Sized>(
        &self,
        scene: &mut S,
        groups: &Groups,
        progress: &mut Progress<'_>,
    ) -> Result<Vec<InstanceRecord>> {
        let result = {
            let mut undo = UndoGroup::open(scene);
            Self::substitute_all(&mut *undo, groups, progress)
        };
        progress.stop();
        result
    }

    fn substitute_all<S: SceneHost + ?Sized>(
        scene: &mut S,
        groups: &Groups,
        progress: &mut Progress<'_>,
    ) -> Result<Vec<InstanceRecord>> {
        let total = groups.duplicate_count();
        let mut records = Vec::with_capacity(total);
        progress.step(0, total, 50, 50);

        for group in groups.duplicated() {
            let Some(rep) = group.representative() else {
                continue;
            };
            debug!(
                "Group {}: {} members, representative {} {}",
                group.fingerprint,
                group.len(),
                rep.id,
                scene.name(rep.id).unwrap_or_default()
            );

            for member in group.duplicates() {
                records.push(Self::substitute(scene, member, rep)?);
                progress.step(records.len(), total, 50, 50);
            }
        }
        Ok(records)
    }

    fn substitute<S: SceneHost + ?Sized>(scene: &mut S, member: &GroupMember, rep: &GroupMember) -> Result<InstanceRecord> {
        let missing = |id: NodeId| Error::ObjectNotFound(id.to_string());
        let local = scene.local_transform(member.id).ok_or_else(|| missing(member.id))?;
        let name = scene.name(member.id).ok_or_else(|| missing(member.id))?.to_string();

        let placement = relative_transform(local, member, rep);
        let instance = scene.create_instance(rep.id)?;
        scene.set_local_transform(instance, placement)?;
        scene.set_name(instance, &name)?;
        if member.material_tags != rep.material_tags {
            for tag in &member.material_tags {
                scene.add_tag(instance, Tag::Texture(tag.clone()))?;
            }
        }

        scene.add_undo(UndoKind::NewObject, instance);
        scene.insert_after(instance, member.id)?;

        // Children move under the instance and keep their world placement
        let rebase = placement.inverse() * local;
        for child in scene.children(member.id) {
            let child_local = scene.local_transform(child).ok_or_else(|| missing(child))?;
            scene.add_undo(UndoKind::MoveObject, child);
            scene.move_under(child, instance)?;
            scene.set_local_transform(child, rebase * child_local)?;
        }

        scene.add_undo(UndoKind::DeleteObject, member.id);
        scene.remove(member.id)?;

        debug!("Replaced {} {} with instance {}", member.id, name, instance);
        Ok(InstanceRecord { instance, representative: rep.id, replaced: member.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Consider};
    use crate::fingerprint::FingerprintBuilder;
    use crate::grouper::EquivalenceGrouper;
    use crate::progress::tests::Recorder;
    use crate::progress::ProgressSink;
    use crate::scene::{MaterialId, Mesh, MeshView, Scene, TextureTag};
    use crate::util::{affine_approx_eq, trs, DVec3};

    fn group(scene: &Scene, ids: &[NodeId], consider: Consider) -> Groups {
        let config = Config { consider, ..Config::default() };
        EquivalenceGrouper::new(FingerprintBuilder::new(&config))
            .group(scene, ids, &mut Progress::none())
            .unwrap()
    }

    fn world_points(scene: &Scene, id: NodeId, mesh: &Mesh) -> Vec<DVec3> {
        let world = scene.world_transform(id).unwrap();
        mesh.points().iter().map(|p| world.transform_point3(*p)).collect()
    }

    fn material(id: u64) -> Tag {
        Tag::Texture(TextureTag {
            name: "Mat".into(),
            material: Some(MaterialId(id)),
            ..TextureTag::default()
        })
    }

    #[test]
    fn test_replaces_all_but_last() {
        let mut scene = Scene::new();
        let parent = scene.add_null("Group", None, trs(DVec3::new(0.0, 1.0, 0.0), DVec3::ZERO, 2.0));
        let ids: Vec<NodeId> = (0..3)
            .map(|i| {
                let t = trs(DVec3::new(i as f64 * 3.0, 0.0, 0.0), DVec3::new(0.0, 0.0, i as f64 * 30.0), 1.0);
                scene.add_mesh(&format!("Cube{}", i), Mesh::cube(1.0), Some(parent), t)
            })
            .collect();

        let groups = group(&scene, &ids, Consider::default());
        let records = InstanceSubstitutor::new().run(&mut scene, &groups, &mut Progress::none()).unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.representative == ids[2]));
        assert!(scene.node(ids[0]).is_none());
        assert!(scene.node(ids[2]).is_some());

        let children = scene.node(parent).unwrap().children().to_vec();
        assert_eq!(children, vec![records[0].instance, records[1].instance, ids[2]]);
        assert_eq!(scene.node(records[0].instance).unwrap().name, "Cube0");
        assert_eq!(scene.undo_depth(), 1);
    }

    #[test]
    fn test_instance_keeps_world_placement() {
        let mut scene = Scene::new();
        // Same shape with the points baked into different object spaces
        let m = trs(DVec3::new(4.0, -1.0, 2.0), DVec3::new(0.0, 90.0, 45.0), 2.0);
        let mut baked = Mesh::cube(1.0);
        for p in &mut baked.points {
            *p = m.transform_point3(*p);
        }
        let a = scene.add_mesh("A", baked, None, trs(DVec3::new(1.0, 2.0, 3.0), DVec3::new(10.0, 0.0, 0.0), 1.0));
        let b = scene.add_mesh("B", Mesh::cube(1.0), None, trs(DVec3::ZERO, DVec3::new(0.0, 0.0, 20.0), 0.5));

        let expected: Vec<DVec3> = {
            let world = scene.world_transform(a).unwrap();
            scene.mesh(a).unwrap().points().iter().map(|p| world.transform_point3(*p)).collect()
        };

        let groups = group(&scene, &[a, b], Consider::default());
        let records = InstanceSubstitutor::new().run(&mut scene, &groups, &mut Progress::none()).unwrap();
        assert_eq!(records.len(), 1);

        let world = scene.world_transform(records[0].instance).unwrap();
        let rep = scene.mesh(b).unwrap();
        for (p, e) in rep.points().iter().zip(&expected) {
            assert!((world.transform_point3(*p) - *e).length() < 1e-9);
        }
    }

    #[test]
    fn test_children_follow_instance() {
        let mut scene = Scene::new();
        let a = scene.add_mesh("A", Mesh::cube(1.0), None, trs(DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 30.0, 0.0), 1.5));
        let plane = scene.add_mesh(
            "Plane",
            Mesh::plane(1.0, 1.0, 1, 1),
            Some(a),
            trs(DVec3::new(0.0, 2.0, 0.0), DVec3::new(10.0, 0.0, 0.0), 1.0),
        );
        // Same shape as A with the points baked differently, so the instance
        // transform differs from A's
        let m = trs(DVec3::new(1.0, -2.0, 0.5), DVec3::new(0.0, 0.0, 60.0), 2.0);
        let mut baked = Mesh::cube(1.0);
        for p in &mut baked.points {
            *p = m.transform_point3(*p);
        }
        let b = scene.add_mesh("B", baked, None, trs(DVec3::new(-3.0, 0.0, 0.0), DVec3::new(0.0, 0.0, 45.0), 0.5));

        let plane_world = scene.world_transform(plane).unwrap();
        let plane_local = scene.local_transform(plane).unwrap();

        let groups = group(&scene, &[a, b], Consider::default());
        let records = InstanceSubstitutor::new().run(&mut scene, &groups, &mut Progress::none()).unwrap();
        assert_eq!(records.len(), 1);
        let instance = records[0].instance;

        assert_eq!(scene.parent(plane), Some(instance));
        assert!(affine_approx_eq(&scene.world_transform(plane).unwrap(), &plane_world, 1e-9));
        assert_eq!(scene.mesh_objects(), vec![plane, b]);

        assert!(scene.undo());
        assert_eq!(scene.roots(), &[a, b]);
        assert_eq!(scene.children(a), vec![plane]);
        assert!(affine_approx_eq(&scene.local_transform(plane).unwrap(), &plane_local, 1e-12));
        assert!(scene.instances().is_empty());
    }

    #[test]
    fn test_nested_member_keeps_representative() {
        let mut scene = Scene::new();
        let outer = scene.add_mesh("Outer", Mesh::cube(1.0), None, trs(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 20.0, 0.0), 1.0));
        let inner = scene.add_mesh(
            "Inner",
            Mesh::cube(1.0),
            Some(outer),
            trs(DVec3::new(0.0, 3.0, 0.0), DVec3::new(15.0, 0.0, 0.0), 1.0),
        );
        let expected = world_points(&scene, inner, scene.mesh(inner).unwrap());

        let groups = group(&scene, &[outer, inner], Consider::default());
        let records = InstanceSubstitutor::new().run(&mut scene, &groups, &mut Progress::none()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].representative, outer);
        assert_eq!(records[0].replaced, inner);

        let instance = records[0].instance;
        assert!(scene.node(inner).is_none());
        assert!(scene.world_transform(outer).is_some());
        assert_eq!(scene.parent(instance), Some(outer));
        assert_eq!(scene.node(instance).and_then(|n| n.instance()).map(|i| i.reference), Some(outer));

        let after = world_points(&scene, instance, scene.mesh(outer).unwrap());
        for (a, e) in after.iter().zip(&expected) {
            assert!((*a - *e).length() < 1e-9);
        }
    }

    #[test]
    fn test_identical_object_space_keeps_transform() {
        let mut scene = Scene::new();
        let t = trs(DVec3::new(7.0, 0.0, 0.0), DVec3::new(0.0, 33.0, 0.0), 1.0);
        let a = scene.add_mesh("A", Mesh::cube(1.0), None, t);
        let b = scene.add_mesh("B", Mesh::cube(1.0), None, DAffine3::IDENTITY);
        let groups = group(&scene, &[a, b], Consider::default());
        let records = InstanceSubstitutor::new().run(&mut scene, &groups, &mut Progress::none()).unwrap();
        let local = scene.local_transform(records[0].instance).unwrap();
        assert!(affine_approx_eq(&local, &t, 1e-9));
    }

    #[test]
    fn test_differing_materials_copied() {
        let mut scene = Scene::new();
        let a = scene.add_mesh("A", Mesh::cube(1.0).with_tag(material(1)), None, DAffine3::IDENTITY);
        let b = scene.add_mesh("B", Mesh::cube(1.0).with_tag(material(2)), None, DAffine3::IDENTITY);
        let c = scene.add_mesh("C", Mesh::cube(1.0).with_tag(material(2)), None, DAffine3::IDENTITY);

        let groups = group(&scene, &[a, b, c], Consider { materials: false, ..Consider::default() });
        let records = InstanceSubstitutor::new().run(&mut scene, &groups, &mut Progress::none()).unwrap();
        assert_eq!(records.len(), 2);

        let tags = |id| scene.node(id).unwrap().instance().unwrap().tags.clone();
        assert_eq!(tags(records[0].instance), vec![material(1)]);
        assert!(tags(records[1].instance).is_empty());
    }

    #[test]
    fn test_undo_restores() {
        let mut scene = Scene::new();
        let a = scene.add_mesh("A", Mesh::cube(1.0), None, DAffine3::IDENTITY);
        let b = scene.add_mesh("B", Mesh::cube(1.0), None, DAffine3::IDENTITY);
        let groups = group(&scene, &[a, b], Consider::default());
        InstanceSubstitutor::new().run(&mut scene, &groups, &mut Progress::none()).unwrap();
        assert_eq!(scene.instances().len(), 1);

        assert!(scene.undo());
        assert_eq!(scene.roots(), &[a, b]);
        assert!(scene.instances().is_empty());
    }

    #[test]
    fn test_failure_closes_undo_group() {
        let mut scene = Scene::new();
        let a1 = scene.add_mesh("A1", Mesh::cube(1.0), None, DAffine3::IDENTITY);
        let a2 = scene.add_mesh("A2", Mesh::cube(1.0), None, DAffine3::IDENTITY);
        let p1 = scene.add_mesh("P1", Mesh::plane(1.0, 1.0, 1, 1), None, DAffine3::IDENTITY);
        let p2 = scene.add_mesh("P2", Mesh::plane(1.0, 1.0, 1, 1), None, DAffine3::IDENTITY);
        let groups = group(&scene, &[a1, a2, p1, p2], Consider::default());

        // representative vanishes between grouping and substitution
        scene.remove(p2).unwrap();

        let mut rec = Recorder::default();
        let err = {
            let mut progress = Progress::new(Some(&mut rec as &mut dyn ProgressSink));
            InstanceSubstitutor::new().run(&mut scene, &groups, &mut progress).unwrap_err()
        };
        assert!(matches!(err, Error::InstanceCreation(_)));
        assert!(rec.stopped);
        assert_eq!(scene.undo_depth(), 1);
        assert!(scene.node(a1).is_none());

        assert!(scene.undo());
        assert_eq!(scene.roots(), &[a1, a2, p1]);
    }

    #[test]
    fn test_progress_second_half() {
        let mut scene = Scene::new();
        let ids: Vec<NodeId> = (0..3)
            .map(|i| scene.add_mesh(&format!("C{}", i), Mesh::cube(1.0), None, DAffine3::IDENTITY))
            .collect();
        let groups = group(&scene, &ids, Consider::default());
        let mut rec = Recorder::default();
        {
            let mut progress = Progress::new(Some(&mut rec as &mut dyn ProgressSink));
            InstanceSubstitutor::new().run(&mut scene, &groups, &mut progress).unwrap();
        }
        assert_eq!(rec.values, vec![50, 75, 100]);
        assert!(rec.stopped);
    }

    #[test]
    fn test_nothing_to_do() {
        let mut scene = Scene::new();
        let a = scene.add_mesh("A", Mesh::cube(1.0), None, DAffine3::IDENTITY);
        let groups = group(&scene, &[a], Consider::default());
        let records = InstanceSubstitutor::new().run(&mut scene, &groups, &mut Progress::none()).unwrap();
        assert!(records.is_empty());
        assert_eq!(scene.undo_depth(), 0);
    }
}
