//! Bucketing of objects by fingerprint.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::fingerprint::{Fingerprint, FingerprintBuilder};
use crate::progress::Progress;
use crate::sampler::LocalFrame;
use crate::scene::{MeshView, NodeId, SceneHost, TextureTag};
use crate::util::{Error, Result};

/// Object assigned to a bucket.
#[derive(Clone, Debug)]
pub struct GroupMember {
    pub id: NodeId,
    /// Frame of the first polygon in object space.
    pub frame: LocalFrame,
    /// Material tags at grouping time.
    pub material_tags: Vec<TextureTag>,
}

/// Objects sharing one fingerprint, in input order.
#[derive(Clone, Debug)]
pub struct Group {
    pub fingerprint: Fingerprint,
    pub members: Vec<GroupMember>,
    /// Index of the representative in `members`.
    rep: usize,
}

impl Group {
    /// Member the others are replaced by.
    ///
    /// The last member that is not nested below another member, so no
    /// replacement ever removes the representative with its subtree.
    pub fn representative(&self) -> Option<&GroupMember> {
        self.members.get(self.rep)
    }

    /// Members that would be replaced, in input order.
    pub fn duplicates(&self) -> impl Iterator<Item = &GroupMember> {
        let rep = self.rep;
        self.members.iter().enumerate().filter(move |(i, _)| *i != rep).map(|(_, m)| m)
    }

    /// Settle on the representative once all members are known.
    fn pick_representative<S: SceneHost + ?Sized>(&mut self, scene: &S) {
        let ids: HashSet<NodeId> = self.members.iter().map(|m| m.id).collect();
        let nested = |id: NodeId| {
            let mut up = scene.parent(id);
            while let Some(p) = up {
                if ids.contains(&p) {
                    return true;
                }
                up = scene.parent(p);
            }
            false
        };
        self.rep = self
            .members
            .iter()
            .rposition(|m| !nested(m.id))
            .unwrap_or(self.members.len().saturating_sub(1));
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of grouping.
#[derive(Clone, Debug, Default)]
pub struct Groups {
    buckets: Vec<Group>,
    index: HashMap<Fingerprint, usize>,
    unresolved: Vec<NodeId>,
}

impl Groups {
    fn insert(&mut self, fingerprint: Fingerprint, member: GroupMember) {
        match self.index.get(&fingerprint) {
            Some(&i) => self.buckets[i].members.push(member),
            None => {
                self.index.insert(fingerprint, self.buckets.len());
                self.buckets.push(Group { fingerprint, members: vec![member], rep: 0 });
            }
        }
    }

    /// All buckets in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.buckets.iter()
    }

    /// Buckets with at least two members.
    pub fn duplicated(&self) -> impl Iterator<Item = &Group> {
        self.buckets.iter().filter(|g| g.len() > 1)
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Objects that could not be fingerprinted.
    pub fn unresolved(&self) -> &[NodeId] {
        &self.unresolved
    }

    /// Objects placed in a bucket.
    pub fn resolved_count(&self) -> usize {
        self.buckets.iter().map(Group::len).sum()
    }

    /// Objects a substitution pass would replace.
    pub fn duplicate_count(&self) -> usize {
        self.buckets.iter().map(|g| g.len().saturating_sub(1)).sum()
    }
}

/// Fingerprints objects and buckets them.
#[derive(Clone, Copy, Debug)]
pub struct EquivalenceGrouper {
    builder: FingerprintBuilder,
}

impl EquivalenceGrouper {
    pub fn new(builder: FingerprintBuilder) -> Self {
        Self { builder }
    }

    /// Fingerprint one object and snapshot what substitution needs.
    pub fn member<S: SceneHost + ?Sized>(&self, scene: &S, id: NodeId) -> Result<(Fingerprint, GroupMember)> {
        let name = scene.name(id).ok_or_else(|| Error::ObjectNotFound(id.to_string()))?;
        let mesh = scene.mesh(id).ok_or_else(|| Error::NotAMesh(name.to_string()))?;
        let signature = self.builder.build(mesh, name)?;
        Ok((
            signature.fingerprint,
            GroupMember {
                id,
                frame: signature.frame,
                material_tags: mesh.texture_tags(),
            },
        ))
    }

    /// Bucket `objects` in input order, reporting 0-50% progress.
    ///
    /// Objects without usable geometry are logged and returned as unresolved;
    /// any other failure, such as an id the scene does not know, aborts.
    /// A repeated id is only considered the first time.
    pub fn group<S: SceneHost + ?Sized>(
        &self,
        scene: &S,
        objects: &[NodeId],
        progress: &mut Progress<'_>,
    ) -> Result<Groups> {
        let mut groups = Groups::default();
        let mut seen = HashSet::with_capacity(objects.len());

        for (i, &id) in objects.iter().enumerate() {
            if seen.insert(id) {
                match self.member(scene, id) {
                    Ok((fingerprint, member)) => {
                        debug!("{} {} -> {}", id, scene.name(id).unwrap_or_default(), fingerprint);
                        groups.insert(fingerprint, member);
                    }
                    Err(e) if e.is_per_object() => {
                        warn!("Skipping {}: {}", id, e);
                        groups.unresolved.push(id);
                    }
                    Err(e) => return Err(e),
                }
            }
            progress.step(i + 1, objects.len(), 0, 50);
        }
        for group in groups.buckets.iter_mut().filter(|g| g.len() > 1) {
            group.pick_representative(scene);
        }

        debug!(
            "{} objects in {} groups, {} unresolved",
            groups.resolved_count(),
            groups.len(),
            groups.unresolved.len()
        );
        Ok(groups)
    }
}
