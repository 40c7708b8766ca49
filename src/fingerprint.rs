//! Composite mesh fingerprints.
//!
//! A fingerprint hashes point and polygon counts, the canonical sample set
//! and the tag data selected by [`Consider`]. Equal fingerprints are a strong
//! hint that two objects are copies of each other up to placement; they are
//! not a proof. All hashing goes through SpookyHash so values are stable
//! across runs and processes.

use spooky_hash::SpookyHash;
use std::fmt;
use std::hash::Hasher;

use crate::config::{Config, Consider};
use crate::sampler::{GeometrySampler, LocalFrame};
use crate::scene::{Container, MeshView, SelectionKind, SelectionTag, Tag, TextureTag, Value};
use crate::util::Result;

// Domain bytes keep different tag kinds from colliding on equal payloads.
const DOMAIN_TEXTURE: u8 = 1;
const DOMAIN_NORMALS: u8 = 2;
const DOMAIN_PHONG: u8 = 3;
const DOMAIN_UVW: u8 = 4;
const DOMAIN_SELECTION: u8 = 5;
const DOMAIN_OTHER: u8 = 6;

/// 128-bit mesh fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64, pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.0, self.1)
    }
}

/// Fingerprint plus the frame it was computed in.
#[derive(Clone, Copy, Debug)]
pub struct MeshSignature {
    pub fingerprint: Fingerprint,
    pub frame: LocalFrame,
}

#[inline]
fn write_f64(h: &mut SpookyHash, v: f64) {
    // +0/-0 and every NaN hash alike
    let v = if v == 0.0 { 0.0 } else if v.is_nan() { f64::NAN } else { v };
    h.write_u64(v.to_bits());
}

#[inline]
fn write_str(h: &mut SpookyHash, s: &str) {
    h.write_u64(s.len() as u64);
    h.write(s.as_bytes());
}

fn write_value(h: &mut SpookyHash, value: &Value) {
    match value {
        Value::Bool(b) => {
            h.write_u8(0);
            h.write_u8(*b as u8);
        }
        Value::Int(i) => {
            h.write_u8(1);
            h.write_i64(*i);
        }
        Value::Float(f) => {
            h.write_u8(2);
            write_f64(h, *f);
        }
        Value::String(s) => {
            h.write_u8(3);
            write_str(h, s);
        }
        Value::Vector(v) => {
            h.write_u8(4);
            write_f64(h, v.x);
            write_f64(h, v.y);
            write_f64(h, v.z);
        }
        Value::Link(id) => {
            h.write_u8(5);
            h.write_u64(*id);
        }
        Value::Container(c) => {
            h.write_u8(6);
            write_container(h, c);
        }
    }
}

/// Recursive hash over every entry, nested containers included.
fn write_container(h: &mut SpookyHash, c: &Container) {
    h.write_u64(c.entries.len() as u64);
    for (id, value) in &c.entries {
        h.write_u32(*id);
        write_value(h, value);
    }
}

/// Length-prefixed little-endian words.
fn write_indices(h: &mut SpookyHash, indices: &[u32]) {
    let words: Vec<u32> = indices.iter().map(|i| i.to_le()).collect();
    h.write_u64(words.len() as u64);
    h.write(bytemuck::cast_slice(words.as_slice()));
}

fn write_words(h: &mut SpookyHash, words: &[u64]) {
    let words: Vec<u64> = words.iter().map(|w| w.to_le()).collect();
    h.write(bytemuck::cast_slice(words.as_slice()));
}

fn payload_hash(domain: u8, payload: &[u8]) -> u64 {
    let mut h = SpookyHash::new(domain as u64, 0);
    h.write(payload);
    h.finish()
}

/// Element count a selection of `kind` indexes into.
fn selection_limit<M: MeshView + ?Sized>(mesh: &M, kind: SelectionKind) -> usize {
    match kind {
        SelectionKind::Polygon => mesh.polygon_count(),
        SelectionKind::Point => mesh.point_count(),
        SelectionKind::Edge => mesh.polygon_count() * 4,
    }
}

/// Polygon selection tag named `name`, if the mesh has one.
fn polygon_selection<'m, M: MeshView + ?Sized>(mesh: &'m M, name: &str) -> Option<&'m SelectionTag> {
    mesh.tags().iter().find_map(|t| match t {
        Tag::Selection(s) if s.kind == SelectionKind::Polygon && s.name == name => Some(s),
        _ => None,
    })
}

/// Builds fingerprints for one configuration.
#[derive(Clone, Copy, Debug)]
pub struct FingerprintBuilder {
    sampler: GeometrySampler,
    consider: Consider,
}

impl FingerprintBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            sampler: GeometrySampler::new(config.precision, config.samples, config.seed),
            consider: config.consider,
        }
    }

    /// Hash contribution of the tag at position `index`, `None` if the tag is
    /// not considered or lacks the data it would be identified by.
    pub fn tag_fingerprint<M: MeshView + ?Sized>(&self, mesh: &M, index: usize, tag: &Tag) -> Option<u64> {
        let c = &self.consider;
        match tag {
            Tag::Texture(t) if c.materials => texture_fingerprint(mesh, index, t),
            Tag::Phong(phong) if c.normals => {
                // Explicit normals override phong shading, so hash those when present
                let normals = mesh.tags().iter().find_map(|t| match t {
                    Tag::Normal(n) => Some(n),
                    _ => None,
                });
                Some(match normals {
                    Some(n) => payload_hash(DOMAIN_NORMALS, &n.payload),
                    None => {
                        let mut h = SpookyHash::new(DOMAIN_PHONG as u64, 0);
                        write_container(&mut h, &phong.data);
                        h.finish()
                    }
                })
            }
            Tag::Normal(n) if c.normals => Some(payload_hash(DOMAIN_NORMALS, &n.payload)),
            Tag::Uvw(uv) if c.uvs => Some(payload_hash(DOMAIN_UVW, &uv.payload)),
            Tag::Selection(s) if c.selections => {
                let mut h = SpookyHash::new(DOMAIN_SELECTION as u64, 0);
                write_str(&mut h, &s.name);
                h.write_u8(s.kind as u8);
                write_indices(&mut h, &s.normalized(selection_limit(mesh, s.kind)));
                Some(h.finish())
            }
            Tag::Other(o) if c.other_tags => {
                let mut h = SpookyHash::new(DOMAIN_OTHER as u64, 0);
                h.write_u32(o.type_id);
                write_str(&mut h, &o.name);
                write_container(&mut h, &o.data);
                Some(h.finish())
            }
            _ => None,
        }
    }

    /// Compute the fingerprint of `mesh`.
    ///
    /// Fails with the frame error when the mesh has no usable first polygon.
    pub fn build<M: MeshView + ?Sized>(&self, mesh: &M, name: &str) -> Result<MeshSignature> {
        let frame = LocalFrame::from_mesh(mesh, name)?;
        let (s1, s2) = self.sampler.sample(mesh, &frame).digest();

        let mut h = SpookyHash::default();
        h.write_u64(mesh.point_count() as u64);
        h.write_u64(mesh.polygon_count() as u64);
        h.write_u64(s1);
        h.write_u64(s2);

        if self.consider.uvs {
            let uvw = mesh.tags().iter().find_map(|t| match t {
                Tag::Uvw(uv) => Some(uv),
                _ => None,
            });
            match uvw {
                Some(uv) => {
                    h.write_u8(2);
                    h.write_u64(payload_hash(DOMAIN_UVW, &uv.payload));
                }
                None => h.write_u8(1),
            }
        } else {
            h.write_u8(0);
        }

        let ordered: Vec<u64> = mesh
            .tags()
            .iter()
            .enumerate()
            .filter_map(|(i, tag)| self.tag_fingerprint(mesh, i, tag))
            .collect();
        let mut multiset = ordered.clone();
        multiset.sort_unstable();
        h.write_u64(multiset.len() as u64);
        write_words(&mut h, &multiset);

        if self.consider.tag_order {
            write_words(&mut h, &ordered);
        }

        let (a, b) = h.finalize();
        Ok(MeshSignature { fingerprint: Fingerprint(a, b), frame })
    }
}

fn texture_fingerprint<M: MeshView + ?Sized>(mesh: &M, index: usize, tag: &TextureTag) -> Option<u64> {
    let material = tag.material?;

    let mut h = SpookyHash::new(DOMAIN_TEXTURE as u64, 0);
    h.write_u64(index as u64);
    h.write_u64(material.0);

    match &tag.restriction {
        Some(name) => {
            h.write_u8(1);
            write_str(&mut h, name);
            // A restriction naming a missing selection only hashes the name
            if let Some(sel) = polygon_selection(mesh, name) {
                write_indices(&mut h, &sel.normalized(mesh.polygon_count()));
            }
        }
        None => h.write_u8(0),
    }

    write_container(&mut h, &tag.data);
    Some(h.finish())
}
