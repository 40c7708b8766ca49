//! Transform-invariant geometry sampling.
//!
//! A mesh is reduced to a set of sampled points expressed in a local frame
//! derived from its first polygon. Two congruent meshes with the same point
//! order produce the same frame-local coordinates no matter where they sit
//! in the world, how they are rotated, or how they are uniformly scaled.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spooky_hash::SpookyHash;
use std::collections::{BTreeSet, HashMap};

use crate::scene::MeshView;
use crate::util::{affine_from_basis, DAffine3, DVec3, Error, Result};

/// Relative tolerance for a collinear first polygon.
const COLLINEAR_EPSILON: f64 = 1e-9;

/// Affine frame spanned by an object's first polygon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalFrame {
    matrix: DAffine3,
    inverse: DAffine3,
}

impl LocalFrame {
    /// Build the frame from the first polygon of `mesh`.
    ///
    /// origin = point a, y = normalized (b - a), z = normalized (y x (c - a)),
    /// x = y x z, each axis scaled by |b - a|.
    pub fn from_mesh<M: MeshView + ?Sized>(mesh: &M, name: &str) -> Result<Self> {
        let poly = mesh
            .polygons()
            .first()
            .ok_or_else(|| Error::NoGeometry(name.to_string()))?;

        let points = mesh.points();
        let fetch = |index: u32| {
            points
                .get(index as usize)
                .copied()
                .ok_or_else(|| Error::InvalidPolygon {
                    name: name.to_string(),
                    index,
                    count: points.len(),
                })
        };
        let origin = fetch(poly.a)?;
        let b = fetch(poly.b)?;
        let c = fetch(poly.c)?;

        let degenerate = || Error::DegenerateFrame(name.to_string());

        let edge1 = b - origin;
        let scale = edge1.length();
        let edge1 = edge1.try_normalize().ok_or_else(degenerate)?;

        let ac = c - origin;
        let normal = edge1.cross(ac);
        if normal.length() <= COLLINEAR_EPSILON * ac.length() || !normal.is_finite() {
            return Err(degenerate());
        }
        let edge3 = normal.normalize();
        let edge2 = edge1.cross(edge3);

        let matrix = affine_from_basis(edge2 * scale, edge1 * scale, edge3 * scale, origin);
        Ok(Self { matrix, inverse: matrix.inverse() })
    }

    /// Frame-to-object transform.
    pub fn matrix(&self) -> DAffine3 {
        self.matrix
    }

    /// Object-to-frame transform.
    pub fn inverse(&self) -> DAffine3 {
        self.inverse
    }

    pub fn origin(&self) -> DVec3 {
        self.matrix.translation
    }

    /// Length of the first polygon edge.
    pub fn scale(&self) -> f64 {
        self.matrix.matrix3.y_axis.length()
    }

    /// Map an object-space point into frame coordinates.
    #[inline]
    pub fn to_local(&self, p: DVec3) -> DVec3 {
        self.inverse.transform_point3(p)
    }
}

/// Draw min(`desired`, `point_count`) distinct indices.
///
/// Both strategies run the same forward Fisher-Yates over the same random
/// draws, so the result depends only on the arguments, not on the strategy.
pub fn sample_indices(point_count: usize, desired: usize, seed: u64) -> Vec<usize> {
    let count = desired.min(point_count);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    if count * 3 < point_count {
        sample_sparse(point_count, count, &mut rng)
    } else {
        sample_dense(point_count, count, &mut rng)
    }
}

/// Partial shuffle tracking only displaced slots.
fn sample_sparse(n: usize, k: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut displaced: HashMap<usize, usize> = HashMap::with_capacity(k * 2);
    let mut out = Vec::with_capacity(k);
    for i in 0..k {
        let j = rng.random_range(i..n);
        let at_j = displaced.get(&j).copied().unwrap_or(j);
        let at_i = displaced.get(&i).copied().unwrap_or(i);
        displaced.insert(j, at_i);
        out.push(at_j);
    }
    out
}

/// Partial shuffle of the full index vector.
fn sample_dense(n: usize, k: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.random_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

/// Round `v` to `precision` decimals, returned as an integer multiple of 10^-precision.
#[inline]
pub fn quantize(v: f64, precision: u32) -> i64 {
    let q = (v * 10f64.powi(precision as i32)).round();
    // -0.0 and 0.0 must land in the same bucket
    if q == 0.0 { 0 } else { q as i64 }
}

/// Frame-local sample coordinates after rounding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampledPointSet {
    points: BTreeSet<[i64; 3]>,
}

impl SampledPointSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 128-bit digest of the set, independent of sampling order.
    ///
    /// Coordinates are hashed as little-endian words.
    pub fn digest(&self) -> (u64, u64) {
        let flat: Vec<i64> = self.points.iter().flatten().map(|v| v.to_le()).collect();
        SpookyHash::hash128(bytemuck::cast_slice(flat.as_slice()), 0, 0)
    }
}

/// Map sampled points into frame space and round them.
pub fn canonicalize<M: MeshView + ?Sized>(
    mesh: &M,
    frame: &LocalFrame,
    indices: &[usize],
    precision: u32,
) -> SampledPointSet {
    let points = mesh.points();
    let points = indices
        .iter()
        .filter_map(|&i| points.get(i))
        .map(|&p| {
            let local = frame.to_local(p);
            [
                quantize(local.x, precision),
                quantize(local.y, precision),
                quantize(local.z, precision),
            ]
        })
        .collect();
    SampledPointSet { points }
}

/// Sampling parameters bundled for repeated use over many objects.
#[derive(Clone, Copy, Debug)]
pub struct GeometrySampler {
    pub precision: u32,
    pub samples: usize,
    pub seed: u64,
}

impl GeometrySampler {
    pub fn new(precision: u32, samples: usize, seed: u64) -> Self {
        Self { precision, samples, seed }
    }

    /// Sample and canonicalize `mesh` in `frame`.
    pub fn sample<M: MeshView + ?Sized>(&self, mesh: &M, frame: &LocalFrame) -> SampledPointSet {
        let indices = sample_indices(mesh.point_count(), self.samples, self.seed);
        canonicalize(mesh, frame, &indices, self.precision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Mesh, Polygon};
    use crate::util::trs;

    fn transformed(mesh: &Mesh, m: DAffine3) -> Mesh {
        let mut out = mesh.clone();
        for p in &mut out.points {
            *p = m.transform_point3(*p);
        }
        out
    }

    #[test]
    fn test_frame_requires_polygons() {
        let mesh = Mesh::new(vec![DVec3::ZERO, DVec3::X, DVec3::Y], Vec::new());
        let err = LocalFrame::from_mesh(&mesh, "Empty").unwrap_err();
        assert!(matches!(err, Error::NoGeometry(ref n) if n == "Empty"));
    }

    #[test]
    fn test_frame_invalid_index() {
        let mesh = Mesh::new(vec![DVec3::ZERO, DVec3::X], vec![Polygon::tri(0, 1, 5)]);
        let err = LocalFrame::from_mesh(&mesh, "Broken").unwrap_err();
        assert!(matches!(err, Error::InvalidPolygon { index: 5, count: 2, .. }));
    }

    #[test]
    fn test_frame_degenerate() {
        let collinear = Mesh::new(
            vec![DVec3::ZERO, DVec3::X, DVec3::X * 2.0],
            vec![Polygon::tri(0, 1, 2)],
        );
        assert!(matches!(
            LocalFrame::from_mesh(&collinear, "Line"),
            Err(Error::DegenerateFrame(_))
        ));

        let coincident = Mesh::new(vec![DVec3::ONE, DVec3::ONE, DVec3::Y], vec![Polygon::tri(0, 1, 2)]);
        assert!(matches!(
            LocalFrame::from_mesh(&coincident, "Dot"),
            Err(Error::DegenerateFrame(_))
        ));
    }

    #[test]
    fn test_frame_maps_first_polygon() {
        let mesh = Mesh::cube(2.0);
        let frame = LocalFrame::from_mesh(&mesh, "Cube").unwrap();
        let poly = mesh.polygons[0];

        assert!((frame.scale() - 2.0).abs() < 1e-12);
        assert_eq!(frame.origin(), mesh.points[poly.a as usize]);
        let b = frame.to_local(mesh.points[poly.b as usize]);
        assert!((b - DVec3::Y).length() < 1e-12);
    }

    #[test]
    fn test_frame_tracks_transform() {
        let mesh = Mesh::cube(1.0);
        let m = trs(DVec3::new(5.0, -2.0, 1.0), DVec3::new(30.0, 45.0, 60.0), 3.0);
        let moved = transformed(&mesh, m);

        let a = LocalFrame::from_mesh(&mesh, "A").unwrap();
        let b = LocalFrame::from_mesh(&moved, "B").unwrap();
        let expected = m * a.matrix();
        assert!(crate::util::affine_approx_eq(&b.matrix(), &expected, 1e-9));
    }

    #[test]
    fn test_canonical_points_invariant() {
        let mesh = Mesh::plane(4.0, 3.0, 5, 4);
        let sampler = GeometrySampler::new(3, 100, 7);
        let base = sampler.sample(&mesh, &LocalFrame::from_mesh(&mesh, "A").unwrap());

        let m = trs(DVec3::new(-3.0, 8.0, 2.0), DVec3::new(90.0, 0.0, 90.0), 0.5);
        let moved = transformed(&mesh, m);
        let other = sampler.sample(&moved, &LocalFrame::from_mesh(&moved, "B").unwrap());

        assert_eq!(base.len(), mesh.point_count());
        assert_eq!(base, other);
        assert_eq!(base.digest(), other.digest());
    }

    #[test]
    fn test_sample_count_and_distinct() {
        for (n, k) in [(10, 100), (10, 10), (100, 10), (1000, 5), (0, 5)] {
            let idx = sample_indices(n, k, 12345);
            assert_eq!(idx.len(), k.min(n));
            let unique: BTreeSet<_> = idx.iter().copied().collect();
            assert_eq!(unique.len(), idx.len());
            assert!(idx.iter().all(|&i| i < n));
        }
    }

    #[test]
    fn test_sample_deterministic() {
        assert_eq!(sample_indices(5000, 50, 1), sample_indices(5000, 50, 1));
        assert_ne!(sample_indices(5000, 50, 1), sample_indices(5000, 50, 2));
    }

    #[test]
    fn test_strategies_agree() {
        for (n, k) in [(1000, 10), (50, 40), (7, 7), (300, 99)] {
            let mut a = ChaCha8Rng::seed_from_u64(99);
            let mut b = ChaCha8Rng::seed_from_u64(99);
            assert_eq!(sample_sparse(n, k, &mut a), sample_dense(n, k, &mut b), "n={} k={}", n, k);
        }
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(1.23449, 3), 1234);
        assert_eq!(quantize(1.2346, 3), 1235);
        assert_eq!(quantize(-0.0001, 3), 0);
        assert_eq!(quantize(-0.0, 0), 0);
        assert_eq!(quantize(2.6, 0), 3);
    }

    #[test]
    fn test_rounding_collapses_noise() {
        let mut mesh = Mesh::cube(1.0);
        mesh.points.push(mesh.points[4] + DVec3::splat(1e-9));
        let frame = LocalFrame::from_mesh(&mesh, "Cube").unwrap();
        let set = GeometrySampler::new(3, 100, 0).sample(&mesh, &frame);
        assert_eq!(set.len(), 8);
    }

    #[test]
    fn test_digest_byte_layout() {
        let mesh = Mesh::cube(1.0);
        let frame = LocalFrame::from_mesh(&mesh, "Cube").unwrap();
        let set = GeometrySampler::new(2, 100, 0).sample(&mesh, &frame);

        let mut bytes = Vec::new();
        for p in &set.points {
            for v in p {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        assert_eq!(bytes.len(), set.len() * 24);
        assert_eq!(set.digest(), SpookyHash::hash128(&bytes, 0, 0));
    }
}
