//! Math type re-exports and affine helpers.
//!
//! Everything here is double precision: frames are rebuilt from point data
//! and then inverted, and single precision noise would leak into the
//! quantized sample coordinates.

// Re-export glam types
pub use glam::{
    DVec2, DVec3, DVec4,
    DMat3, DMat4,
    DQuat,
    DAffine3,
};

/// Build an affine transform from three basis vectors and an origin.
#[inline]
pub fn affine_from_basis(x: DVec3, y: DVec3, z: DVec3, origin: DVec3) -> DAffine3 {
    DAffine3::from_cols(x, y, z, origin)
}

/// Component-wise comparison of two affine transforms.
pub fn affine_approx_eq(a: &DAffine3, b: &DAffine3, eps: f64) -> bool {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .all(|(x, y)| (x - y).abs() <= eps)
}

/// Translation + rotation (degrees, XYZ order) + uniform scale.
pub fn trs(translation: DVec3, rotation_deg: DVec3, scale: f64) -> DAffine3 {
    let rot = DQuat::from_euler(
        glam::EulerRot::XYZ,
        rotation_deg.x.to_radians(),
        rotation_deg.y.to_radians(),
        rotation_deg.z.to_radians(),
    );
    DAffine3::from_scale_rotation_translation(DVec3::splat(scale), rot, translation)
}
