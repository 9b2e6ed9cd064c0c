//! Quake → GL space conversion and view-frustum culling.
//!
//! Quake is Z-up, GL is Y-up: every position or direction crossing from the
//! level data into a vertex buffer or a matrix goes through [`to_gl`].

use glam::{Mat4, Vec3, Vec4};

/// Six clip planes `(a, b, c, d)`: left, right, bottom, top, near, far.
pub type Frustum = [Vec4; 6];

/// `(x, y, z)` Quake → `(x, z, -y)` GL.
#[inline]
pub fn to_gl(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

/// Quake bounding box → GL bounding box. The `y` axis flips sign, so the
/// GL `z` extent comes from the opposite corner.
#[inline]
pub fn box_to_gl(mins: Vec3, maxs: Vec3) -> [Vec3; 2] {
    [
        Vec3::new(mins.x, mins.z, -maxs.y),
        Vec3::new(maxs.x, maxs.z, -mins.y),
    ]
}

/// Clip planes of `mvp` (Gribb/Hartmann), not normalised.
pub fn extract_view_planes(mvp: &Mat4) -> Frustum {
    let (r0, r1, r2, r3) = (mvp.row(0), mvp.row(1), mvp.row(2), mvp.row(3));
    [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2]
}

/// Positive-vertex test: the box is rejected only when its corner farthest
/// along a plane's normal is still behind that plane.
pub fn intersect_frustum_aabb(planes: &Frustum, bbox: &[Vec3; 2]) -> bool {
    planes.iter().all(|p| {
        let x = bbox[(p.x > 0.0) as usize].x;
        let y = bbox[(p.y > 0.0) as usize].y;
        let z = bbox[(p.z > 0.0) as usize].z;
        p.x * x + p.y * y + p.z * z >= -p.w
    })
}

/// Model matrix of a brush entity: translate, then yaw, pitch, roll.
pub fn brush_model_matrix(origin: Vec3, angles: Vec3) -> Mat4 {
    Mat4::from_translation(to_gl(origin))
        * Mat4::from_rotation_y(angles.y.to_radians())
        * Mat4::from_rotation_x(angles.x.to_radians())
        * Mat4::from_rotation_z(angles.z.to_radians())
}

/// Model matrix of an alias entity. Meshes are stored in GL axes already,
/// so pitch turns about GL `z` and roll about GL `x`.
pub fn alias_model_matrix(origin: Vec3, angles: Vec3) -> Mat4 {
    Mat4::from_translation(to_gl(origin))
        * Mat4::from_rotation_y(angles.y.to_radians())
        * Mat4::from_rotation_z(angles.x.to_radians())
        * Mat4::from_rotation_x(angles.z.to_radians())
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
