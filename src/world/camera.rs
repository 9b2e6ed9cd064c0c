use glam::{Mat4, Vec3};

use crate::engine::frustum::to_gl;

/// Near / far clip distances of the perspective projection.
const Z_NEAR: f32 = 1.0;
const Z_FAR: f32 = 5000.0;

/// View-point in **GL space** (x, z, -y of the Quake world) together with
/// the matrices derived from it.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye_pos: Vec3,
    pub eye_dir: Vec3,
    pub eye_up: Vec3,
    pub proj: Mat4,
    pub view: Mat4,
    /// `proj * view`
    pub view_proj: Mat4,
}

impl Camera {
    /// `fov_y` in radians, `aspect` = width / height.
    pub fn new(eye_pos: Vec3, eye_dir: Vec3, eye_up: Vec3, fov_y: f32, aspect: f32) -> Self {
        let proj = Mat4::perspective_rh_gl(fov_y, aspect, Z_NEAR, Z_FAR);
        let view = Mat4::look_at_rh(eye_pos, eye_pos + eye_dir, eye_up);
        Self {
            eye_pos,
            eye_dir,
            eye_up,
            proj,
            view,
            view_proj: proj * view,
        }
    }

    /// Camera at a Quake-space `origin` looking along `angles` (degrees).
    ///
    /// The vertical field of view is `fov_x * 0.75`, a 4:3 screen's ratio.
    pub fn from_view(origin: Vec3, angles: Vec3, fov_x_deg: f32, aspect: f32) -> Self {
        let (forward, _right, up) = angle_vectors(angles);
        Self::new(
            to_gl(origin),
            to_gl(forward),
            to_gl(up),
            (fov_x_deg * 0.75).to_radians(),
            aspect,
        )
    }
}

/// Quake `AngleVectors`: pitch/yaw/roll (degrees) → forward, right, up.
pub fn angle_vectors(angles: Vec3) -> (Vec3, Vec3, Vec3) {
    let (sp, cp) = angles.x.to_radians().sin_cos();
    let (sy, cy) = angles.y.to_radians().sin_cos();
    let (sr, cr) = angles.z.to_radians().sin_cos();

    let forward = Vec3::new(cp * cy, cp * sy, -sp);
    let right = Vec3::new(
        -sr * sp * cy + cr * sy,
        -sr * sp * sy - cr * cy,
        -sr * cp,
    );
    let up = Vec3::new(cr * sp * cy + sr * sy, cr * sp * sy - sr * cy, cr * cp);
    (forward, right, up)
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_vectors_are_orthonormal() {
        let (f, r, u) = angle_vectors(Vec3::new(20.0, 135.0, 5.0));
        assert!((f.length() - 1.0).abs() < 1e-5);
        assert!((r.length() - 1.0).abs() < 1e-5);
        assert!(f.dot(r).abs() < 1e-5);
        assert!(f.dot(u).abs() < 1e-5);
    }

    #[test]
    fn zero_angles_look_down_x() {
        let (f, r, u) = angle_vectors(Vec3::ZERO);
        assert!((f - Vec3::X).length() < 1e-6);
        assert!((r + Vec3::Y).length() < 1e-6);
        assert!((u - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn point_ahead_projects_to_screen_centre() {
        let cam = Camera::from_view(Vec3::ZERO, Vec3::ZERO, 90.0, 4.0 / 3.0);
        let clip = cam.view_proj * to_gl(Vec3::new(100.0, 0.0, 0.0)).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > -1.0 && ndc.z < 1.0);
    }
}
