//! ----------------------------------------------------------------------------
//! **Camera, frustum and projection**
//!
//! * World space: x right, y forward, z up.
//! * View space:  x right, y up, z forward (depth).
//!
//! The two only differ by a swap of the y/z *roles*, so transforming a point
//! rotates it by the camera basis and reads the components in swapped order.
//! Projection is the classic `screen = center ± scale_z * (v / z)` with
//! half-pixel-biased clamping so `ceil()` snapping lands on real pixels.
//! ----------------------------------------------------------------------------

use glam::{Vec2, Vec3, vec2, vec3};

/// A frustum plane in world space, threaded into the per-face clip list.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClipPlane {
    pub normal: Vec3,
    pub distance: f32,
    /// Clipping against this plane produces the screen's left border.
    pub is_left: bool,
    /// Clipping against this plane produces the screen's right border.
    pub is_right: bool,
}

/// Player view-point plus every projection constant derived from it.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    /// Euler angles in degrees: x pitch, y roll (unused), z yaw.
    pub angles: Vec3,

    /// Orthonormal basis: `rotx` right, `roty` forward, `rotz` up.
    pub rotx: Vec3,
    pub roty: Vec3,
    pub rotz: Vec3,

    pub screen_x: i32,
    pub screen_y: i32,
    pub screen_width: i32,
    pub screen_height: i32,

    /// Between-pixel centre of the screen rect.
    pub screen_center: Vec2,
    /// Half-pixel biased clamp bounds for projected coordinates.
    pub screen_min: Vec2,
    pub screen_max: Vec2,

    pub near_z: f32,
    /// `screen_width / (2 tan(fovx/2))`: view-to-pixel scale at z = 1.
    pub scale_z: f32,
    pub scale_invz: f32,

    /// View-space frustum normals: left, right, top, bottom, facing inward.
    pub frustum_planes: [Vec3; 4],
    /// The same planes rotated into world space each frame.
    pub world_frustum_planes: [ClipPlane; 4],
    /// Per-plane reject/accept component indices into a node's `minmax`,
    /// rebuilt whenever the camera turns.  Layout: plane * 6 + component,
    /// first three entries reject, last three accept.
    pub frustum_indices: [usize; 24],
}

impl Camera {
    /// Create a camera at `position` facing along `angles`, with an
    /// uninitialised screen; call [`Camera::set_screen`] before rendering.
    pub fn new(position: Vec3, angles: Vec3) -> Self {
        let mut cam = Camera {
            position,
            angles,
            rotx: Vec3::X,
            roty: Vec3::Y,
            rotz: Vec3::Z,
            screen_x: 0,
            screen_y: 0,
            screen_width: 0,
            screen_height: 0,
            screen_center: Vec2::ZERO,
            screen_min: Vec2::ZERO,
            screen_max: Vec2::ZERO,
            near_z: 0.01,
            scale_z: 1.0,
            scale_invz: 1.0,
            frustum_planes: [Vec3::Z; 4],
            world_frustum_planes: [ClipPlane::default(); 4],
            frustum_indices: [0; 24],
        };
        cam.update_vectors();
        cam
    }

    /// Set the screen rectangle and horizontal field of view (degrees),
    /// rebuilding every projection constant and the view-space frustum.
    ///
    /// Subtracting 0.5 keeps the centre between pixels for even widths and
    /// on the centre pixel for odd ones.
    pub fn set_screen(&mut self, x: i32, y: i32, width: i32, height: i32, fovx: f32) {
        self.screen_x = x;
        self.screen_y = y;
        self.screen_width = width;
        self.screen_height = height;

        self.screen_center = vec2(
            x as f32 + width as f32 / 2.0 - 0.5,
            y as f32 + height as f32 / 2.0 - 0.5,
        );
        self.screen_min = vec2(x as f32 - 0.5, y as f32 - 0.5);
        self.screen_max = vec2(
            x as f32 + width as f32 - 0.5,
            y as f32 + height as f32 - 0.5,
        );

        let tanx = (fovx.to_radians() * 0.5).tan();
        self.scale_z = width as f32 * 0.5 / tanx;
        self.scale_invz = 1.0 / self.scale_z;

        let inv_aspect = height as f32 / width as f32;
        let tany = tanx * inv_aspect;

        self.frustum_planes = [
            vec3(1.0 / tanx, 0.0, 1.0).normalize(),  // left
            vec3(-1.0 / tanx, 0.0, 1.0).normalize(), // right
            vec3(0.0, -1.0 / tany, 1.0).normalize(), // top
            vec3(0.0, 1.0 / tany, 1.0).normalize(),  // bottom
        ];
    }

    /*──────────────────────── derived basis ─────────────────────────*/

    /// Rebuild the basis from `angles`.  Rotation around the local x axis
    /// (pitch) is applied first, then around the world z axis (yaw).
    pub fn update_vectors(&mut self) {
        let (sinx, cosx) = self.angles.x.to_radians().sin_cos();
        let (sinz, cosz) = self.angles.z.to_radians().sin_cos();

        self.rotx = vec3(cosz, -sinz, 0.0);
        self.roty = vec3(sinz * cosx, cosz * cosx, sinx);
        self.rotz = vec3(-sinz * sinx, -cosz * sinx, cosx);
    }

    /*──────────────────────── transforms ────────────────────────────*/

    /// World point to view space (x right, y up, z depth).
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        let pt = point - self.position;
        vec3(self.rotx.dot(pt), self.rotz.dot(pt), self.roty.dot(pt))
    }

    /// World direction to view space; same basis, no translation.
    #[inline]
    pub fn transform_direction(&self, dir: Vec3) -> Vec3 {
        vec3(dir.dot(self.rotx), dir.dot(self.rotz), dir.dot(self.roty))
    }

    /// View point back to world space; inverse of [`Camera::transform_point`].
    #[inline]
    pub fn view_to_world(&self, v: Vec3) -> Vec3 {
        self.position + self.rotx * v.x + self.rotz * v.y + self.roty * v.z
    }

    /*──────────────────────── projection ────────────────────────────*/

    /// Project a view-space point to clamped screen coordinates.
    #[inline]
    pub fn project(&self, v: Vec3) -> Vec2 {
        let scale = self.scale_z / v.z;
        vec2(
            (self.screen_center.x + scale * v.x).clamp(self.screen_min.x, self.screen_max.x),
            (self.screen_center.y - scale * v.y).clamp(self.screen_min.y, self.screen_max.y),
        )
    }

    /// Recover the world point that projects to `screen` at view depth `z`.
    #[inline]
    pub fn unproject(&self, screen: Vec2, z: f32) -> Vec3 {
        let vx = (screen.x - self.screen_center.x) * z * self.scale_invz;
        let vy = (self.screen_center.y - screen.y) * z * self.scale_invz;
        self.view_to_world(vec3(vx, vy, z))
    }

    /*──────────────────────── frustum ───────────────────────────────*/

    /// Rotate the view-space frustum normals into world space.  The camera
    /// position lies on all four planes, so each distance is just the dot
    /// with the rotated normal.
    pub fn transform_frustum(&mut self) {
        for i in 0..4 {
            let n = self.frustum_planes[i];
            // undo the y/z swap while rotating back to world space
            let normal_world = n.x * self.rotx + n.z * self.roty + n.y * self.rotz;
            self.world_frustum_planes[i] = ClipPlane {
                normal: normal_world,
                distance: self.position.dot(normal_world),
                is_left: i == 0,
                is_right: i == 1,
            };
        }
    }

    /// Choose, per plane and per component, which corner of a bounding box
    /// is the reject point (furthest along the normal) and which is the
    /// accept point (furthest against it).  A negative normal component
    /// selects the box minimum for rejection, the maximum otherwise.
    pub fn setup_frustum_indices(&mut self) {
        for i in 0..4 {
            for j in 0..3 {
                if self.world_frustum_planes[i].normal[j] < 0.0 {
                    self.frustum_indices[i * 6 + j] = j;
                    self.frustum_indices[i * 6 + j + 3] = j + 3;
                } else {
                    self.frustum_indices[i * 6 + j] = j + 3;
                    self.frustum_indices[i * 6 + j + 3] = j;
                }
            }
        }
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
