//! Math utilities and types
//!
//! Provides the fundamental math types used by the scene graph, the spatial
//! index and the render pipeline. All matrices use column vectors, so a
//! world matrix is composed as `parent_world * local`.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, UnitQuaternion, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = UnitQuaternion<f32>;

/// Scale components smaller than this are treated as degenerate during decomposition
const DEGENERATE_SCALE: f32 = 1e-8;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform from all three components
    pub const fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { position, rotation, scale }
    }

    /// Convert to a transformation matrix (T * R * S)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Decompose an affine transformation matrix into translation, rotation and scale
    ///
    /// Shear is discarded. A negative determinant is folded into the X scale.
    /// Degenerate (near-zero) scale axes keep a zero scale and an identity
    /// contribution to the rotation.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let mut axis_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31);
        let axis_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32);
        let axis_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33);

        let mut scale = Vec3::new(axis_x.magnitude(), axis_y.magnitude(), axis_z.magnitude());
        if axis_x.cross(&axis_y).dot(&axis_z) < 0.0 {
            scale.x = -scale.x;
            axis_x = -axis_x;
        }

        let normalize = |axis: Vec3, length: f32, fallback: Vec3| {
            if length.abs() > DEGENERATE_SCALE {
                axis / length.abs()
            } else {
                fallback
            }
        };
        let rotation_matrix = Mat3::from_columns(&[
            normalize(axis_x, scale.x, Vec3::x()),
            normalize(axis_y, scale.y, Vec3::y()),
            normalize(axis_z, scale.z, Vec3::z()),
        ]);
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self {
            position,
            rotation,
            scale,
        }
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::{constants, Vec3};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert a vector of Euler angles from radians to degrees
    pub fn euler_to_degrees(radians: Vec3) -> Vec3 {
        radians * constants::RAD_TO_DEG
    }

    /// Convert a vector of Euler angles from degrees to radians
    pub fn euler_to_radians(degrees: Vec3) -> Vec3 {
        degrees * constants::DEG_TO_RAD
    }

    /// True when every component is finite (no NaN, no infinity)
    pub fn is_finite_vec3(value: &Vec3) -> bool {
        value.iter().all(|c| c.is_finite())
    }
}

/// Extension trait for Mat4 with projection and view constructors
pub trait Mat4Ext {
    /// Create a right-handed perspective projection (OpenGL clip convention)
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed orthographic projection (OpenGL clip convention)
    fn orthographic(height: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_perspective(aspect, fov_y, near, far)
    }

    fn orthographic(height: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let half_height = height * 0.5;
        let half_width = half_height * aspect;
        Mat4::new_orthographic(-half_width, half_width, -half_height, half_height, near, far)
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }
}
