//! View frustum planes and corners

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::spatial::{BoundingBox, BoundsError};

/// Plane stored as `normal · p + distance = 0`
///
/// Points with a non-negative signed distance lie on the inner side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing to the inner side
    pub normal: Vec3,
    /// Offset along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a plane from a unit normal and offset
    pub const fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Create a normalized plane from raw `(a, b, c, d)` coefficients
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.magnitude();
        if length > f32::EPSILON {
            Self::new(normal / length, coefficients.w / length)
        } else {
            Self::new(normal, coefficients.w)
        }
    }

    /// Signed distance from the plane to a point
    pub fn signed_distance(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Camera frustum in world space
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far
    pub planes: [Plane; 6],
    corners: [Vec3; 8],
}

impl Frustum {
    /// Extract the frustum of a combined `projection * view` matrix
    ///
    /// Planes come from row combinations of the matrix; corners come from
    /// unprojecting the normalized device cube. Fails when the matrix cannot
    /// be inverted.
    pub fn from_view_projection(view_projection: &Mat4) -> Result<Self, BoundsError> {
        let row = |i: usize| -> Vec4 { view_projection.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let planes = [
            Plane::from_coefficients(r3 + r0),
            Plane::from_coefficients(r3 - r0),
            Plane::from_coefficients(r3 + r1),
            Plane::from_coefficients(r3 - r1),
            Plane::from_coefficients(r3 + r2),
            Plane::from_coefficients(r3 - r2),
        ];

        let inverse = view_projection
            .try_inverse()
            .ok_or_else(|| BoundsError::InvalidValue("singular view-projection matrix".to_string()))?;

        let ndc = BoundingBox::from_corners_unchecked(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        let mut corners = [Vec3::zeros(); 8];
        for (corner, point) in corners.iter_mut().zip(ndc.corners()) {
            let world = inverse * Vec4::new(point.x, point.y, point.z, 1.0);
            if world.w.abs() <= f32::EPSILON {
                return Err(BoundsError::InvalidValue(format!("frustum corner at infinity: {world:?}")));
            }
            *corner = world.xyz() / world.w;
        }

        Ok(Self { planes, corners })
    }

    /// The eight world-space corners (near face first)
    pub const fn corners(&self) -> &[Vec3; 8] {
        &self.corners
    }

    /// Axis-aligned bound of the corners, used for coarse octree queries
    pub fn bounds(&self) -> Result<BoundingBox, BoundsError> {
        BoundingBox::from_points(&self.corners)
    }

    /// Conservative test against the six planes
    pub fn intersects_box(&self, bounds: &BoundingBox) -> bool {
        bounds.is_inside_frustum(&self.planes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{utils, Mat4Ext};
    use approx::assert_relative_eq;

    fn camera_frustum() -> Frustum {
        let projection = Mat4::perspective(utils::deg_to_rad(90.0), 1.0, 0.1, 20.0);
        let view = Mat4::identity();
        Frustum::from_view_projection(&(projection * view)).unwrap()
    }

    #[test]
    fn test_planes_are_normalized() {
        for plane in camera_frustum().planes {
            assert_relative_eq!(plane.normal.magnitude(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_corners_span_near_and_far() {
        let bounds = camera_frustum().bounds().unwrap();
        assert_relative_eq!(bounds.max().z, -0.1, epsilon = 1e-3);
        assert_relative_eq!(bounds.min().z, -20.0, epsilon = 1e-2);
        // 90 degree field of view: half width equals depth at the far plane
        assert_relative_eq!(bounds.max().x, 20.0, epsilon = 1e-2);
    }

    #[test]
    fn test_boxes_in_front_and_behind_far_plane() {
        let frustum = camera_frustum();
        let near_box = BoundingBox::from_center_extents(Vec3::new(0.0, 0.0, -5.0), Vec3::repeat(0.5)).unwrap();
        let far_box = BoundingBox::from_center_extents(Vec3::new(0.0, 0.0, -50.0), Vec3::repeat(0.5)).unwrap();
        let behind = BoundingBox::from_center_extents(Vec3::new(0.0, 0.0, 5.0), Vec3::repeat(0.5)).unwrap();

        assert!(frustum.intersects_box(&near_box));
        assert!(!frustum.intersects_box(&far_box));
        assert!(!frustum.intersects_box(&behind));
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        assert!(Frustum::from_view_projection(&Mat4::zeros()).is_err());
    }
}
