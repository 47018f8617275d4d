//! Axis-aligned bounding boxes
//!
//! [`BoundingBox`] is an immutable value type. Every comparison is tolerant by
//! the fixed [`BOUNDS_EPSILON`] so boxes that drift through repeated
//! transforms still compare as touching or containing.

use crate::foundation::math::{utils, Mat4, Vec3, Vec4};
use crate::spatial::Plane;
use thiserror::Error;

/// Fixed tolerance used by every bounding box comparison
pub const BOUNDS_EPSILON: f32 = 1e-4;

/// Bounding box construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    /// No points or boxes were supplied
    #[error("cannot build a bounding box from an empty set")]
    Empty,

    /// A component was NaN or infinite
    #[error("bounding box contains an invalid value: {0}")]
    InvalidValue(String),

    /// `min` exceeds `max` by more than the tolerance on some axis
    #[error("bounding box min {min:?} exceeds max {max:?}")]
    Inverted {
        /// Requested minimum corner
        min: [f32; 3],
        /// Requested maximum corner
        max: [f32; 3],
    },
}

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min: Vec3,
    max: Vec3,
}

impl BoundingBox {
    /// Create a box from its corners
    ///
    /// Axes where `min` exceeds `max` by no more than [`BOUNDS_EPSILON`] are
    /// clamped to a flat extent; larger violations are rejected.
    pub fn new(min: Vec3, max: Vec3) -> Result<Self, BoundsError> {
        if !utils::is_finite_vec3(&min) || !utils::is_finite_vec3(&max) {
            return Err(BoundsError::InvalidValue(format!("min {min:?}, max {max:?}")));
        }

        let mut clamped_max = max;
        for axis in 0..3 {
            if min[axis] > max[axis] {
                if min[axis] - max[axis] > BOUNDS_EPSILON {
                    return Err(BoundsError::Inverted {
                        min: min.into(),
                        max: max.into(),
                    });
                }
                clamped_max[axis] = min[axis];
            }
        }

        Ok(Self { min, max: clamped_max })
    }

    /// Build a box without validation; callers guarantee finite, ordered corners
    pub(crate) const fn from_corners_unchecked(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a box centered at a point with given half extents
    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Result<Self, BoundsError> {
        let half = half_extents.abs();
        Self::new(center - half, center + half)
    }

    /// Smallest box containing every point
    pub fn from_points(points: &[Vec3]) -> Result<Self, BoundsError> {
        let (first, rest) = points.split_first().ok_or(BoundsError::Empty)?;

        let mut min = *first;
        let mut max = *first;
        for point in std::iter::once(first).chain(rest) {
            if !utils::is_finite_vec3(point) {
                return Err(BoundsError::InvalidValue(format!("point {point:?}")));
            }
            min = min.inf(point);
            max = max.sup(point);
        }

        Ok(Self { min, max })
    }

    /// Smallest box containing every box
    pub fn merged(boxes: &[Self]) -> Result<Self, BoundsError> {
        let (first, rest) = boxes.split_first().ok_or(BoundsError::Empty)?;
        Ok(rest.iter().fold(*first, |acc, b| acc.merge(b)))
    }

    /// Minimum corner
    pub const fn min(&self) -> Vec3 {
        self.min
    }

    /// Maximum corner
    pub const fn max(&self) -> Vec3 {
        self.max
    }

    /// Full extent along each axis
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get the center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the half extents of the box
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// True when both corners are finite
    pub fn is_finite(&self) -> bool {
        utils::is_finite_vec3(&self.min) && utils::is_finite_vec3(&self.max)
    }

    /// The eight corners, X varying fastest
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Check if this box contains a point (tolerant)
    pub fn contains_point(&self, point: &Vec3) -> bool {
        (0..3).all(|axis| {
            point[axis] >= self.min[axis] - BOUNDS_EPSILON
                && point[axis] <= self.max[axis] + BOUNDS_EPSILON
        })
    }

    /// Check if this box fully contains another box (tolerant)
    pub fn contains_box(&self, other: &Self) -> bool {
        (0..3).all(|axis| {
            other.min[axis] >= self.min[axis] - BOUNDS_EPSILON
                && other.max[axis] <= self.max[axis] + BOUNDS_EPSILON
        })
    }

    /// Check if this box intersects another box (tolerant, symmetric)
    pub fn intersects(&self, other: &Self) -> bool {
        (0..3).all(|axis| {
            self.min[axis] <= other.max[axis] + BOUNDS_EPSILON
                && other.min[axis] <= self.max[axis] + BOUNDS_EPSILON
        })
    }

    /// New box grown to include a point
    pub fn merge_point(&self, point: &Vec3) -> Result<Self, BoundsError> {
        if !utils::is_finite_vec3(point) {
            return Err(BoundsError::InvalidValue(format!("point {point:?}")));
        }
        Ok(Self {
            min: self.min.inf(point),
            max: self.max.sup(point),
        })
    }

    /// New box covering both boxes
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// New box grown by `margin` on every side
    pub fn expanded(&self, margin: f32) -> Result<Self, BoundsError> {
        let offset = Vec3::repeat(margin);
        Self::new(self.min - offset, self.max + offset)
    }

    /// Axis-aligned bound of the eight transformed corners
    ///
    /// Each corner goes through a homogeneous divide when its W component is
    /// not 1. The result is conservative, not a tight oriented bound.
    pub fn transform(&self, matrix: &Mat4) -> Result<Self, BoundsError> {
        let corners = self.corners().map(|corner| {
            let v = matrix * Vec4::new(corner.x, corner.y, corner.z, 1.0);
            let point = v.xyz();
            if (v.w - 1.0).abs() > f32::EPSILON {
                point / v.w
            } else {
                point
            }
        });
        Self::from_points(&corners)
    }

    /// Conservative frustum test
    ///
    /// The box is culled only when all eight corners lie outside the same
    /// plane. Boxes that straddle a plane are kept.
    pub fn is_inside_frustum(&self, planes: &[Plane; 6]) -> bool {
        let corners = self.corners();
        planes.iter().all(|plane| {
            corners
                .iter()
                .any(|corner| plane.signed_distance(corner) >= -BOUNDS_EPSILON)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box_at(center: Vec3) -> BoundingBox {
        BoundingBox::from_center_extents(center, Vec3::repeat(0.5)).unwrap()
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let err = BoundingBox::new(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::repeat(1.0)).unwrap_err();
        assert!(matches!(err, BoundsError::InvalidValue(_)));

        let err = BoundingBox::new(Vec3::zeros(), Vec3::new(f32::INFINITY, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, BoundsError::InvalidValue(_)));
    }

    #[test]
    fn test_clamps_near_violations_and_rejects_inversions() {
        let nearly = BoundingBox::new(Vec3::new(1.00005, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)).unwrap();
        assert_relative_eq!(nearly.size().x, 0.0);

        let err = BoundingBox::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, BoundsError::Inverted { .. }));
    }

    #[test]
    fn test_empty_and_invalid_inputs_are_distinguishable() {
        assert_eq!(BoundingBox::from_points(&[]).unwrap_err(), BoundsError::Empty);
        assert_eq!(BoundingBox::merged(&[]).unwrap_err(), BoundsError::Empty);

        let err = BoundingBox::from_points(&[Vec3::zeros(), Vec3::new(0.0, f32::NAN, 0.0)]).unwrap_err();
        assert!(matches!(err, BoundsError::InvalidValue(_)));
    }

    #[test]
    fn test_intersects_is_symmetric() {
        let a = unit_box_at(Vec3::zeros());
        let b = unit_box_at(Vec3::new(0.9, 0.0, 0.0));
        let c = unit_box_at(Vec3::new(3.0, 0.0, 0.0));

        assert!(a.intersects(&b) && b.intersects(&a));
        assert!(!a.intersects(&c) && !c.intersects(&a));
    }

    #[test]
    fn test_contains_point_uses_fixed_tolerance() {
        let b = unit_box_at(Vec3::zeros());
        assert!(b.contains_point(&Vec3::new(0.25, -0.25, 0.0)));
        assert!(b.contains_point(&Vec3::new(0.5 + BOUNDS_EPSILON * 0.5, 0.0, 0.0)));
        assert!(!b.contains_point(&Vec3::new(0.5 + BOUNDS_EPSILON * 10.0, 0.0, 0.0)));
    }

    #[test]
    fn test_merged_contains_inputs() {
        let a = unit_box_at(Vec3::new(-4.0, 1.0, 0.0));
        let b = unit_box_at(Vec3::new(3.0, -2.0, 7.0));
        let merged = BoundingBox::merged(&[a, b]).unwrap();
        assert!(merged.contains_box(&a));
        assert!(merged.contains_box(&b));
    }

    #[test]
    fn test_point_merge_and_margin_grow_the_box() {
        let grown = unit_box_at(Vec3::zeros()).merge_point(&Vec3::new(3.0, -2.0, 0.0)).unwrap();
        assert_relative_eq!(grown.min(), Vec3::new(-0.5, -2.0, -0.5));
        assert_relative_eq!(grown.max(), Vec3::new(3.0, 0.5, 0.5));
        assert!(unit_box_at(Vec3::zeros())
            .merge_point(&Vec3::new(f32::INFINITY, 0.0, 0.0))
            .is_err());

        let padded = unit_box_at(Vec3::zeros()).expanded(1.0).unwrap();
        assert_relative_eq!(padded.size(), Vec3::repeat(3.0));
        assert!(matches!(
            unit_box_at(Vec3::zeros()).expanded(-1.0),
            Err(BoundsError::Inverted { .. })
        ));
    }

    #[test]
    fn test_transform_is_conservative_aabb() {
        let b = unit_box_at(Vec3::zeros());
        let rotation = Mat4::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_4);
        let rotated = b.transform(&(Mat4::new_translation(&Vec3::new(10.0, 0.0, 0.0)) * rotation)).unwrap();

        let half_diagonal = 0.5 * std::f32::consts::SQRT_2;
        assert_relative_eq!(rotated.center(), Vec3::new(10.0, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(rotated.half_extents().x, half_diagonal, epsilon = 1e-5);
        assert_relative_eq!(rotated.half_extents().z, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_transform_applies_homogeneous_divide() {
        let b = unit_box_at(Vec3::new(0.0, 0.0, 0.0));
        let mut halve = Mat4::identity();
        halve[(3, 3)] = 2.0;
        let transformed = b.transform(&halve).unwrap();
        assert_relative_eq!(transformed.max(), Vec3::repeat(0.25), epsilon = 1e-6);
    }

    #[test]
    fn test_frustum_test_keeps_straddling_boxes() {
        // Half space x >= 0 repeated six times
        let plane = Plane::new(Vec3::x(), 0.0);
        let planes = [plane; 6];

        assert!(unit_box_at(Vec3::new(2.0, 0.0, 0.0)).is_inside_frustum(&planes));
        assert!(unit_box_at(Vec3::new(0.0, 0.0, 0.0)).is_inside_frustum(&planes));
        assert!(!unit_box_at(Vec3::new(-2.0, 0.0, 0.0)).is_inside_frustum(&planes));
    }
}
