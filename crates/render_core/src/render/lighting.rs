//! Lighting system
//!
//! Light nodes are kept in flat per-kind registries by the pipeline. The
//! number of enabled lights of each kind, clamped to [`LightLimits`], is baked
//! into shader sources; a change in those counts triggers recompilation.

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::UniformValue;
use crate::scene::NodeId;
use serde::{Deserialize, Serialize};

/// Light types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Directional light (like sunlight); shines along the node's -Z axis
    Directional,
    /// Point light (like a lightbulb)
    Point {
        /// Attenuation range
        range: f32,
    },
    /// Spot light (like a flashlight); shines along the node's -Z axis
    Spot {
        /// Attenuation range
        range: f32,
        /// Inner cone angle in radians
        inner_cone_angle: f32,
        /// Outer cone angle in radians
        outer_cone_angle: f32,
    },
}

/// Light payload of a scene node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightComponent {
    /// Light type
    pub kind: LightKind,
    /// Light color
    pub color: Vec3,
    /// Light intensity
    pub intensity: f32,
}

impl LightComponent {
    /// Create a directional light
    pub const fn directional(color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
        }
    }

    /// Create a point light
    pub const fn point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Point { range },
            color,
            intensity,
        }
    }

    /// Create a spot light
    pub const fn spot(color: Vec3, intensity: f32, range: f32, inner_cone_angle: f32, outer_cone_angle: f32) -> Self {
        Self {
            kind: LightKind::Spot {
                range,
                inner_cone_angle,
                outer_cone_angle,
            },
            color,
            intensity,
        }
    }

    /// World-space position and direction for a node placed at `world`
    pub fn world_pose(world: &Mat4) -> (Vec3, Vec3) {
        let position = Vec3::new(world.m14, world.m24, world.m34);
        let forward = world * Vec4::new(0.0, 0.0, -1.0, 0.0);
        let direction = forward.xyz().try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::z());
        (position, direction)
    }
}

/// Upper bounds on lights of each kind baked into shaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightLimits {
    /// Maximum point lights
    pub max_point: u32,
    /// Maximum spot lights
    pub max_spot: u32,
    /// Maximum directional lights
    pub max_directional: u32,
}

impl Default for LightLimits {
    fn default() -> Self {
        Self {
            max_point: 8,
            max_spot: 4,
            max_directional: 2,
        }
    }
}

/// Number of lights of each kind in use this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightCounts {
    /// Point lights
    pub point: u32,
    /// Spot lights
    pub spot: u32,
    /// Directional lights
    pub directional: u32,
}

impl LightCounts {
    /// Counts limited to `limits`
    #[must_use]
    pub fn clamped(self, limits: &LightLimits) -> Self {
        Self {
            point: self.point.min(limits.max_point),
            spot: self.spot.min(limits.max_spot),
            directional: self.directional.min(limits.max_directional),
        }
    }
}

/// One enabled light resolved to world space for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLight {
    /// Light node
    pub node: NodeId,
    /// Light payload
    pub light: LightComponent,
    /// World-space position
    pub position: Vec3,
    /// World-space direction
    pub direction: Vec3,
}

/// Enabled lights of one frame, grouped by kind and capped to [`LightLimits`]
#[derive(Debug, Clone, Default)]
pub struct LightSet {
    /// Point lights
    pub point: Vec<FrameLight>,
    /// Spot lights
    pub spot: Vec<FrameLight>,
    /// Directional lights
    pub directional: Vec<FrameLight>,
}

impl LightSet {
    /// Sort `light` into its kind; returns false when that kind is already full
    pub fn push(&mut self, light: FrameLight, limits: &LightLimits) -> bool {
        let (list, max) = match light.light.kind {
            LightKind::Directional => (&mut self.directional, limits.max_directional),
            LightKind::Point { .. } => (&mut self.point, limits.max_point),
            LightKind::Spot { .. } => (&mut self.spot, limits.max_spot),
        };
        if list.len() >= max as usize {
            return false;
        }
        list.push(light);
        true
    }

    /// Number of lights of each kind
    pub fn counts(&self) -> LightCounts {
        let count = |list: &Vec<FrameLight>| u32::try_from(list.len()).unwrap_or(u32::MAX);
        LightCounts {
            point: count(&self.point),
            spot: count(&self.spot),
            directional: count(&self.directional),
        }
    }

    /// Uniform values describing every light
    ///
    /// Vectors are packed the way the shader blocks read them: range or
    /// intensity rides in the `w` component.
    pub fn uniforms(&self) -> Vec<(String, UniformValue)> {
        let mut uniforms = Vec::new();

        for (i, light) in self.directional.iter().enumerate() {
            let color = light.light.color;
            uniforms.push((
                format!("u_directional_lights[{i}].direction"),
                UniformValue::Vec4(light.direction.push(light.light.intensity)),
            ));
            uniforms.push((format!("u_directional_lights[{i}].color"), UniformValue::Vec4(color.push(0.0))));
        }

        for (i, light) in self.point.iter().enumerate() {
            let range = match light.light.kind {
                LightKind::Point { range } => range,
                _ => 0.0,
            };
            uniforms.push((
                format!("u_point_lights[{i}].position"),
                UniformValue::Vec4(light.position.push(range)),
            ));
            uniforms.push((
                format!("u_point_lights[{i}].color"),
                UniformValue::Vec4(light.light.color.push(light.light.intensity)),
            ));
        }

        for (i, light) in self.spot.iter().enumerate() {
            let LightKind::Spot {
                range,
                inner_cone_angle,
                outer_cone_angle,
            } = light.light.kind
            else {
                continue;
            };
            uniforms.push((
                format!("u_spot_lights[{i}].position"),
                UniformValue::Vec4(light.position.push(range)),
            ));
            uniforms.push((
                format!("u_spot_lights[{i}].direction"),
                UniformValue::Vec4(light.direction.push(light.light.intensity)),
            ));
            uniforms.push((format!("u_spot_lights[{i}].color"), UniformValue::Vec4(light.light.color.push(0.0))));
            uniforms.push((
                format!("u_spot_lights[{i}].cone"),
                UniformValue::Vec4(Vec4::new(inner_cone_angle.cos(), outer_cone_angle.cos(), 0.0, 0.0)),
            ));
        }

        uniforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Quat;
    use approx::assert_relative_eq;

    #[test]
    fn test_counts_are_clamped_per_kind() {
        let counts = LightCounts {
            point: 20,
            spot: 1,
            directional: 3,
        };
        let clamped = counts.clamped(&LightLimits::default());
        assert_eq!(
            clamped,
            LightCounts {
                point: 8,
                spot: 1,
                directional: 2
            }
        );
    }

    #[test]
    fn test_world_pose_uses_negative_z() {
        let rotation = Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2);
        let world = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)) * rotation.to_homogeneous();
        let (position, direction) = LightComponent::world_pose(&world);

        assert_relative_eq!(position, Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(direction, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_light_set_caps_each_kind() {
        let limits = LightLimits {
            max_point: 1,
            max_spot: 0,
            max_directional: 2,
        };
        let light = |component| FrameLight {
            node: NodeId::default(),
            light: component,
            position: Vec3::zeros(),
            direction: -Vec3::z(),
        };

        let mut set = LightSet::default();
        assert!(set.push(light(LightComponent::point(Vec3::repeat(1.0), 1.0, 5.0)), &limits));
        assert!(!set.push(light(LightComponent::point(Vec3::repeat(1.0), 1.0, 5.0)), &limits));
        assert!(!set.push(light(LightComponent::spot(Vec3::repeat(1.0), 1.0, 5.0, 0.2, 0.4)), &limits));
        assert!(set.push(light(LightComponent::directional(Vec3::repeat(1.0), 2.0)), &limits));

        assert_eq!(
            set.counts(),
            LightCounts {
                point: 1,
                spot: 0,
                directional: 1
            }
        );
        let uniforms = set.uniforms();
        assert_eq!(uniforms.len(), 4);
        assert!(uniforms.contains(&(
            "u_point_lights[0].position".to_string(),
            UniformValue::Vec4(Vec4::new(0.0, 0.0, 0.0, 5.0))
        )));
    }
}
