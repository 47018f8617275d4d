//! # Cameras
//!
//! A [`CameraComponent`] is the payload of a camera node. Its pose comes from
//! the node's world matrix; the component only carries projection and output
//! parameters. The output size and target are supplied explicitly at
//! construction, so cameras can be built in any order relative to the render
//! targets they draw into.
//!
//! # Coordinate System
//! Right-handed, Y-up view space looking down -Z. Projections use the OpenGL
//! clip convention with depth in [-w, w].

use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};
use crate::render::RenderResult;
use crate::scene::{NodeId, SceneError};
use crate::spatial::{BoundingBox, Frustum};

/// Output rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Left edge
    pub x: i32,
    /// Bottom edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Viewport {
    /// Viewport anchored at the origin
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Width over height, 1.0 for an empty viewport
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// True when either dimension is zero
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in degrees
        fov_y_degrees: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Visible height in world units
        height: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
}

/// Camera payload of a scene node
#[derive(Debug, Clone, PartialEq)]
pub struct CameraComponent {
    /// Projection parameters
    pub projection: Projection,
    /// Output rectangle; also defines the aspect ratio
    pub viewport: Viewport,
    /// Cull meshes against the view frustum; when false every mesh is visible
    pub frustum_culling: bool,
    /// Clear color used by passes that clear per camera
    pub clear_color: [f32; 4],
    /// Registered render target name, `None` for the default framebuffer
    pub target: Option<String>,
}

impl CameraComponent {
    /// Create a perspective camera
    ///
    /// # Arguments
    /// * `viewport` - Output rectangle; sets the aspect ratio
    /// * `fov_y_degrees` - Vertical field of view in degrees
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub const fn perspective(viewport: Viewport, fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective {
                fov_y_degrees,
                near,
                far,
            },
            viewport,
            frustum_culling: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            target: None,
        }
    }

    /// Create an orthographic camera showing `height` world units vertically
    pub const fn orthographic(viewport: Viewport, height: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic { height, near, far },
            viewport,
            frustum_culling: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            target: None,
        }
    }

    /// Draw into a registered render target
    #[must_use]
    pub fn with_target(mut self, name: impl Into<String>) -> Self {
        self.target = Some(name.into());
        self
    }

    /// Set the clear color
    #[must_use]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Enable or disable frustum culling
    #[must_use]
    pub fn with_frustum_culling(mut self, enabled: bool) -> Self {
        self.frustum_culling = enabled;
        self
    }

    /// Projection matrix for the current viewport
    pub fn projection_matrix(&self) -> Mat4 {
        let aspect = self.viewport.aspect();
        match self.projection {
            Projection::Perspective {
                fov_y_degrees,
                near,
                far,
            } => Mat4::perspective(utils::deg_to_rad(fov_y_degrees), aspect, near, far),
            Projection::Orthographic { height, near, far } => Mat4::orthographic(height, aspect, near, far),
        }
    }
}

/// Per-frame matrices and culling volume of one camera
#[derive(Debug, Clone)]
pub struct CameraView {
    /// Camera node
    pub node: NodeId,
    /// World-to-view matrix
    pub view: Mat4,
    /// View-to-clip matrix
    pub projection: Mat4,
    /// `projection * view`
    pub view_projection: Mat4,
    /// World-space eye position
    pub position: Vec3,
    /// Output rectangle
    pub viewport: Viewport,
    /// World-space frustum
    pub frustum: Frustum,
    /// World-space bound of the frustum corners
    pub frustum_bounds: BoundingBox,
    /// Clear color of the camera
    pub clear_color: [f32; 4],
    /// Render target name, `None` for the default framebuffer
    pub target: Option<String>,
}

impl CameraView {
    /// Build the view of `camera` placed at `world`
    pub fn new(node: NodeId, camera: &CameraComponent, world: &Mat4) -> RenderResult<Self> {
        let view = world.try_inverse().ok_or_else(|| {
            SceneError::InvalidTransform(format!("camera {node:?} world matrix is not invertible"))
        })?;
        let projection = camera.projection_matrix();
        let view_projection = projection * view;
        let frustum = Frustum::from_view_projection(&view_projection)?;
        let frustum_bounds = frustum.bounds()?;

        Ok(Self {
            node,
            view,
            projection,
            view_projection,
            position: Vec3::new(world.m14, world.m24, world.m34),
            viewport: camera.viewport,
            frustum,
            frustum_bounds,
            clear_color: camera.clear_color,
            target: camera.target.clone(),
        })
    }
}
