//! Built-in render passes

mod clear;
mod geometry;

pub use clear::ClearPass;
pub use geometry::GeometryPass;
