//! Once-per-frame target clearing

use crate::render::{PassContext, PassSetup, RenderPass, RenderResult, RenderTargetLayout, Viewport};

/// Clears one named render target at a fixed size each frame
pub struct ClearPass {
    name: String,
    target: String,
    layout: RenderTargetLayout,
    width: u32,
    height: u32,
    color: Option<[f32; 4]>,
    depth: Option<f32>,
}

impl ClearPass {
    /// Clear `target` to `color`; depth attachments are reset to 1.0
    pub fn new(target: impl Into<String>, layout: RenderTargetLayout, width: u32, height: u32, color: [f32; 4]) -> Self {
        let target = target.into();
        let depth = layout.depth_format.map(|_| 1.0);
        let color = (!layout.color_formats.is_empty()).then_some(color);
        Self {
            name: format!("clear:{target}"),
            target,
            layout,
            width,
            height,
            color,
            depth,
        }
    }

    /// Name of the cleared target
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl RenderPass for ClearPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, setup: &mut PassSetup<'_>) -> RenderResult<()> {
        setup.register_render_target(&self.target, self.layout.clone())
    }

    fn render(&mut self, pass: &mut PassContext<'_>) -> RenderResult<()> {
        pass.bind_output(Some(&self.target), Viewport::new(self.width, self.height))?;
        pass.context.clear(self.color, self.depth);
        Ok(())
    }
}
