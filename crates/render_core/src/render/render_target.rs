//! Pooled render targets
//!
//! Passes refer to off-screen targets by logical name. A name is registered
//! once with its attachment layout; concrete GPU targets are allocated
//! lazily per requested size and stamped with the frame clock on every use.
//! Entries left unused for longer than the TTL are destroyed by
//! [`RenderTargetCache::evict_stale`], which the pipeline calls once per frame.

use crate::render::{
    GpuResource, GraphicsContext, RenderError, RenderResult, RenderTargetDesc, RenderTargetHandle, TextureFormat,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attachment formats of a named render target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetLayout {
    /// One entry per color attachment
    pub color_formats: Vec<TextureFormat>,
    /// Optional depth attachment
    pub depth_format: Option<TextureFormat>,
}

impl RenderTargetLayout {
    /// Single color attachment without depth
    pub fn color(format: TextureFormat) -> Self {
        Self {
            color_formats: vec![format],
            depth_format: None,
        }
    }

    /// Add a depth attachment
    #[must_use]
    pub fn with_depth(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Depth-only layout, as used by shadow maps
    pub const fn depth_only(format: TextureFormat) -> Self {
        Self {
            color_formats: Vec::new(),
            depth_format: Some(format),
        }
    }
}

/// One allocated render target
#[derive(Debug, Clone)]
pub struct RenderTarget {
    name: String,
    width: u32,
    height: u32,
    layout: RenderTargetLayout,
    handle: Option<RenderTargetHandle>,
    needs_upload: bool,
    last_used: f64,
}

impl RenderTarget {
    fn new(name: &str, width: u32, height: u32, layout: RenderTargetLayout, now: f64) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            layout,
            handle: None,
            needs_upload: true,
            last_used: now,
        }
    }

    /// Logical name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in pixels
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Attachment layout
    pub const fn layout(&self) -> &RenderTargetLayout {
        &self.layout
    }

    /// Color attachment formats
    pub fn color_formats(&self) -> &[TextureFormat] {
        &self.layout.color_formats
    }

    /// GPU handle, once uploaded
    pub const fn handle(&self) -> Option<RenderTargetHandle> {
        self.handle
    }

    /// Frame clock time of the last request
    pub const fn last_used(&self) -> f64 {
        self.last_used
    }
}

impl GpuResource for RenderTarget {
    fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    fn mark_needs_upload(&mut self) {
        self.needs_upload = true;
    }

    fn upload(&mut self, context: &mut dyn GraphicsContext) -> RenderResult<()> {
        if !self.needs_upload {
            return Ok(());
        }
        if let Some(old) = self.handle.take() {
            context.destroy_render_target(old);
        }
        let desc = RenderTargetDesc {
            width: self.width,
            height: self.height,
            color_formats: self.layout.color_formats.clone(),
            depth_format: self.layout.depth_format,
        };
        self.handle = Some(context.create_render_target(&desc)?);
        self.needs_upload = false;
        Ok(())
    }

    fn destroy(&mut self, context: &mut dyn GraphicsContext) {
        if let Some(handle) = self.handle.take() {
            context.destroy_render_target(handle);
        }
        self.needs_upload = true;
    }
}

/// Render target cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderTargetCacheConfig {
    /// Seconds an unused target survives before eviction
    pub ttl_seconds: f64,
}

impl Default for RenderTargetCacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 5.0 }
    }
}

/// Named, size-keyed pool of render targets
#[derive(Debug, Default)]
pub struct RenderTargetCache {
    config: RenderTargetCacheConfig,
    layouts: HashMap<String, RenderTargetLayout>,
    targets: HashMap<String, HashMap<(u32, u32), RenderTarget>>,
}

impl RenderTargetCache {
    /// Create an empty cache
    pub fn new(config: RenderTargetCacheConfig) -> Self {
        Self {
            config,
            layouts: HashMap::new(),
            targets: HashMap::new(),
        }
    }

    /// Register a logical name
    ///
    /// Registering the same layout again is a no-op; a different layout for
    /// an existing name is an error.
    pub fn register(&mut self, name: &str, layout: RenderTargetLayout) -> RenderResult<()> {
        match self.layouts.get(name) {
            Some(existing) if *existing == layout => Ok(()),
            Some(_) => Err(RenderError::DuplicateRenderTarget(name.to_string())),
            None => {
                log::debug!("Registered render target '{name}' with {layout:?}");
                self.layouts.insert(name.to_string(), layout);
                Ok(())
            }
        }
    }

    /// Whether a logical name is registered
    pub fn is_registered(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    /// Number of allocated targets across all names and sizes
    pub fn live_count(&self) -> usize {
        self.targets.values().map(HashMap::len).sum()
    }

    /// Get the target for `name` at `width` x `height`
    ///
    /// Allocates and uploads on first request. Repeated requests inside the
    /// TTL return the same target and refresh its timestamp; a request after
    /// the TTL has lapsed destroys and recreates it.
    pub fn get(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        now: f64,
        context: &mut dyn GraphicsContext,
    ) -> RenderResult<&RenderTarget> {
        let layout = self
            .layouts
            .get(name)
            .ok_or_else(|| RenderError::UnknownRenderTarget(name.to_string()))?;
        let ttl = self.config.ttl_seconds;

        let by_size = self.targets.entry(name.to_string()).or_default();
        let target = by_size
            .entry((width, height))
            .or_insert_with(|| RenderTarget::new(name, width, height, layout.clone(), now));

        if now - target.last_used > ttl {
            log::debug!("Render target '{name}' {width}x{height} expired; recreating");
            target.destroy(context);
        }
        if target.needs_upload() {
            log::debug!("Allocating render target '{name}' {width}x{height}");
            target.upload(context)?;
        }
        target.last_used = now;
        Ok(target)
    }

    /// Destroy every target unused for longer than the TTL
    pub fn evict_stale(&mut self, now: f64, context: &mut dyn GraphicsContext) -> usize {
        let ttl = self.config.ttl_seconds;
        let mut evicted = 0;
        for (name, by_size) in &mut self.targets {
            by_size.retain(|(width, height), target| {
                if now - target.last_used > ttl {
                    log::debug!("Evicting render target '{name}' {width}x{height}");
                    target.destroy(context);
                    evicted += 1;
                    false
                } else {
                    true
                }
            });
        }
        self.targets.retain(|_, by_size| !by_size.is_empty());
        evicted
    }

    /// Destroy every allocated target; registrations are kept
    pub fn destroy_all(&mut self, context: &mut dyn GraphicsContext) {
        for target in self.targets.values_mut().flat_map(HashMap::values_mut) {
            target.destroy(context);
        }
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessContext;

    fn cache() -> RenderTargetCache {
        let mut cache = RenderTargetCache::new(RenderTargetCacheConfig { ttl_seconds: 5.0 });
        cache
            .register("A", RenderTargetLayout::color(TextureFormat::Rgba8))
            .unwrap();
        cache
    }

    #[test]
    fn test_unregistered_name_is_an_error() {
        let mut context = HeadlessContext::new();
        let err = cache().get("missing", 4, 4, 0.0, &mut context).unwrap_err();
        assert_eq!(err, RenderError::UnknownRenderTarget("missing".to_string()));
    }

    #[test]
    fn test_register_is_idempotent_for_same_layout() {
        let mut cache = cache();
        cache
            .register("A", RenderTargetLayout::color(TextureFormat::Rgba8))
            .unwrap();
        assert_eq!(
            cache.register("A", RenderTargetLayout::color(TextureFormat::Rgba16F)),
            Err(RenderError::DuplicateRenderTarget("A".to_string()))
        );
    }

    #[test]
    fn test_same_key_within_ttl_reuses_handle() {
        let mut context = HeadlessContext::new();
        let mut cache = cache();

        let first = cache.get("A", 256, 256, 0.0, &mut context).unwrap().handle();
        let second = cache.get("A", 256, 256, 4.0, &mut context).unwrap().handle();
        assert!(first.is_some());
        assert_eq!(first, second);

        let other_size = cache.get("A", 128, 128, 4.0, &mut context).unwrap().handle();
        assert_ne!(first, other_size);
        assert_eq!(cache.live_count(), 2);
    }

    #[test]
    fn test_expired_request_recreates() {
        let mut context = HeadlessContext::new();
        let mut cache = cache();

        let first = cache.get("A", 64, 64, 0.0, &mut context).unwrap().handle();
        let second = cache.get("A", 64, 64, 5.5, &mut context).unwrap().handle();
        assert_ne!(first, second);
        assert_eq!(context.live_render_targets(), 1);
    }

    #[test]
    fn test_evict_stale_destroys_unused_targets() {
        let mut context = HeadlessContext::new();
        let mut cache = cache();
        cache.get("A", 64, 64, 0.0, &mut context).unwrap();
        cache.get("A", 32, 32, 3.0, &mut context).unwrap();

        assert_eq!(cache.evict_stale(6.0, &mut context), 1);
        assert_eq!(cache.live_count(), 1);
        assert_eq!(context.live_render_targets(), 1);

        cache.destroy_all(&mut context);
        assert_eq!(context.live_render_targets(), 0);
        assert!(cache.is_registered("A"));
    }
}
