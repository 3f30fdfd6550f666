//! Output pin resources for the render graph

use crate::backend::types::*;
use std::fmt;
use std::sync::Arc;

/// Size along one axis of a render target
#[derive(Clone)]
pub enum SizeSpec {
    /// Absolute size in pixels
    Fixed(u32),
    /// Relative to the viewport extent along the same axis (1.0 = full size)
    Viewport { scale: f32 },
    /// Computed from the viewport width and height
    Func(Arc<dyn Fn(u32, u32) -> u32 + Send + Sync>),
}

impl Default for SizeSpec {
    fn default() -> Self {
        SizeSpec::Viewport { scale: 1.0 }
    }
}

impl fmt::Debug for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeSpec::Fixed(pixels) => f.debug_tuple("Fixed").field(pixels).finish(),
            SizeSpec::Viewport { scale } => {
                f.debug_struct("Viewport").field("scale", scale).finish()
            }
            SizeSpec::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl SizeSpec {
    pub fn viewport() -> Self {
        SizeSpec::Viewport { scale: 1.0 }
    }

    pub fn scaled(scale: f32) -> Self {
        SizeSpec::Viewport { scale }
    }

    pub fn func(f: impl Fn(u32, u32) -> u32 + Send + Sync + 'static) -> Self {
        SizeSpec::Func(Arc::new(f))
    }

    /// Resolve to pixels. `extent` is the viewport size along this axis.
    /// Never returns zero.
    pub fn resolve(&self, extent: u32, viewport_width: u32, viewport_height: u32) -> u32 {
        let pixels = match self {
            SizeSpec::Fixed(pixels) => *pixels,
            SizeSpec::Viewport { scale } => ((extent as f32) * scale).round() as u32,
            SizeSpec::Func(f) => f(viewport_width, viewport_height),
        };
        pixels.max(1)
    }
}

/// Allocation parameters of an output pin's render target
#[derive(Debug, Clone)]
pub struct RenderTargetParams {
    pub width: SizeSpec,
    pub height: SizeSpec,
    /// `None` uses the graph's default format
    pub format: Option<TextureFormat>,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub use_mipmap: bool,
}

impl Default for RenderTargetParams {
    fn default() -> Self {
        Self {
            width: SizeSpec::viewport(),
            height: SizeSpec::viewport(),
            format: None,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            use_mipmap: false,
        }
    }
}

impl RenderTargetParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(width: u32, height: u32) -> Self {
        Self {
            width: SizeSpec::Fixed(width),
            height: SizeSpec::Fixed(height),
            ..Default::default()
        }
    }

    pub fn scaled(scale: f32) -> Self {
        Self {
            width: SizeSpec::scaled(scale),
            height: SizeSpec::scaled(scale),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, width: SizeSpec, height: SizeSpec) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_filter(mut self, min_filter: FilterMode, mag_filter: FilterMode) -> Self {
        self.min_filter = min_filter;
        self.mag_filter = mag_filter;
        self
    }

    pub fn with_wrap(mut self, wrap_s: WrapMode, wrap_t: WrapMode) -> Self {
        self.wrap_s = wrap_s;
        self.wrap_t = wrap_t;
        self
    }

    pub fn with_mipmap(mut self, use_mipmap: bool) -> Self {
        self.use_mipmap = use_mipmap;
        self
    }

    /// Resolve against the current viewport into a concrete allocation request
    pub fn resolve(
        &self,
        viewport_width: u32,
        viewport_height: u32,
        default_format: TextureFormat,
    ) -> TextureDescriptor {
        let width = self
            .width
            .resolve(viewport_width, viewport_width, viewport_height);
        let height = self
            .height
            .resolve(viewport_height, viewport_width, viewport_height);
        let desc = TextureDescriptor {
            label: None,
            width,
            height,
            format: self.format.unwrap_or(default_format),
            min_filter: self.min_filter,
            mag_filter: self.mag_filter,
            wrap_s: self.wrap_s,
            wrap_t: self.wrap_t,
            mip_levels: 1,
        };
        if self.use_mipmap {
            desc.with_mipmaps()
        } else {
            desc
        }
    }
}

/// Declared output pin of a node
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub params: RenderTargetParams,
    pub attachment: AttachmentPoint,
    /// Retain this frame's texture as the pin's previous-frame texture
    pub keep_last_frame: bool,
    /// Consumers always read the previous-frame texture
    pub output_last_frame: bool,
    /// Disabled pins are not allocated and cannot be linked
    pub enabled: bool,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            params: RenderTargetParams::default(),
            attachment: AttachmentPoint::Color(0),
            keep_last_frame: false,
            output_last_frame: false,
            enabled: true,
        }
    }
}

impl OutputSpec {
    pub fn new(params: RenderTargetParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, attachment: AttachmentPoint) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn keep_last_frame(mut self) -> Self {
        self.keep_last_frame = true;
        self
    }

    /// Serve the previous frame to consumers. Implies `keep_last_frame`.
    pub fn output_last_frame(mut self) -> Self {
        self.output_last_frame = true;
        self.keep_last_frame = true;
        self
    }

    pub fn retains_last_frame(&self) -> bool {
        self.keep_last_frame || self.output_last_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_spec_resolution() {
        assert_eq!(SizeSpec::Fixed(100).resolve(800, 800, 600), 100);
        assert_eq!(SizeSpec::Fixed(0).resolve(800, 800, 600), 1);
        assert_eq!(SizeSpec::scaled(0.5).resolve(600, 800, 600), 300);
        assert_eq!(SizeSpec::scaled(0.0).resolve(600, 800, 600), 1);
        assert_eq!(SizeSpec::func(|w, h| (w + h) / 4).resolve(600, 800, 600), 350);
    }

    #[test]
    fn test_params_resolve_uses_axis_extent() {
        let desc = RenderTargetParams::scaled(0.5)
            .with_format(TextureFormat::Rgba16Float)
            .resolve(800, 600, TextureFormat::Rgba8Unorm);
        assert_eq!((desc.width, desc.height), (400, 300));
        assert_eq!(desc.format, TextureFormat::Rgba16Float);
        assert_eq!(desc.mip_levels, 1);

        let desc = RenderTargetParams::fixed(256, 256)
            .with_mipmap(true)
            .resolve(800, 600, TextureFormat::Rgba8Unorm);
        assert_eq!(desc.mip_levels, 9);
    }

    #[test]
    fn test_params_without_format_use_default() {
        let params = RenderTargetParams::fixed(64, 64);
        assert_eq!(params.format, None);
        let desc = params.resolve(800, 600, TextureFormat::Rgba16Float);
        assert_eq!(desc.format, TextureFormat::Rgba16Float);
    }

    #[test]
    fn test_output_last_frame_implies_keep() {
        let spec = OutputSpec::default().output_last_frame();
        assert!(spec.keep_last_frame);
        assert!(spec.retains_last_frame());
        assert!(!OutputSpec::default().retains_last_frame());
    }
}
