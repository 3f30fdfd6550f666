//! Common types shared between backends

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum TextureFormat {
    #[default]
    #[serde(alias = "RGBA", alias = "rgba8")]
    Rgba8Unorm,
    #[serde(alias = "SRGBA")]
    Rgba8UnormSrgb,
    Bgra8Unorm,
    #[serde(alias = "RGBA16F", alias = "rgba16f")]
    Rgba16Float,
    #[serde(alias = "RGBA32F", alias = "rgba32f")]
    Rgba32Float,
    R32Float,
    Rg32Float,
    #[serde(alias = "DEPTH_COMPONENT")]
    Depth32Float,
    #[serde(alias = "DEPTH_STENCIL")]
    Depth24PlusStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::R32Float => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Sampler filter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[serde(alias = "NEAREST")]
    Nearest,
    #[default]
    #[serde(alias = "LINEAR")]
    Linear,
}

/// Sampler address mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    #[default]
    #[serde(alias = "CLAMP_TO_EDGE")]
    ClampToEdge,
    #[serde(alias = "REPEAT")]
    Repeat,
    #[serde(alias = "MIRRORED_REPEAT")]
    MirrorRepeat,
}

/// Framebuffer attachment point an output texture is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum AttachmentPoint {
    Color(u8),
    Depth,
}

impl Default for AttachmentPoint {
    fn default() -> Self {
        AttachmentPoint::Color(0)
    }
}

impl fmt::Display for AttachmentPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentPoint::Color(index) => write!(f, "color{}", index),
            AttachmentPoint::Depth => f.write_str("depth"),
        }
    }
}

impl FromStr for AttachmentPoint {
    type Err = String;

    /// Accepts `color0`, `COLOR_ATTACHMENT0`, `depth` and `DEPTH_ATTACHMENT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower == "depth" || lower == "depth_attachment" {
            return Ok(AttachmentPoint::Depth);
        }
        let index = lower
            .strip_prefix("color_attachment")
            .or_else(|| lower.strip_prefix("color"))
            .ok_or_else(|| format!("unknown attachment point '{}'", s))?;
        let index = if index.is_empty() { "0" } else { index };
        index
            .parse::<u8>()
            .map(AttachmentPoint::Color)
            .map_err(|_| format!("invalid color attachment index in '{}'", s))
    }
}

impl TryFrom<String> for AttachmentPoint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Fully resolved texture allocation request
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub mip_levels: u32,
}

impl TextureDescriptor {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: None,
            width,
            height,
            format,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            mip_levels: 1,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mipmaps(mut self) -> Self {
        self.mip_levels = full_mip_chain(self.width, self.height);
        self
    }

    pub fn has_mipmaps(&self) -> bool {
        self.mip_levels > 1
    }
}

/// Number of levels in a complete mip chain for the given size
pub fn full_mip_chain(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Description of a fullscreen fragment shader.
///
/// `source` holds only the fragment stage. Backends supply the fullscreen
/// vertex stage, declare one sampled texture per entry of `texture_slots`
/// under the slot's own name, and expose `uniforms` in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDescriptor {
    pub label: String,
    pub source: String,
    pub texture_slots: Vec<String>,
    pub uniforms: Vec<String>,
}

impl ShaderDescriptor {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            texture_slots: Vec::new(),
            uniforms: Vec::new(),
        }
    }

    pub fn with_texture(mut self, slot: impl Into<String>) -> Self {
        self.texture_slots.push(slot.into());
        self
    }

    pub fn with_uniform(mut self, name: impl Into<String>) -> Self {
        self.uniforms.push(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_point_parsing() {
        assert_eq!("color0".parse(), Ok(AttachmentPoint::Color(0)));
        assert_eq!("COLOR_ATTACHMENT2".parse(), Ok(AttachmentPoint::Color(2)));
        assert_eq!("depth".parse(), Ok(AttachmentPoint::Depth));
        assert_eq!("DEPTH_ATTACHMENT".parse(), Ok(AttachmentPoint::Depth));
        assert!("stencil".parse::<AttachmentPoint>().is_err());
    }

    #[test]
    fn test_full_mip_chain() {
        assert_eq!(full_mip_chain(1, 1), 1);
        assert_eq!(full_mip_chain(256, 256), 9);
        assert_eq!(full_mip_chain(512, 128), 10);
    }

    #[test]
    fn test_format_from_json_alias() {
        let format: TextureFormat = serde_json::from_str("\"RGBA16F\"").unwrap();
        assert_eq!(format, TextureFormat::Rgba16Float);
    }
}
