//! Compositor configuration

use crate::backend::types::TextureFormat;
use serde::Deserialize;

/// Texture served for a previous-frame read before any frame was retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum FeedbackPlaceholder {
    /// Allocate with the producing pin's own parameters
    #[default]
    MatchOutput,
    /// Allocate a fixed size texture
    Fixed {
        width: u32,
        height: u32,
        format: TextureFormat,
    },
}

/// Configuration for a [`RenderGraph`](crate::render_graph::RenderGraph)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// How the first-frame previous texture is allocated
    pub feedback_placeholder: FeedbackPlaceholder,
    /// Clear placeholder textures to transparent black when allocated
    pub clear_placeholder: bool,
    /// Destroy pooled textures unused for more than this many frames
    pub pool_max_idle_frames: Option<u32>,
    /// Format of outputs that do not name one
    pub default_format: TextureFormat,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            feedback_placeholder: FeedbackPlaceholder::MatchOutput,
            clear_placeholder: true,
            pool_max_idle_frames: Some(120),
            default_format: TextureFormat::Rgba8Unorm,
        }
    }
}

impl CompositorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feedback_placeholder(mut self, placeholder: FeedbackPlaceholder) -> Self {
        self.feedback_placeholder = placeholder;
        self
    }

    pub fn with_clear_placeholder(mut self, clear: bool) -> Self {
        self.clear_placeholder = clear;
        self
    }

    pub fn with_pool_max_idle_frames(mut self, frames: Option<u32>) -> Self {
        self.pool_max_idle_frames = frames;
        self
    }

    pub fn with_default_format(mut self, format: TextureFormat) -> Self {
        self.default_format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_partial_json() {
        let config: CompositorConfig = serde_json::from_str(
            r#"{
                "feedback_placeholder": { "mode": "fixed", "width": 1, "height": 1, "format": "Rgba8Unorm" },
                "pool_max_idle_frames": null
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.feedback_placeholder,
            FeedbackPlaceholder::Fixed {
                width: 1,
                height: 1,
                format: TextureFormat::Rgba8Unorm
            }
        );
        assert!(config.clear_placeholder);
        assert_eq!(config.pool_max_idle_frames, None);
        assert_eq!(config.default_format, TextureFormat::Rgba8Unorm);
    }
}
