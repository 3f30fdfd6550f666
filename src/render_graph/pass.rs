//! Per-frame pass context and the fullscreen pass used by filter nodes

use crate::backend::traits::*;
use crate::resources::material::{Material, UniformValue};

/// Per-frame values shared by every node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    pub frame: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Input textures bound for one node render, keyed by input pin
#[derive(Debug, Clone, Default)]
pub struct InputTextures {
    entries: Vec<(String, TextureHandle)>,
}

impl InputTextures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pin: &str, texture: TextureHandle) {
        match self.entries.iter_mut().find(|(name, _)| name == pin) {
            Some(entry) => entry.1 = texture,
            None => self.entries.push((pin.to_string(), texture)),
        }
    }

    pub fn get(&self, pin: &str) -> Option<TextureHandle> {
        self.entries
            .iter()
            .find(|(name, _)| name == pin)
            .map(|(_, texture)| *texture)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TextureHandle)> {
        self.entries
            .iter()
            .map(|(name, texture)| (name.as_str(), *texture))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Draws a fullscreen quad with a material
#[derive(Debug, Clone)]
pub struct FullscreenPass {
    material: Material,
}

impl FullscreenPass {
    pub fn new(material: Material) -> Self {
        Self { material }
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn material_mut(&mut self) -> &mut Material {
        &mut self.material
    }

    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.material.set_uniform(name, value);
    }

    /// Bind `inputs` to the material's texture slots and draw.
    ///
    /// Slots without an input stay unbound for this draw.
    pub fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        inputs: &InputTextures,
        target: Option<FramebufferHandle>,
    ) -> BackendResult<()> {
        self.material.clear_textures();
        for (pin, texture) in inputs.iter() {
            self.material.set_texture(pin, texture);
        }
        renderer.render_fullscreen_quad(&self.material, target)
    }
}
