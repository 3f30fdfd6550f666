//! Named registry of compiled fullscreen shaders

use crate::backend::traits::{BackendResult, Renderer, ShaderHandle};
use crate::backend::types::ShaderDescriptor;
use crate::resources::material::Material;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
struct ShaderEntry {
    handle: ShaderHandle,
    desc: ShaderDescriptor,
}

/// Shaders compiled once and looked up by name when building materials
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    shaders: FxHashMap<String, ShaderEntry>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `desc` and register it under `name`, replacing any shader
    /// already registered with that name.
    pub fn register(
        &mut self,
        renderer: &mut dyn Renderer,
        name: &str,
        desc: ShaderDescriptor,
    ) -> BackendResult<ShaderHandle> {
        let handle = renderer.create_shader(&desc)?;
        log::debug!("Registered shader '{}' as {:?}", name, handle);
        self.shaders
            .insert(name.to_string(), ShaderEntry { handle, desc });
        Ok(handle)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shaders.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<(ShaderHandle, &ShaderDescriptor)> {
        self.shaders
            .get(name)
            .map(|entry| (entry.handle, &entry.desc))
    }

    /// Build a fresh material for the shader registered under `shader`
    pub fn material(&self, material_name: &str, shader: &str) -> Option<Material> {
        self.get(shader)
            .map(|(handle, desc)| Material::new(material_name, handle, desc))
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}
