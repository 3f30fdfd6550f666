//! Materials for fullscreen passes
//!
//! A material is a compiled shader plus the values bound to it: named
//! uniforms and named texture slots.

use crate::backend::traits::{ShaderHandle, TextureHandle};
use crate::backend::types::ShaderDescriptor;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use std::collections::BTreeMap;

/// Maximum number of vec4 uniform slots a fullscreen material can use
pub const MAX_UNIFORM_SLOTS: usize = 15;

/// A single uniform value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl UniformValue {
    /// Pack into one vec4 slot
    pub fn to_vec4(self) -> Vec4 {
        match self {
            UniformValue::Float(v) => Vec4::new(v, 0.0, 0.0, 0.0),
            UniformValue::Int(v) => Vec4::new(v as f32, 0.0, 0.0, 0.0),
            UniformValue::Vec2(v) => v.extend(0.0).extend(0.0),
            UniformValue::Vec3(v) => v.extend(0.0),
            UniformValue::Vec4(v) => v,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<Vec2> for UniformValue {
    fn from(value: Vec2) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        UniformValue::Vec4(value)
    }
}

/// Fullscreen pass material
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    shader: ShaderHandle,
    texture_slots: Vec<String>,
    uniform_names: Vec<String>,
    uniforms: BTreeMap<String, UniformValue>,
    textures: BTreeMap<String, TextureHandle>,
}

impl Material {
    pub fn new(name: &str, shader: ShaderHandle, desc: &ShaderDescriptor) -> Self {
        Self {
            name: name.to_string(),
            shader,
            texture_slots: desc.texture_slots.clone(),
            uniform_names: desc.uniforms.clone(),
            uniforms: BTreeMap::new(),
            textures: BTreeMap::new(),
        }
    }

    pub fn with_uniform(mut self, name: &str, value: impl Into<UniformValue>) -> Self {
        self.set_uniform(name, value);
        self
    }

    pub fn shader(&self) -> ShaderHandle {
        self.shader
    }

    pub fn texture_slots(&self) -> &[String] {
        &self.texture_slots
    }

    pub fn uniform_names(&self) -> &[String] {
        &self.uniform_names
    }

    pub fn has_texture_slot(&self, slot: &str) -> bool {
        self.texture_slots.iter().any(|s| s == slot)
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniform_names.iter().any(|u| u == name)
    }

    /// Set a uniform value. Names the shader does not declare are kept
    /// but never uploaded.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        if !self.has_uniform(name) {
            log::warn!(
                "Material '{}' has no uniform named '{}'",
                self.name,
                name
            );
        }
        self.uniforms.insert(name.to_string(), value.into());
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    pub fn set_texture(&mut self, slot: &str, texture: TextureHandle) {
        self.textures.insert(slot.to_string(), texture);
    }

    pub fn texture(&self, slot: &str) -> Option<TextureHandle> {
        self.textures.get(slot).copied()
    }

    pub fn clear_textures(&mut self) {
        self.textures.clear();
    }

    /// Textures bound in shader slot order; unbound slots are `None`
    pub fn bound_textures(&self) -> impl Iterator<Item = (&str, Option<TextureHandle>)> {
        self.texture_slots
            .iter()
            .map(|slot| (slot.as_str(), self.textures.get(slot).copied()))
    }

    /// Create a uniform data struct for GPU
    pub fn uniform_data(&self, target_width: u32, target_height: u32) -> MaterialUniformData {
        let mut data = MaterialUniformData::zeroed();
        data.resolution = [
            target_width as f32,
            target_height as f32,
            1.0 / target_width.max(1) as f32,
            1.0 / target_height.max(1) as f32,
        ];
        for (slot, name) in self.uniform_names.iter().take(MAX_UNIFORM_SLOTS).enumerate() {
            if let Some(value) = self.uniforms.get(name) {
                data.values[slot] = value.to_vec4().to_array();
            }
        }
        data
    }
}

/// Material uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniformData {
    pub resolution: [f32; 4], // xy=target size, zw=texel size
    pub values: [[f32; 4]; MAX_UNIFORM_SLOTS],
}
