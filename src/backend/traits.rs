//! Core backend abstraction traits
//!
//! The compositor only needs a handful of GPU operations: render targets,
//! one framebuffer to attach them to, fullscreen shaders and a quad draw.

use crate::backend::types::*;
use crate::resources::material::Material;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Draw failed: {0}")]
    DrawFailed(String),
    #[error("Invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a framebuffer (a set of attachment points)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a compiled fullscreen shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub(crate) u64);

impl TextureHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl FramebufferHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl ShaderHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Renderer interface the compositor drives.
///
/// Object safe so nodes can receive `&mut dyn Renderer`.
pub trait Renderer {
    /// Width of the default output surface in pixels
    fn viewport_width(&self) -> u32;

    /// Height of the default output surface in pixels
    fn viewport_height(&self) -> u32;

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Fill every texel of `texture` with `color`
    fn clear_texture(&mut self, texture: TextureHandle, color: [f32; 4]) -> BackendResult<()>;

    /// Rebuild the mip chain of `texture` from level 0
    fn generate_mipmaps(&mut self, texture: TextureHandle) -> BackendResult<()>;

    fn create_framebuffer(&mut self) -> BackendResult<FramebufferHandle>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: TextureHandle,
        attachment: AttachmentPoint,
    ) -> BackendResult<()>;

    /// Remove every attachment from `framebuffer`
    fn detach_all(&mut self, framebuffer: FramebufferHandle);

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Bind the default output surface again
    fn unbind_framebuffer(&mut self);

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<ShaderHandle>;

    /// Draw a fullscreen quad with `material` into `target`, or into the
    /// default output surface when `target` is `None`.
    fn render_fullscreen_quad(
        &mut self,
        material: &Material,
        target: Option<FramebufferHandle>,
    ) -> BackendResult<()>;
}
