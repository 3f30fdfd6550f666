//! Dummy renderer for testing and development.
//!
//! This backend doesn't perform any GPU work. It validates handles, keeps
//! track of live resources and records every draw so tests can inspect
//! what the compositor asked for.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::material::Material;
use rustc_hash::FxHashMap;

/// One recorded fullscreen draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub material: String,
    pub target: Option<FramebufferHandle>,
    /// Attachments of `target` at draw time
    pub attachments: Vec<(AttachmentPoint, TextureHandle)>,
    /// Texture bound to each shader slot, in slot order
    pub textures: Vec<(String, Option<TextureHandle>)>,
}

impl DrawCall {
    pub fn texture(&self, slot: &str) -> Option<TextureHandle> {
        self.textures
            .iter()
            .find(|(name, _)| name == slot)
            .and_then(|(_, texture)| *texture)
    }

    pub fn color_target(&self) -> Option<TextureHandle> {
        self.attachments
            .iter()
            .find(|(point, _)| *point == AttachmentPoint::Color(0))
            .map(|(_, texture)| *texture)
    }
}

/// Dummy renderer.
#[derive(Debug)]
pub struct DummyBackend {
    width: u32,
    height: u32,
    next_id: u64,
    textures: FxHashMap<u64, TextureDescriptor>,
    framebuffers: FxHashMap<u64, Vec<(AttachmentPoint, TextureHandle)>>,
    shaders: FxHashMap<u64, ShaderDescriptor>,
    bound: Option<FramebufferHandle>,
    draws: Vec<DrawCall>,
    cleared: Vec<TextureHandle>,
    mipmapped: Vec<TextureHandle>,
    textures_created: usize,
    failing_material: Option<String>,
    fail_texture_creation: bool,
}

impl DummyBackend {
    /// Create a new dummy backend with the given output surface size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_id: 1,
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            shaders: FxHashMap::default(),
            bound: None,
            draws: Vec::new(),
            cleared: Vec::new(),
            mipmapped: Vec::new(),
            textures_created: 0,
            failing_material: None,
            fail_texture_creation: false,
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Make every draw with the named material fail with `DrawFailed`
    pub fn fail_draws_with(&mut self, material: Option<&str>) {
        self.failing_material = material.map(str::to_string);
    }

    /// Make texture creation fail with `TextureCreationFailed`
    pub fn fail_texture_creation(&mut self, fail: bool) {
        self.fail_texture_creation = fail;
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    /// Drain recorded draws
    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draws)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    pub fn cleared(&self) -> &[TextureHandle] {
        &self.cleared
    }

    pub fn mipmapped(&self) -> &[TextureHandle] {
        &self.mipmapped
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_texture(&self, texture: TextureHandle) -> BackendResult<()> {
        if self.textures.contains_key(&texture.0) {
            Ok(())
        } else {
            Err(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl Renderer for DummyBackend {
    fn viewport_width(&self) -> u32 {
        self.width
    }

    fn viewport_height(&self) -> u32 {
        self.height
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "zero sized texture {:?}",
                desc.label
            )));
        }
        if self.fail_texture_creation {
            return Err(BackendError::TextureCreationFailed(
                "injected allocation failure".into(),
            ));
        }
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let id = self.allocate_id();
        self.textures.insert(id, desc.clone());
        self.textures_created += 1;
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        log::trace!("DummyBackend: destroying texture {:?}", texture);
        if self.textures.remove(&texture.0).is_none() {
            log::warn!("DummyBackend: destroying unknown texture {:?}", texture);
        }
    }

    fn clear_texture(&mut self, texture: TextureHandle, _color: [f32; 4]) -> BackendResult<()> {
        self.check_texture(texture)?;
        self.cleared.push(texture);
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) -> BackendResult<()> {
        self.check_texture(texture)?;
        self.mipmapped.push(texture);
        Ok(())
    }

    fn create_framebuffer(&mut self) -> BackendResult<FramebufferHandle> {
        let id = self.allocate_id();
        log::trace!("DummyBackend: creating framebuffer {}", id);
        self.framebuffers.insert(id, Vec::new());
        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
        if self.bound == Some(framebuffer) {
            self.bound = None;
        }
    }

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: TextureHandle,
        attachment: AttachmentPoint,
    ) -> BackendResult<()> {
        self.check_texture(texture)?;
        let attachments = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        attachments.retain(|(point, _)| *point != attachment);
        attachments.push((attachment, texture));
        Ok(())
    }

    fn detach_all(&mut self, framebuffer: FramebufferHandle) {
        if let Some(attachments) = self.framebuffers.get_mut(&framebuffer.0) {
            attachments.clear();
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.bound = Some(framebuffer);
    }

    fn unbind_framebuffer(&mut self) {
        self.bound = None;
    }

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<ShaderHandle> {
        log::trace!("DummyBackend: creating shader '{}'", desc.label);
        let id = self.allocate_id();
        self.shaders.insert(id, desc.clone());
        Ok(ShaderHandle(id))
    }

    fn render_fullscreen_quad(
        &mut self,
        material: &Material,
        target: Option<FramebufferHandle>,
    ) -> BackendResult<()> {
        if !self.shaders.contains_key(&material.shader().0) {
            return Err(BackendError::InvalidHandle {
                kind: "shader",
                id: material.shader().0,
            });
        }
        if self.failing_material.as_deref() == Some(material.name.as_str()) {
            return Err(BackendError::DrawFailed(format!(
                "injected failure for '{}'",
                material.name
            )));
        }

        let attachments = match target {
            Some(framebuffer) => self
                .framebuffers
                .get(&framebuffer.0)
                .cloned()
                .ok_or(BackendError::InvalidHandle {
                    kind: "framebuffer",
                    id: framebuffer.0,
                })?,
            None => Vec::new(),
        };

        let mut textures = Vec::new();
        for (slot, texture) in material.bound_textures() {
            if let Some(texture) = texture {
                self.check_texture(texture)?;
            }
            textures.push((slot.to_string(), texture));
        }

        log::trace!(
            "DummyBackend: drawing '{}' into {:?}",
            material.name,
            target
        );
        self.draws.push(DrawCall {
            material: material.name.clone(),
            target,
            attachments,
            textures,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_backend_tracks_textures() {
        let mut backend = DummyBackend::new(64, 64);
        let texture = backend
            .create_texture(&TextureDescriptor::new(16, 16, TextureFormat::Rgba8Unorm))
            .unwrap();
        assert_eq!(backend.live_textures(), 1);

        backend.destroy_texture(texture);
        assert_eq!(backend.live_textures(), 0);
        assert!(backend.clear_texture(texture, [0.0; 4]).is_err());
    }

    #[test]
    fn test_dummy_backend_records_draws() {
        let mut backend = DummyBackend::new(64, 64);
        let desc = ShaderDescriptor::new("copy", "").with_texture("texture");
        let shader = backend.create_shader(&desc).unwrap();
        let input = backend
            .create_texture(&TextureDescriptor::new(64, 64, TextureFormat::Rgba8Unorm))
            .unwrap();
        let output = backend
            .create_texture(&TextureDescriptor::new(64, 64, TextureFormat::Rgba8Unorm))
            .unwrap();
        let framebuffer = backend.create_framebuffer().unwrap();
        backend
            .attach_texture(framebuffer, output, AttachmentPoint::Color(0))
            .unwrap();

        let mut material = Material::new("copy", shader, &desc);
        material.set_texture("texture", input);
        backend
            .render_fullscreen_quad(&material, Some(framebuffer))
            .unwrap();

        let draw = &backend.draws()[0];
        assert_eq!(draw.material, "copy");
        assert_eq!(draw.texture("texture"), Some(input));
        assert_eq!(draw.color_target(), Some(output));
    }

    #[test]
    fn test_dummy_backend_injected_failure() {
        let mut backend = DummyBackend::new(64, 64);
        let desc = ShaderDescriptor::new("copy", "");
        let shader = backend.create_shader(&desc).unwrap();
        backend.fail_draws_with(Some("copy"));

        let material = Material::new("copy", shader, &desc);
        assert!(matches!(
            backend.render_fullscreen_quad(&material, None),
            Err(BackendError::DrawFailed(_))
        ));
    }
}
