//! External texture node

use crate::backend::traits::*;
use crate::render_graph::node::*;
use crate::render_graph::pass::{FrameContext, InputTextures};
use crate::render_graph::resource::OutputSpec;

/// Serves a texture owned by the host. The texture is never pooled,
/// released or rendered into.
pub struct TextureNode {
    core: NodeCore,
    texture: Option<TextureHandle>,
}

impl TextureNode {
    pub const OUTPUT: &'static str = "texture";

    pub fn new(name: &str, texture: Option<TextureHandle>) -> Self {
        let mut core = NodeCore::new(name);
        core.set_output(Self::OUTPUT, OutputSpec::default());
        Self { core, texture }
    }

    pub fn with_group_output(mut self, group_pin: &str) -> Self {
        self.core.export_output(Self::OUTPUT, group_pin);
        self
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn set_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
    }
}

impl Node for TextureNode {
    impl_node_core!();

    fn kind(&self) -> NodeKind {
        NodeKind::Texture
    }

    fn render(
        &mut self,
        _renderer: &mut dyn Renderer,
        _ctx: &FrameContext,
        _inputs: &InputTextures,
        _target: Option<FramebufferHandle>,
    ) -> BackendResult<()> {
        Ok(())
    }

    fn external_output(&self, pin: &str) -> Option<TextureHandle> {
        if pin == Self::OUTPUT {
            self.texture
        } else {
            None
        }
    }
}
