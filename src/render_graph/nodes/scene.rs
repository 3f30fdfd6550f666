//! Host drawn node

use crate::backend::traits::*;
use crate::render_graph::node::*;
use crate::render_graph::pass::{FrameContext, InputTextures};
use crate::render_graph::resource::OutputSpec;

/// Draw callback of a [`SceneNode`]
pub type DrawFn =
    Box<dyn FnMut(&mut dyn Renderer, &FrameContext, Option<FramebufferHandle>) -> BackendResult<()>>;

/// Node whose contents are drawn by the host, typically the 3D scene the
/// post-processing chain starts from.
pub struct SceneNode {
    core: NodeCore,
    draw: DrawFn,
}

impl SceneNode {
    pub fn new<F>(name: &str, draw: F) -> Self
    where
        F: FnMut(&mut dyn Renderer, &FrameContext, Option<FramebufferHandle>) -> BackendResult<()>
            + 'static,
    {
        Self {
            core: NodeCore::new(name),
            draw: Box::new(draw),
        }
    }

    /// Scene node that draws nothing until [`SceneNode::set_draw`] is called
    pub fn empty(name: &str) -> Self {
        Self::new(name, |_, _, _| Ok(()))
    }

    pub fn with_output(mut self, pin: &str, spec: OutputSpec) -> Self {
        self.core.set_output(pin, spec);
        self
    }

    pub fn with_group_output(mut self, pin: &str, group_pin: &str) -> Self {
        self.core.export_output(pin, group_pin);
        self
    }

    pub fn set_draw<F>(&mut self, draw: F)
    where
        F: FnMut(&mut dyn Renderer, &FrameContext, Option<FramebufferHandle>) -> BackendResult<()>
            + 'static,
    {
        self.draw = Box::new(draw);
    }
}

impl Node for SceneNode {
    impl_node_core!();

    fn kind(&self) -> NodeKind {
        NodeKind::Scene
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        ctx: &FrameContext,
        _inputs: &InputTextures,
        target: Option<FramebufferHandle>,
    ) -> BackendResult<()> {
        (self.draw)(renderer, ctx, target)
    }
}
