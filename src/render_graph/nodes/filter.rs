//! Fullscreen shader node

use crate::backend::traits::*;
use crate::render_graph::node::*;
use crate::render_graph::pass::{FrameContext, FullscreenPass, InputTextures};
use crate::render_graph::resource::OutputSpec;
use crate::resources::material::{Material, UniformValue};

/// Runs a fullscreen shader over its inputs.
///
/// Each input pin binds to the material texture slot of the same name.
pub struct FilterNode {
    core: NodeCore,
    pass: FullscreenPass,
}

impl FilterNode {
    pub fn new(name: &str, material: Material) -> Self {
        Self {
            core: NodeCore::new(name),
            pass: FullscreenPass::new(material),
        }
    }

    pub fn with_input(mut self, pin: &str, input: impl Into<InputRef>) -> Self {
        self.core.set_input(pin, input.into());
        self
    }

    pub fn with_output(mut self, pin: &str, spec: OutputSpec) -> Self {
        self.core.set_output(pin, spec);
        self
    }

    /// Expose output `pin` as the enclosing group's output `group_pin`
    pub fn with_group_output(mut self, pin: &str, group_pin: &str) -> Self {
        self.core.export_output(pin, group_pin);
        self
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<UniformValue>) -> Self {
        self.set_parameter(name, value);
        self
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.pass.set_uniform(name, value);
    }

    pub fn parameter(&self, name: &str) -> Option<UniformValue> {
        self.pass.material().uniform(name)
    }

    pub fn material(&self) -> &Material {
        self.pass.material()
    }
}

impl Node for FilterNode {
    impl_node_core!();

    fn kind(&self) -> NodeKind {
        NodeKind::Filter
    }

    fn validate_input(&self, pin: &str) -> bool {
        self.pass.material().has_texture_slot(pin)
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        _ctx: &FrameContext,
        inputs: &InputTextures,
        target: Option<FramebufferHandle>,
    ) -> BackendResult<()> {
        self.pass.render(renderer, inputs, target)
    }
}
