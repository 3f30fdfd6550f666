//! Group nodes
//!
//! A group owns a private node set and exposes some of its children's pins
//! as its own. Children reach the group's inputs through
//! [`InputRef::group_input`], and export outputs with
//! [`NodeCore::export_output`]. The group itself never renders: links are
//! resolved straight through it to the children on either side.

use crate::backend::traits::*;
use crate::render_graph::error::GraphResult;
use crate::render_graph::node::*;
use crate::render_graph::pass::{FrameContext, InputTextures};

/// Group pin to child pin mapping, rebuilt every frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Boundary {
    inputs: Vec<(String, Vec<(NodeId, String)>)>,
    outputs: Vec<(String, NodeId, String)>,
}

impl Boundary {
    /// Children consuming group input `pin`
    pub fn input_targets(&self, pin: &str) -> &[(NodeId, String)] {
        self.inputs
            .iter()
            .find(|(name, _)| name == pin)
            .map(|(_, targets)| targets.as_slice())
            .unwrap_or(&[])
    }

    /// Child and child pin behind group output `pin`
    pub fn output_source(&self, pin: &str) -> Option<(NodeId, &str)> {
        self.outputs
            .iter()
            .find(|(name, _, _)| name == pin)
            .map(|(_, id, child_pin)| (*id, child_pin.as_str()))
    }

    pub fn output_pins(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(name, _, _)| name.as_str())
    }

    fn rebuild(&mut self, children: &NodeSet) {
        self.inputs.clear();
        self.outputs.clear();

        for (id, child) in children.iter() {
            for (child_pin, input) in child.inputs() {
                if let NodeRef::GroupInput(group_pin) = &input.node {
                    match self.inputs.iter_mut().find(|(name, _)| name == group_pin) {
                        Some((_, targets)) => targets.push((id, child_pin.clone())),
                        None => self
                            .inputs
                            .push((group_pin.clone(), vec![(id, child_pin.clone())])),
                    }
                }
            }
            for (child_pin, group_pin) in &child.core().group_outputs {
                if self.output_source(group_pin).is_some() {
                    log::warn!(
                        "Group output '{}' exported twice, keeping the first",
                        group_pin
                    );
                    continue;
                }
                self.outputs
                    .push((group_pin.clone(), id, child_pin.clone()));
            }
        }
    }
}

/// Node that encapsulates a sub-graph
pub struct GroupNode {
    core: NodeCore,
    children: NodeSet,
    boundary: Boundary,
}

impl GroupNode {
    pub fn new(name: &str) -> Self {
        Self {
            core: NodeCore::new(name),
            children: NodeSet::new(),
            boundary: Boundary::default(),
        }
    }

    /// Bind group input `pin` to a node outside the group
    pub fn with_input(mut self, pin: &str, input: impl Into<InputRef>) -> Self {
        self.core.set_input(pin, input.into());
        self
    }

    /// Expose group output `pin` as the enclosing group's output `group_pin`
    pub fn with_group_output(mut self, pin: &str, group_pin: &str) -> Self {
        self.core.export_output(pin, group_pin);
        self
    }

    pub fn with_child(mut self, node: impl Node) -> GraphResult<Self> {
        self.add_child(node)?;
        Ok(self)
    }

    pub fn add_child(&mut self, node: impl Node) -> GraphResult<NodeId> {
        let id = self.children.insert(Box::new(node))?;
        self.boundary.rebuild(&self.children);
        Ok(id)
    }

    pub fn add_boxed_child(&mut self, node: Box<dyn Node>) -> GraphResult<NodeId> {
        let id = self.children.insert(node)?;
        self.boundary.rebuild(&self.children);
        Ok(id)
    }

    pub fn remove_child(&mut self, id: NodeId) -> Option<Box<dyn Node>> {
        let node = self.children.remove(id)?;
        self.boundary.rebuild(&self.children);
        Some(node)
    }

    pub fn children(&self) -> &NodeSet {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut NodeSet {
        &mut self.children
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }
}

impl Node for GroupNode {
    impl_node_core!();

    fn kind(&self) -> NodeKind {
        NodeKind::Group
    }

    fn first_output(&self) -> Option<&str> {
        self.boundary.output_pins().next()
    }

    fn is_terminal(&self) -> bool {
        false
    }

    fn prepare(&mut self, ctx: &FrameContext) {
        for (_, child) in self.children.iter_mut() {
            child.prepare(ctx);
        }
        self.boundary.rebuild(&self.children);
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

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        for (_, child) in self.children.iter_mut() {
            child.dispose(renderer);
        }
    }

    fn as_group(&self) -> Option<&GroupNode> {
        Some(self)
    }

    fn as_group_mut(&mut self) -> Option<&mut GroupNode> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::nodes::{SceneNode, TextureNode};
    use crate::render_graph::resource::OutputSpec;

    #[test]
    fn test_boundary_tracks_exports_and_group_inputs() {
        let group = GroupNode::new("blur")
            .with_input("texture", "scene")
            .with_child(
                SceneNode::empty("inner")
                    .with_output("color", OutputSpec::default())
                    .with_group_output("color", "blurred"),
            )
            .unwrap()
            .with_child(TextureNode::new("lut", None))
            .unwrap();

        let inner = group.children().find("inner").unwrap();
        assert_eq!(group.boundary().output_source("blurred"), Some((inner, "color")));
        assert_eq!(group.first_output(), Some("blurred"));
        assert!(group.boundary().input_targets("texture").is_empty());
        assert!(!group.is_terminal());
    }

    #[test]
    fn test_duplicate_child_names_rejected() {
        let mut group = GroupNode::new("g");
        group.add_child(TextureNode::new("a", None)).unwrap();
        assert!(group.add_child(TextureNode::new("a", None)).is_err());
        assert_eq!(group.children().len(), 1);
    }
}
