//! Compositor nodes
//!
//! A node declares named input pins (references to other nodes' outputs)
//! and an ordered list of output pins. A node without outputs is terminal
//! and draws straight into the graph's target.

use crate::backend::traits::*;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::group::GroupNode;
use crate::render_graph::pass::{FrameContext, InputTextures};
use crate::render_graph::resource::OutputSpec;
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;

/// Identifier of a node within the node set that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

/// Stable identity of a node anywhere in the graph: the path of node ids
/// from the root set down through group children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(SmallVec<[NodeId; 4]>);

impl NodeKey {
    pub fn root(id: NodeId) -> Self {
        let mut path = SmallVec::new();
        path.push(id);
        Self(path)
    }

    pub fn child(&self, id: NodeId) -> Self {
        let mut path = self.0.clone();
        path.push(id);
        Self(path)
    }

    pub fn path(&self) -> &[NodeId] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True if `self` is `other` or nested inside it
    pub fn starts_with(&self, other: &NodeKey) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", id.0)?;
        }
        Ok(())
    }
}

/// Which node an input refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    /// Node with this name in the same scope
    Name(String),
    /// Node with this id in the same scope
    Id(NodeId),
    /// Input pin of the enclosing group
    GroupInput(String),
}

/// Declared input of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRef {
    pub node: NodeRef,
    /// Output pin of the producer; `None` selects its first declared output
    pub pin: Option<String>,
    /// Always read the producer's previous-frame texture
    pub prev_frame: bool,
}

impl InputRef {
    pub fn node(name: &str) -> Self {
        Self {
            node: NodeRef::Name(name.to_string()),
            pin: None,
            prev_frame: false,
        }
    }

    pub fn id(id: NodeId) -> Self {
        Self {
            node: NodeRef::Id(id),
            pin: None,
            prev_frame: false,
        }
    }

    /// Route through the enclosing group's input pin `pin`
    pub fn group_input(pin: &str) -> Self {
        Self {
            node: NodeRef::GroupInput(pin.to_string()),
            pin: None,
            prev_frame: false,
        }
    }

    pub fn pin(mut self, pin: &str) -> Self {
        self.pin = Some(pin.to_string());
        self
    }

    pub fn prev_frame(mut self) -> Self {
        self.prev_frame = true;
        self
    }
}

impl From<&str> for InputRef {
    fn from(name: &str) -> Self {
        InputRef::node(name)
    }
}

impl From<NodeId> for InputRef {
    fn from(id: NodeId) -> Self {
        InputRef::id(id)
    }
}

/// Node kind, used by the scheduler to pick the evaluation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Filter,
    Scene,
    Texture,
    Group,
}

/// Name and pin declarations shared by every node kind
#[derive(Debug, Clone, Default)]
pub struct NodeCore {
    pub name: String,
    pub inputs: Vec<(String, InputRef)>,
    pub outputs: Vec<(String, OutputSpec)>,
    /// Own output pin -> enclosing group's output pin
    pub group_outputs: Vec<(String, String)>,
}

impl NodeCore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn input(&self, pin: &str) -> Option<&InputRef> {
        self.inputs
            .iter()
            .find(|(name, _)| name == pin)
            .map(|(_, input)| input)
    }

    pub fn set_input(&mut self, pin: &str, input: InputRef) {
        match self.inputs.iter_mut().find(|(name, _)| name == pin) {
            Some(entry) => entry.1 = input,
            None => self.inputs.push((pin.to_string(), input)),
        }
    }

    pub fn remove_input(&mut self, pin: &str) -> Option<InputRef> {
        let index = self.inputs.iter().position(|(name, _)| name == pin)?;
        Some(self.inputs.remove(index).1)
    }

    pub fn output(&self, pin: &str) -> Option<&OutputSpec> {
        self.outputs
            .iter()
            .find(|(name, _)| name == pin)
            .map(|(_, spec)| spec)
    }

    pub fn output_mut(&mut self, pin: &str) -> Option<&mut OutputSpec> {
        self.outputs
            .iter_mut()
            .find(|(name, _)| name == pin)
            .map(|(_, spec)| spec)
    }

    pub fn set_output(&mut self, pin: &str, spec: OutputSpec) {
        match self.output_mut(pin) {
            Some(existing) => *existing = spec,
            None => self.outputs.push((pin.to_string(), spec)),
        }
    }

    /// Expose `pin` as the enclosing group's output `group_pin`
    pub fn export_output(&mut self, pin: &str, group_pin: &str) {
        self.group_outputs.retain(|(own, _)| own != pin);
        self.group_outputs
            .push((pin.to_string(), group_pin.to_string()));
    }
}

/// A compositor node
pub trait Node: Any {
    fn core(&self) -> &NodeCore;

    fn core_mut(&mut self) -> &mut NodeCore;

    fn kind(&self) -> NodeKind;

    fn name(&self) -> &str {
        &self.core().name
    }

    fn inputs(&self) -> &[(String, InputRef)] {
        &self.core().inputs
    }

    fn outputs(&self) -> &[(String, OutputSpec)] {
        &self.core().outputs
    }

    /// Pin selected when an input names this node without a pin
    fn first_output(&self) -> Option<&str> {
        self.core()
            .outputs
            .iter()
            .find(|(_, spec)| spec.enabled)
            .map(|(name, _)| name.as_str())
    }

    /// True if the node has no outputs and draws into the graph target
    fn is_terminal(&self) -> bool {
        self.core().outputs.is_empty()
    }

    /// Whether this node can consume an input on `pin`
    fn validate_input(&self, _pin: &str) -> bool {
        true
    }

    /// Called once per frame before links are resolved
    fn prepare(&mut self, _ctx: &FrameContext) {}

    /// Draw the node. `target` has the node's outputs attached, or is the
    /// graph target for a terminal node.
    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        ctx: &FrameContext,
        inputs: &InputTextures,
        target: Option<FramebufferHandle>,
    ) -> BackendResult<()>;

    /// Texture served for `pin` without rendering, for nodes that wrap
    /// externally owned textures
    fn external_output(&self, _pin: &str) -> Option<TextureHandle> {
        None
    }

    /// Release resources the node owns
    fn dispose(&mut self, _renderer: &mut dyn Renderer) {}

    fn as_group(&self) -> Option<&GroupNode> {
        None
    }

    fn as_group_mut(&mut self) -> Option<&mut GroupNode> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Ordered set of nodes sharing one naming scope
#[derive(Default)]
pub struct NodeSet {
    nodes: Vec<(NodeId, Box<dyn Node>)>,
    next_id: u32,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Box<dyn Node>) -> GraphResult<NodeId> {
        if node.name().is_empty() {
            return Err(GraphError::InvalidDeclaration(
                "node name must not be empty".into(),
            ));
        }
        if self.find(node.name()).is_some() {
            return Err(GraphError::DuplicateNode(node.name().to_string()));
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push((id, node));
        Ok(id)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Box<dyn Node>> {
        let index = self.nodes.iter().position(|(node_id, _)| *node_id == id)?;
        Some(self.nodes.remove(index).1)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name() == name)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, id: NodeId) -> Option<&(dyn Node + 'static)> {
        self.nodes
            .iter()
            .find(|(node_id, _)| *node_id == id)
            .map(|(_, node)| node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut (dyn Node + 'static)> {
        match self.nodes.iter_mut().find(|(node_id, _)| *node_id == id) {
            Some((_, node)) => Some(node.as_mut()),
            None => None,
        }
    }

    /// Look up a node by its path relative to this set
    pub fn resolve(&self, path: &[NodeId]) -> Option<&(dyn Node + 'static)> {
        let (first, rest) = path.split_first()?;
        let node = self.get(*first)?;
        if rest.is_empty() {
            Some(node)
        } else {
            node.as_group()?.children().resolve(rest)
        }
    }

    pub fn resolve_mut(&mut self, path: &[NodeId]) -> Option<&mut (dyn Node + 'static)> {
        let (first, rest) = path.split_first()?;
        let node = self.get_mut(*first)?;
        if rest.is_empty() {
            Some(node)
        } else {
            node.as_group_mut()?.children_mut().resolve_mut(rest)
        }
    }

    /// Look up a node by `/`-separated names, e.g. `bloom/blur_h`
    pub fn find_path(&self, path: &str) -> Option<NodeKey> {
        let mut names = path.split('/');
        let first = self.find(names.next()?)?;
        let mut key = NodeKey::root(first);
        let mut node = self.get(first)?;
        for name in names {
            let children = node.as_group()?.children();
            let id = children.find(name)?;
            key = key.child(id);
            node = children.get(id)?;
        }
        Some(key)
    }

    /// `/`-separated names of the node at `path`
    pub fn qualified_name(&self, path: &[NodeId]) -> Option<String> {
        let (first, rest) = path.split_first()?;
        let node = self.get(*first)?;
        if rest.is_empty() {
            Some(node.name().to_string())
        } else {
            let inner = node.as_group()?.children().qualified_name(rest)?;
            Some(format!("{}/{}", node.name(), inner))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &(dyn Node + 'static))> {
        self.nodes.iter().map(|(id, node)| (*id, node.as_ref()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut Box<dyn Node>)> {
        self.nodes.iter_mut().map(|(id, node)| (*id, node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Implements the boilerplate accessors of [`Node`] for a type with a
/// `core: NodeCore` field.
macro_rules! impl_node_core {
    () => {
        fn core(&self) -> &$crate::render_graph::node::NodeCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut $crate::render_graph::node::NodeCore {
            &mut self.core
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

pub(crate) use impl_node_core;
