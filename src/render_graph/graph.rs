//! Render graph definition

use crate::backend::traits::*;
use crate::config::CompositorConfig;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::executor::*;
use crate::render_graph::link::LinkTable;
use crate::render_graph::node::*;
use crate::render_graph::pool::TexturePool;

/// The main render graph structure.
///
/// Owns the root node set and the executor that renders it. Nodes can be
/// added, rewired and removed between frames; links are re-resolved at the
/// start of every frame.
pub struct RenderGraph {
    nodes: NodeSet,
    executor: RenderGraphExecutor,
    output: Option<String>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::with_config(CompositorConfig::default())
    }

    pub fn with_config(config: CompositorConfig) -> Self {
        Self {
            nodes: NodeSet::new(),
            executor: RenderGraphExecutor::new(config),
            output: None,
        }
    }

    /// Add a node to the root scope
    pub fn add_node<N: Node>(&mut self, node: N) -> GraphResult<NodeId> {
        self.add_boxed(Box::new(node))
    }

    pub fn add_boxed(&mut self, node: Box<dyn Node>) -> GraphResult<NodeId> {
        let name = node.name().to_string();
        let id = self.nodes.insert(node)?;
        log::debug!("Added node '{}' as {:?}", name, id);
        Ok(id)
    }

    /// Remove a root node. Textures held for it and its children go back to
    /// the pool; consumers that referenced it see a missing link.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Box<dyn Node>> {
        let node = self.nodes.remove(id)?;
        self.executor.release_node(&NodeKey::root(id));
        log::debug!("Removed node '{}'", node.name());
        Some(node)
    }

    pub fn remove_node_by_name(&mut self, name: &str) -> Option<Box<dyn Node>> {
        let id = self.nodes.find(name)?;
        self.remove_node(id)
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.find(name)
    }

    /// Find a node by `/`-separated path, e.g. `bloom/blur_h`
    pub fn node(&self, path: &str) -> Option<&dyn Node> {
        let key = self.nodes.find_path(path)?;
        self.nodes.resolve(key.path()).map(|node| node as &dyn Node)
    }

    pub fn node_mut(&mut self, path: &str) -> Option<&mut (dyn Node + 'static)> {
        let key = self.nodes.find_path(path)?;
        self.nodes.resolve_mut(key.path())
    }

    /// Find a node by path and downcast it to its concrete type
    pub fn node_as<T: Node>(&mut self, path: &str) -> Option<&mut T> {
        self.node_mut(path)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rebind input `pin` of the node at `path`
    pub fn set_input(&mut self, path: &str, pin: &str, input: impl Into<InputRef>) -> GraphResult<()> {
        let node = self
            .node_mut(path)
            .ok_or_else(|| GraphError::NodeNotFound(path.to_string()))?;
        node.core_mut().set_input(pin, input.into());
        Ok(())
    }

    pub fn remove_input(&mut self, path: &str, pin: &str) -> GraphResult<Option<InputRef>> {
        let node = self
            .node_mut(path)
            .ok_or_else(|| GraphError::NodeNotFound(path.to_string()))?;
        Ok(node.core_mut().remove_input(pin))
    }

    /// Enable or disable an output pin. Disabled pins are not allocated and
    /// links to them resolve as missing.
    pub fn set_output_enabled(&mut self, path: &str, pin: &str, enabled: bool) -> GraphResult<()> {
        let node = self
            .node_mut(path)
            .ok_or_else(|| GraphError::NodeNotFound(path.to_string()))?;
        let name = node.name().to_string();
        let spec = node
            .core_mut()
            .output_mut(pin)
            .ok_or(GraphError::OutputNotFound {
                node: name,
                pin: pin.to_string(),
            })?;
        spec.enabled = enabled;
        Ok(())
    }

    /// Render only from the node at `path` instead of every terminal node.
    /// `None` restores automatic selection.
    pub fn set_output_node(&mut self, path: Option<&str>) {
        self.output = path.map(str::to_string);
    }

    pub fn output_node(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Render one frame into `target`, or into the default output surface
    /// when `target` is `None`.
    pub fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        target: Option<FramebufferHandle>,
    ) -> GraphResult<FrameStats> {
        let output = match &self.output {
            Some(path) => {
                let key = self.nodes.find_path(path);
                if key.is_none() {
                    log::warn!("Output node '{}' not found", path);
                }
                key
            }
            None => None,
        };
        self.executor
            .execute(&mut self.nodes, renderer, output.as_ref(), target)
    }

    /// Reference counts and textures of output `pin` on the node at `path`
    pub fn pin_info(&self, path: &str, pin: &str) -> Option<PinInfo> {
        let key = self.nodes.find_path(path)?;
        self.executor.pin_info(&key, pin)
    }

    /// Links resolved by the last frame
    pub fn links(&self) -> &LinkTable {
        self.executor.links()
    }

    pub fn last_stats(&self) -> &FrameStats {
        self.executor.last_stats()
    }

    pub fn pool(&self) -> &TexturePool {
        self.executor.pool()
    }

    pub fn config(&self) -> &CompositorConfig {
        self.executor.config()
    }

    /// Release every GPU resource held by the graph and its nodes
    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        for (_, node) in self.nodes.iter_mut() {
            node.dispose(renderer);
        }
        self.executor.dispose(renderer);
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}
