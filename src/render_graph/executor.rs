//! Render graph executor
//!
//! Evaluation is pull based. Each frame starts from the sink nodes; a node
//! pulls its inputs, which renders their producers on demand, then renders
//! itself into freshly pooled targets. Every output pin carries a reference
//! count equal to the number of live links reading it. When a consumer has
//! rendered it releases its inputs, and a pin whose count reaches zero hands
//! its texture back to the pool, or keeps it as next frame's previous-frame
//! texture if the pin retains frames.
//!
//! A node re-entered while it is rendering (a cycle) or a pin read as
//! previous-frame is served the texture retained from the last frame, so
//! evaluation always terminates.

use crate::backend::traits::*;
use crate::backend::types::TextureDescriptor;
use crate::config::{CompositorConfig, FeedbackPlaceholder};
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::link::{Link, LinkTable};
use crate::render_graph::node::*;
use crate::render_graph::pass::{FrameContext, InputTextures};
use crate::render_graph::pool::{RenderTexture, TexturePool};
use crate::render_graph::resource::OutputSpec;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Counters for one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    /// Qualified names of rendered nodes, in render order
    pub rendered: Vec<String>,
    pub links_resolved: usize,
    pub missing_links: usize,
    pub unused_pins: usize,
    pub feedback_reads: usize,
    pub pool_allocations: usize,
    pub pool_reuses: usize,
}

impl FrameStats {
    pub fn nodes_rendered(&self) -> usize {
        self.rendered.len()
    }

    /// Position of `name` in render order
    pub fn render_index(&self, name: &str) -> Option<usize> {
        self.rendered.iter().position(|n| n == name)
    }
}

/// Snapshot of one output pin's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinInfo {
    /// Outstanding references this frame
    pub references: u32,
    /// References counted when the frame started
    pub initial_references: u32,
    pub current: Option<TextureHandle>,
    pub previous: Option<TextureHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PinKey {
    node: NodeKey,
    pin: String,
}

impl PinKey {
    fn new(node: &NodeKey, pin: &str) -> Self {
        Self {
            node: node.clone(),
            pin: pin.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct PinState {
    current: Option<RenderTexture>,
    previous: Option<RenderTexture>,
    /// Becomes `previous` once the frame ends
    pending_previous: Option<RenderTexture>,
    retain: bool,
    /// A live link reads this pin as previous-frame
    read_as_previous: bool,
    refs: u32,
    initial_refs: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeFlags {
    rendering: bool,
    rendered: bool,
}

/// Executes a node set frame by frame and owns every pooled texture
pub struct RenderGraphExecutor {
    config: CompositorConfig,
    pool: TexturePool,
    pins: FxHashMap<PinKey, PinState>,
    flags: FxHashMap<NodeKey, NodeFlags>,
    links: LinkTable,
    deferred: VecDeque<NodeKey>,
    framebuffer: Option<FramebufferHandle>,
    frame: u64,
    stats: FrameStats,
    reported_warnings: Vec<String>,
}

impl RenderGraphExecutor {
    pub fn new(config: CompositorConfig) -> Self {
        Self {
            config,
            pool: TexturePool::new(),
            pins: FxHashMap::default(),
            flags: FxHashMap::default(),
            links: LinkTable::default(),
            deferred: VecDeque::new(),
            framebuffer: None,
            frame: 0,
            stats: FrameStats::default(),
            reported_warnings: Vec::new(),
        }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn pool(&self) -> &TexturePool {
        &self.pool
    }

    /// Links resolved by the last frame
    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Stats of the last frame, including one that failed
    pub fn last_stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn pin_info(&self, node: &NodeKey, pin: &str) -> Option<PinInfo> {
        self.pins.get(&PinKey::new(node, pin)).map(|state| PinInfo {
            references: state.refs,
            initial_references: state.initial_refs,
            current: state.current.as_ref().map(RenderTexture::handle),
            previous: state.previous.as_ref().map(RenderTexture::handle),
        })
    }

    /// Render one frame. `output` overrides the automatic sink selection;
    /// `target` receives the sinks' drawing, `None` meaning the default
    /// output surface.
    pub fn execute(
        &mut self,
        nodes: &mut NodeSet,
        renderer: &mut dyn Renderer,
        output: Option<&NodeKey>,
        target: Option<FramebufferHandle>,
    ) -> GraphResult<FrameStats> {
        let ctx = FrameContext {
            frame: self.frame,
            viewport_width: renderer.viewport_width(),
            viewport_height: renderer.viewport_height(),
        };
        self.frame += 1;
        self.stats = FrameStats {
            frame: ctx.frame,
            ..Default::default()
        };
        let pool_before = self.pool.stats();

        for (_, node) in nodes.iter_mut() {
            node.prepare(&ctx);
        }
        self.prune_pins(nodes);
        self.flags.clear();
        self.deferred.clear();

        self.links = LinkTable::resolve(nodes);
        self.stats.links_resolved = self.links.len();
        self.stats.missing_links = self.links.missing_links();
        self.stats.unused_pins = self.links.unused_pins();
        self.report_warnings();

        let sinks = self.find_sinks(nodes, output);
        if sinks.is_empty() {
            log::warn!("Render graph has no output node, nothing to render");
        }
        self.count_references(nodes, &sinks);

        let result = self.evaluate(nodes, renderer, &ctx, &sinks, target);
        self.end_frame(renderer);

        let pool_after = self.pool.stats();
        self.stats.pool_allocations = pool_after.allocations - pool_before.allocations;
        self.stats.pool_reuses = pool_after.reuses - pool_before.reuses;

        result.map(|()| self.stats.clone())
    }

    /// Return every texture held for the nodes under `key` to the pool
    pub fn release_node(&mut self, key: &NodeKey) {
        let stale: Vec<PinKey> = self
            .pins
            .keys()
            .filter(|pin| pin.node.starts_with(key))
            .cloned()
            .collect();
        for pin in stale {
            self.drop_pin(&pin);
        }
        self.flags.retain(|node, _| !node.starts_with(key));
    }

    /// Release every texture and the shared framebuffer
    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        let pins: Vec<PinKey> = self.pins.keys().cloned().collect();
        for pin in pins {
            self.drop_pin(&pin);
        }
        self.flags.clear();
        self.pool.clear(renderer);
        if let Some(framebuffer) = self.framebuffer.take() {
            renderer.destroy_framebuffer(framebuffer);
        }
        log::debug!("Render graph executor disposed");
    }

    fn evaluate(
        &mut self,
        nodes: &mut NodeSet,
        renderer: &mut dyn Renderer,
        ctx: &FrameContext,
        sinks: &[NodeKey],
        target: Option<FramebufferHandle>,
    ) -> GraphResult<()> {
        for sink in sinks {
            if !self.is_rendered(sink) {
                self.render_node(nodes, renderer, ctx, sink, Some(target))?;
            }
        }

        // Nodes only read as previous-frame still render so that the frame
        // they retain stays current.
        while let Some(key) = self.deferred.pop_front() {
            if !self.is_rendered(&key) {
                self.render_node(nodes, renderer, ctx, &key, None)?;
            }
        }
        Ok(())
    }

    /// Render one node. `sink` carries the graph target when the node is a
    /// sink.
    fn render_node(
        &mut self,
        nodes: &mut NodeSet,
        renderer: &mut dyn Renderer,
        ctx: &FrameContext,
        key: &NodeKey,
        sink: Option<Option<FramebufferHandle>>,
    ) -> GraphResult<()> {
        self.flags.entry(key.clone()).or_default().rendering = true;

        let links: Vec<Link> = self.links.inputs_of(key).cloned().collect();
        let mut inputs = InputTextures::new();
        for link in &links {
            let texture = self.pull(
                nodes,
                renderer,
                ctx,
                &link.producer,
                &link.output_pin,
                link.prev_frame,
            )?;
            if let Some(texture) = texture {
                inputs.insert(&link.input_pin, texture);
            }
        }

        let name = nodes
            .qualified_name(key.path())
            .unwrap_or_else(|| key.to_string());
        let node = nodes
            .resolve_mut(key.path())
            .ok_or_else(|| GraphError::NodeNotFound(name.clone()))?;

        let outputs: Vec<(String, OutputSpec)> = node
            .outputs()
            .iter()
            .filter(|(_, spec)| spec.enabled)
            .cloned()
            .collect();

        // A sink draws straight into the graph target
        let direct_target = match sink {
            Some(target) => Some(target),
            None if outputs.is_empty() => Some(None),
            None => None,
        };

        let draw_target = match direct_target {
            Some(target) => {
                match target {
                    Some(framebuffer) => renderer.bind_framebuffer(framebuffer),
                    None => renderer.unbind_framebuffer(),
                }
                target
            }
            None => match self.bind_outputs(renderer, ctx, key, &outputs) {
                Ok(framebuffer) => Some(framebuffer),
                Err(source) => {
                    self.discard_outputs(key, &outputs);
                    return Err(GraphError::RenderFailure { node: name, source });
                }
            },
        };

        let mut result = node.render(renderer, ctx, &inputs, draw_target);
        renderer.unbind_framebuffer();
        if result.is_ok() && direct_target.is_none() {
            result = self.regenerate_mipmaps(renderer, key, &outputs);
        }
        if let Err(source) = result {
            self.discard_outputs(key, &outputs);
            return Err(GraphError::RenderFailure { node: name, source });
        }

        for link in &links {
            self.release(&link.producer, &link.output_pin);
        }
        for (pin, _) in &outputs {
            let pin = PinKey::new(key, pin);
            if self.pins.get(&pin).map_or(false, |state| state.refs == 0) {
                self.retire(&pin);
            }
        }

        let flags = self.flags.entry(key.clone()).or_default();
        flags.rendering = false;
        flags.rendered = true;
        log::trace!("Rendered node '{}'", name);
        self.stats.rendered.push(name);
        Ok(())
    }

    /// Attach freshly pooled targets for `outputs` to the shared framebuffer
    fn bind_outputs(
        &mut self,
        renderer: &mut dyn Renderer,
        ctx: &FrameContext,
        key: &NodeKey,
        outputs: &[(String, OutputSpec)],
    ) -> BackendResult<FramebufferHandle> {
        let framebuffer = self.framebuffer(renderer)?;
        renderer.detach_all(framebuffer);
        for (pin, spec) in outputs {
            let desc = spec.params.resolve(
                ctx.viewport_width,
                ctx.viewport_height,
                self.config.default_format,
            );
            let texture = self.pool.get(renderer, &desc)?;
            let handle = texture.handle();
            let state = self.pins.entry(PinKey::new(key, pin)).or_default();
            state.retain = spec.retains_last_frame() || state.read_as_previous;
            if let Some(stale) = state.current.replace(texture) {
                self.pool.put(stale);
            }
            renderer.attach_texture(framebuffer, handle, spec.attachment)?;
        }
        renderer.bind_framebuffer(framebuffer);
        Ok(framebuffer)
    }

    fn regenerate_mipmaps(
        &self,
        renderer: &mut dyn Renderer,
        key: &NodeKey,
        outputs: &[(String, OutputSpec)],
    ) -> BackendResult<()> {
        for (pin, _) in outputs {
            let mipmapped = self
                .pins
                .get(&PinKey::new(key, pin))
                .and_then(|state| state.current.as_ref())
                .filter(|texture| texture.key().use_mipmap)
                .map(RenderTexture::handle);
            if let Some(texture) = mipmapped {
                renderer.generate_mipmaps(texture)?;
            }
        }
        Ok(())
    }

    /// Hand the targets of a node that failed to render back to the pool so
    /// they never become a previous-frame texture
    fn discard_outputs(&mut self, key: &NodeKey, outputs: &[(String, OutputSpec)]) {
        for (pin, _) in outputs {
            let texture = self
                .pins
                .get_mut(&PinKey::new(key, pin))
                .and_then(|state| state.current.take());
            if let Some(texture) = texture {
                self.pool.put(texture);
            }
        }
    }

    /// Texture for `pin` of `producer`, rendering the producer if needed
    fn pull(
        &mut self,
        nodes: &mut NodeSet,
        renderer: &mut dyn Renderer,
        ctx: &FrameContext,
        producer: &NodeKey,
        pin: &str,
        prev_frame: bool,
    ) -> GraphResult<Option<TextureHandle>> {
        let Some(node) = nodes.resolve(producer.path()) else {
            return Ok(None);
        };
        if node.kind() == NodeKind::Texture {
            return Ok(node.external_output(pin));
        }
        let Some(spec) = node.core().output(pin).cloned() else {
            return Ok(None);
        };

        let flags = self.flags.get(producer).copied().unwrap_or_default();
        if prev_frame || spec.output_last_frame || flags.rendering {
            if !flags.rendered && !flags.rendering && !self.deferred.contains(producer) {
                self.deferred.push_back(producer.clone());
            }
            self.stats.feedback_reads += 1;
            self.pins
                .entry(PinKey::new(producer, pin))
                .or_default()
                .read_as_previous = true;
            return match self.previous_texture(renderer, ctx, producer, pin, &spec) {
                Ok(texture) => Ok(Some(texture)),
                Err(source) => Err(GraphError::RenderFailure {
                    node: nodes
                        .qualified_name(producer.path())
                        .unwrap_or_else(|| producer.to_string()),
                    source,
                }),
            };
        }

        if !flags.rendered {
            self.render_node(nodes, renderer, ctx, producer, None)?;
        }
        Ok(self
            .pins
            .get(&PinKey::new(producer, pin))
            .and_then(|state| state.current.as_ref())
            .map(RenderTexture::handle))
    }

    /// Last frame's texture for a pin, or a placeholder if there is none yet
    fn previous_texture(
        &mut self,
        renderer: &mut dyn Renderer,
        ctx: &FrameContext,
        producer: &NodeKey,
        pin: &str,
        spec: &OutputSpec,
    ) -> BackendResult<TextureHandle> {
        let key = PinKey::new(producer, pin);
        if let Some(previous) = self
            .pins
            .get(&key)
            .and_then(|state| state.previous.as_ref())
        {
            return Ok(previous.handle());
        }

        let desc = match self.config.feedback_placeholder {
            FeedbackPlaceholder::MatchOutput => spec.params.resolve(
                ctx.viewport_width,
                ctx.viewport_height,
                self.config.default_format,
            ),
            FeedbackPlaceholder::Fixed {
                width,
                height,
                format,
            } => TextureDescriptor::new(width, height, format),
        };
        let texture = self.pool.get(renderer, &desc)?;
        let handle = texture.handle();
        self.pins.entry(key).or_default().previous = Some(texture);
        if self.config.clear_placeholder {
            renderer.clear_texture(handle, [0.0; 4])?;
        }
        log::debug!(
            "Allocated previous-frame placeholder {:?} for {}:{}",
            handle,
            producer,
            pin
        );
        Ok(handle)
    }

    fn release(&mut self, producer: &NodeKey, pin: &str) {
        let key = PinKey::new(producer, pin);
        let Some(state) = self.pins.get_mut(&key) else {
            return;
        };
        if state.refs == 0 {
            log::warn!("Reference count of {}:{} released below zero", producer, pin);
            return;
        }
        state.refs -= 1;
        if state.refs == 0 {
            self.retire(&key);
        }
    }

    /// Apply the release policy to a pin's current texture
    fn retire(&mut self, key: &PinKey) {
        let Some(state) = self.pins.get_mut(key) else {
            return;
        };
        let Some(texture) = state.current.take() else {
            return;
        };
        if state.retain {
            if let Some(stale) = state.pending_previous.replace(texture) {
                self.pool.put(stale);
            }
        } else {
            self.pool.put(texture);
        }
    }

    fn drop_pin(&mut self, key: &PinKey) {
        if let Some(state) = self.pins.remove(key) {
            for texture in [state.current, state.previous, state.pending_previous]
                .into_iter()
                .flatten()
            {
                self.pool.put(texture);
            }
        }
    }

    /// Forget pins whose node or output no longer exists or was disabled
    fn prune_pins(&mut self, nodes: &NodeSet) {
        let stale: Vec<PinKey> = self
            .pins
            .keys()
            .filter(|key| {
                nodes
                    .resolve(key.node.path())
                    .and_then(|node| node.core().output(&key.pin))
                    .map_or(true, |spec| !spec.enabled)
            })
            .cloned()
            .collect();
        for key in stale {
            log::debug!("Releasing textures of stale pin {}:{}", key.node, key.pin);
            self.drop_pin(&key);
        }
    }

    fn find_sinks(&self, nodes: &NodeSet, output: Option<&NodeKey>) -> Vec<NodeKey> {
        if let Some(output) = output {
            match nodes.resolve(output.path()) {
                Some(node) if node.kind() != NodeKind::Group => return vec![output.clone()],
                Some(_) => log::warn!("Output node {} is a group, ignoring", output),
                None => log::warn!("Output node {} does not exist, ignoring", output),
            }
        }
        nodes
            .iter()
            .filter(|(_, node)| node.kind() != NodeKind::Texture && node.is_terminal())
            .map(|(id, _)| NodeKey::root(id))
            .collect()
    }

    /// Count live links per output pin. A link is live when its consumer is
    /// reachable from a sink.
    fn count_references(&mut self, nodes: &NodeSet, sinks: &[NodeKey]) {
        for state in self.pins.values_mut() {
            state.refs = 0;
            state.initial_refs = 0;
            state.read_as_previous = false;
        }

        let mut live: FxHashSet<NodeKey> = FxHashSet::default();
        let mut stack: Vec<NodeKey> = sinks.to_vec();
        while let Some(key) = stack.pop() {
            if !live.insert(key.clone()) {
                continue;
            }
            for link in self.links.inputs_of(&key) {
                if !live.contains(&link.producer) {
                    stack.push(link.producer.clone());
                }
            }
        }

        for link in self.links.links() {
            if !live.contains(&link.consumer) {
                continue;
            }
            let external = nodes
                .resolve(link.producer.path())
                .map_or(true, |node| node.kind() == NodeKind::Texture);
            if external {
                continue;
            }
            let state = self
                .pins
                .entry(PinKey::new(&link.producer, &link.output_pin))
                .or_default();
            state.refs += 1;
            state.initial_refs += 1;
            state.read_as_previous |= link.prev_frame;
        }
    }

    /// Release whatever is still held and promote retained frames
    fn end_frame(&mut self, renderer: &mut dyn Renderer) {
        let held: Vec<PinKey> = self
            .pins
            .iter()
            .filter(|(_, state)| state.current.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        for key in held {
            if let Some(state) = self.pins.get_mut(&key) {
                if state.refs > 0 {
                    log::debug!(
                        "Pin {}:{} still had {} references at frame end",
                        key.node,
                        key.pin,
                        state.refs
                    );
                }
                state.refs = 0;
            }
            self.retire(&key);
        }

        for state in self.pins.values_mut() {
            let stale = match state.pending_previous.take() {
                Some(next) => state.previous.replace(next),
                // Nothing reads this pin as last frame any more
                None if !state.retain => state.previous.take(),
                None => None,
            };
            if let Some(stale) = stale {
                self.pool.put(stale);
            }
        }

        renderer.unbind_framebuffer();
        self.pool.end_frame();
        if let Some(max_idle) = self.config.pool_max_idle_frames {
            self.pool.trim(renderer, max_idle);
        }
    }

    fn report_warnings(&mut self) {
        let messages: Vec<String> = self
            .links
            .warnings()
            .iter()
            .map(ToString::to_string)
            .collect();
        if messages != self.reported_warnings {
            for message in &messages {
                log::warn!("{}", message);
            }
            self.reported_warnings = messages;
        }
    }

    fn is_rendered(&self, key: &NodeKey) -> bool {
        self.flags.get(key).map_or(false, |flags| flags.rendered)
    }

    fn framebuffer(&mut self, renderer: &mut dyn Renderer) -> BackendResult<FramebufferHandle> {
        match self.framebuffer {
            Some(framebuffer) => Ok(framebuffer),
            None => {
                let framebuffer = renderer.create_framebuffer()?;
                self.framebuffer = Some(framebuffer);
                Ok(framebuffer)
            }
        }
    }
}

impl Default for RenderGraphExecutor {
    fn default() -> Self {
        Self::new(CompositorConfig::default())
    }
}
