//! Link resolution
//!
//! Every frame the declared inputs of all nodes are resolved into concrete
//! producer/consumer links. Group nodes are looked through, so every link
//! connects two leaf nodes. Inputs that cannot be resolved are skipped with
//! a warning and the consumer renders with that slot unbound.

use crate::render_graph::error::GraphError;
use crate::render_graph::group::GroupNode;
use crate::render_graph::node::*;
use rustc_hash::FxHashMap;

/// A resolved edge from a producer's output pin to a consumer's input pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub consumer: NodeKey,
    pub input_pin: String,
    pub producer: NodeKey,
    pub output_pin: String,
    /// The consumer explicitly asked for the previous frame
    pub prev_frame: bool,
}

/// All links resolved for one frame
#[derive(Debug, Default)]
pub struct LinkTable {
    links: Vec<Link>,
    by_consumer: FxHashMap<NodeKey, Vec<usize>>,
    warnings: Vec<GraphError>,
}

impl LinkTable {
    /// Resolve the inputs of every node in `nodes`
    pub fn resolve(nodes: &NodeSet) -> Self {
        let mut table = Self::default();
        let root = Scope {
            set: nodes,
            prefix: None,
            name_prefix: String::new(),
            group: None,
            parent: None,
        };
        table.resolve_scope(&root);
        table
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Links feeding `consumer`, in input declaration order
    pub fn inputs_of<'a>(&'a self, consumer: &NodeKey) -> impl Iterator<Item = &'a Link> + 'a {
        self.by_consumer
            .get(consumer)
            .map(|indices| indices.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&index| &self.links[index])
    }

    /// Missing-link and unused-pin warnings collected during resolution
    pub fn warnings(&self) -> &[GraphError] {
        &self.warnings
    }

    pub fn missing_links(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, GraphError::MissingLink { .. }))
            .count()
    }

    pub fn unused_pins(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, GraphError::UnusedPin { .. }))
            .count()
    }

    fn push(&mut self, link: Link) {
        self.by_consumer
            .entry(link.consumer.clone())
            .or_default()
            .push(self.links.len());
        self.links.push(link);
    }

    fn resolve_scope(&mut self, scope: &Scope<'_>) {
        for (id, node) in scope.set.iter() {
            let key = scope.key(id);
            let name = scope.qualify(node.name());

            if let Some(group) = node.as_group() {
                for (pin, _) in group.inputs() {
                    if group.boundary().input_targets(pin).is_empty() {
                        self.warnings.push(GraphError::UnusedPin {
                            node: name.clone(),
                            pin: pin.clone(),
                        });
                    }
                }
                let inner = Scope {
                    set: group.children(),
                    prefix: Some(key),
                    name_prefix: format!("{}/", name),
                    group: Some(group),
                    parent: Some(scope),
                };
                self.resolve_scope(&inner);
                continue;
            }

            for (pin, input) in node.inputs() {
                if !node.validate_input(pin) {
                    self.warnings.push(GraphError::UnusedPin {
                        node: name.clone(),
                        pin: pin.clone(),
                    });
                    continue;
                }
                match scope.resolve_input(input) {
                    Ok((producer, output_pin, prev_frame)) => self.push(Link {
                        consumer: key.clone(),
                        input_pin: pin.clone(),
                        producer,
                        output_pin,
                        prev_frame,
                    }),
                    Err(reason) => self.warnings.push(GraphError::MissingLink {
                        node: name.clone(),
                        pin: pin.clone(),
                        reason,
                    }),
                }
            }
        }
    }
}

/// One naming scope: the root set or the children of a group
struct Scope<'a> {
    set: &'a NodeSet,
    prefix: Option<NodeKey>,
    name_prefix: String,
    group: Option<&'a GroupNode>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn key(&self, id: NodeId) -> NodeKey {
        match &self.prefix {
            Some(prefix) => prefix.child(id),
            None => NodeKey::root(id),
        }
    }

    fn qualify(&self, name: &str) -> String {
        format!("{}{}", self.name_prefix, name)
    }

    fn resolve_input(&self, input: &InputRef) -> Result<(NodeKey, String, bool), String> {
        let id = match &input.node {
            NodeRef::GroupInput(group_pin) => {
                let (group, parent) = match (self.group, self.parent) {
                    (Some(group), Some(parent)) => (group, parent),
                    _ => return Err(format!("group input '{}' used outside a group", group_pin)),
                };
                let outer = group.core().input(group_pin).ok_or_else(|| {
                    format!("group '{}' has no input '{}'", group.name(), group_pin)
                })?;
                let (producer, pin, prev_frame) = parent.resolve_input(outer)?;
                return Ok((producer, pin, prev_frame || input.prev_frame));
            }
            NodeRef::Name(name) => self
                .set
                .find(name)
                .ok_or_else(|| format!("no node named '{}'", name))?,
            NodeRef::Id(id) => {
                if self.set.get(*id).is_none() {
                    return Err(format!("no node with id {}", id.0));
                }
                *id
            }
        };

        let node = self
            .set
            .get(id)
            .ok_or_else(|| format!("no node with id {}", id.0))?;
        let (producer, pin) = resolve_output(node, self.key(id), input.pin.as_deref())?;
        Ok((producer, pin, input.prev_frame))
    }
}

/// Resolve `pin` of `node` down to a leaf output, following group exports
fn resolve_output(
    node: &dyn Node,
    key: NodeKey,
    pin: Option<&str>,
) -> Result<(NodeKey, String), String> {
    if let Some(group) = node.as_group() {
        let pin = match pin {
            Some(pin) => pin,
            None => group
                .first_output()
                .ok_or_else(|| format!("group '{}' exports no outputs", group.name()))?,
        };
        let (child_id, child_pin) = group
            .boundary()
            .output_source(pin)
            .ok_or_else(|| format!("group '{}' has no output '{}'", group.name(), pin))?;
        let child = group
            .children()
            .get(child_id)
            .ok_or_else(|| format!("group '{}' lost child {}", group.name(), child_id.0))?;
        return resolve_output(child, key.child(child_id), Some(child_pin));
    }

    match pin {
        Some(pin) => match node.core().output(pin) {
            Some(spec) if spec.enabled => Ok((key, pin.to_string())),
            Some(_) => Err(format!("output '{}' of '{}' is disabled", pin, node.name())),
            None => Err(format!("'{}' has no output '{}'", node.name(), pin)),
        },
        None => node
            .first_output()
            .map(|pin| (key, pin.to_string()))
            .ok_or_else(|| format!("'{}' has no enabled outputs", node.name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::nodes::{SceneNode, TextureNode};
    use crate::render_graph::resource::OutputSpec;

    fn scene(name: &str) -> Box<dyn Node> {
        Box::new(
            SceneNode::empty(name)
                .with_output("color", OutputSpec::default())
                .with_output("depth", OutputSpec::default()),
        )
    }

    #[test]
    fn test_missing_input_pin_defaults_to_first_output() {
        let mut nodes = NodeSet::new();
        let scene_id = nodes.insert(scene("scene")).unwrap();
        let mut consumer = SceneNode::empty("consumer");
        consumer.core_mut().set_input("a", InputRef::node("scene"));
        consumer
            .core_mut()
            .set_input("b", InputRef::node("scene").pin("depth"));
        let consumer_id = nodes.insert(Box::new(consumer)).unwrap();

        let table = LinkTable::resolve(&nodes);
        let links: Vec<_> = table.inputs_of(&NodeKey::root(consumer_id)).collect();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].producer, NodeKey::root(scene_id));
        assert_eq!(links[0].output_pin, "color");
        assert_eq!(links[1].output_pin, "depth");
        assert!(table.warnings().is_empty());
    }

    #[test]
    fn test_unresolvable_inputs_become_warnings() {
        let mut nodes = NodeSet::new();
        nodes.insert(scene("scene")).unwrap();
        let mut consumer = SceneNode::empty("consumer");
        consumer.core_mut().set_input("a", InputRef::node("ghost"));
        consumer
            .core_mut()
            .set_input("b", InputRef::node("scene").pin("normals"));
        consumer.core_mut().set_input("c", InputRef::group_input("x"));
        nodes.insert(Box::new(consumer)).unwrap();

        let table = LinkTable::resolve(&nodes);
        assert!(table.is_empty());
        assert_eq!(table.missing_links(), 3);
    }

    #[test]
    fn test_disabled_output_is_not_linkable() {
        let mut nodes = NodeSet::new();
        let mut producer = SceneNode::empty("scene").with_output("color", OutputSpec::default());
        producer.core_mut().output_mut("color").unwrap().enabled = false;
        nodes.insert(Box::new(producer)).unwrap();
        let mut consumer = SceneNode::empty("consumer");
        consumer.core_mut().set_input("a", InputRef::node("scene"));
        nodes.insert(Box::new(consumer)).unwrap();

        let table = LinkTable::resolve(&nodes);
        assert_eq!(table.missing_links(), 1);
    }

    #[test]
    fn test_texture_node_is_a_producer() {
        let mut nodes = NodeSet::new();
        let texture_id = nodes.insert(Box::new(TextureNode::new("env", None))).unwrap();
        let mut consumer = SceneNode::empty("consumer");
        consumer.core_mut().set_input("a", InputRef::id(texture_id));
        nodes.insert(Box::new(consumer)).unwrap();

        let table = LinkTable::resolve(&nodes);
        assert_eq!(table.links()[0].output_pin, TextureNode::OUTPUT);
    }
}
