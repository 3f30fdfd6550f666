//! JSON graph declarations
//!
//! ```json
//! {
//!   "nodes": [
//!     { "name": "scene", "type": "scene",
//!       "outputs": { "color": { "parameters": { "format": "RGBA16F" } } } },
//!     { "name": "blur_h", "shader": "blur",
//!       "inputs": { "texture": "scene" },
//!       "outputs": { "color": { "parameters": { "width": "viewport*0.5", "height": "viewport*0.5" } } },
//!       "parameters": { "direction": [1.0, 0.0] } },
//!     { "name": "present", "shader": "copy",
//!       "inputs": { "texture": { "node": "blur_h", "pin": "color" } } }
//!   ]
//! }
//! ```
//!
//! Output pins keep their document order, so the first listed output is the
//! default pin when an input names only the node.

use crate::backend::types::*;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::graph::RenderGraph;
use crate::render_graph::group::GroupNode;
use crate::render_graph::node::*;
use crate::render_graph::nodes::{FilterNode, SceneNode, TextureNode};
use crate::render_graph::resource::{OutputSpec, RenderTargetParams, SizeSpec};
use crate::resources::material::UniformValue;
use crate::resources::ShaderLibrary;
use glam::{Vec2, Vec3, Vec4};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;

/// Whole graph declaration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphDeclaration {
    pub nodes: Vec<NodeDeclaration>,
    /// Path of the node to render from instead of every terminal node
    #[serde(default)]
    pub output: Option<String>,
}

/// Declared node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKindDecl {
    #[default]
    Filter,
    Scene,
    Texture,
    Group,
}

/// One node of a declaration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeclaration {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKindDecl,
    #[serde(default)]
    pub shader: Option<String>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub inputs: Vec<(String, InputDecl)>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub outputs: Vec<(String, OutputDecl)>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub parameters: Vec<(String, ParamDecl)>,
    /// Own input pin -> enclosing group's input pin
    #[serde(default, deserialize_with = "ordered_map")]
    pub group_inputs: Vec<(String, String)>,
    /// Own output pin -> enclosing group's output pin
    #[serde(default, deserialize_with = "ordered_map")]
    pub group_outputs: Vec<(String, String)>,
    /// Children of a group node
    #[serde(default)]
    pub nodes: Vec<NodeDeclaration>,
}

/// Declared input: a node name, or a node with pin and flags
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InputDecl {
    Node(String),
    Pin {
        node: String,
        #[serde(default)]
        pin: Option<String>,
        #[serde(default, rename = "prevFrame")]
        prev_frame: bool,
    },
}

impl InputDecl {
    pub fn to_input_ref(&self) -> InputRef {
        match self {
            InputDecl::Node(node) => InputRef::node(node),
            InputDecl::Pin {
                node,
                pin,
                prev_frame,
            } => InputRef {
                node: NodeRef::Name(node.clone()),
                pin: pin.clone(),
                prev_frame: *prev_frame,
            },
        }
    }
}

/// Declared output pin
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputDecl {
    pub attachment: AttachmentPoint,
    pub parameters: OutputParamsDecl,
}

/// Declared render target parameters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputParamsDecl {
    pub width: Option<SizeDecl>,
    pub height: Option<SizeDecl>,
    pub format: Option<TextureFormat>,
    pub min_filter: Option<FilterMode>,
    pub mag_filter: Option<FilterMode>,
    pub wrap_s: Option<WrapMode>,
    pub wrap_t: Option<WrapMode>,
    pub use_mipmap: bool,
    pub keep_last_frame: bool,
    pub output_last_frame: bool,
}

/// Declared size: pixels, or `viewport`, `viewport*k`, `viewport/k`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SizeDecl {
    Pixels(u32),
    Expr(String),
}

impl SizeDecl {
    pub fn to_size_spec(&self) -> GraphResult<SizeSpec> {
        match self {
            SizeDecl::Pixels(pixels) => Ok(SizeSpec::Fixed(*pixels)),
            SizeDecl::Expr(expr) => parse_size_expr(expr),
        }
    }
}

fn parse_size_expr(expr: &str) -> GraphResult<SizeSpec> {
    let invalid = || GraphError::InvalidDeclaration(format!("invalid size '{}'", expr));
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();

    if let Ok(pixels) = compact.parse::<u32>() {
        return Ok(SizeSpec::Fixed(pixels));
    }
    let rest = compact.strip_prefix("viewport").ok_or_else(invalid)?;
    if rest.is_empty() {
        return Ok(SizeSpec::viewport());
    }
    let mut chars = rest.chars();
    let op = chars.next();
    let factor: f32 = chars.as_str().parse().map_err(|_| invalid())?;
    match op {
        Some('*') => Ok(SizeSpec::scaled(factor)),
        Some('/') if factor != 0.0 => Ok(SizeSpec::scaled(1.0 / factor)),
        _ => Err(invalid()),
    }
}

impl OutputDecl {
    pub fn to_output_spec(&self) -> GraphResult<OutputSpec> {
        let p = &self.parameters;
        let mut params = RenderTargetParams::default().with_mipmap(p.use_mipmap);
        if let Some(width) = &p.width {
            params.width = width.to_size_spec()?;
        }
        if let Some(height) = &p.height {
            params.height = height.to_size_spec()?;
        }
        params.format = p.format;
        params.min_filter = p.min_filter.unwrap_or(params.min_filter);
        params.mag_filter = p.mag_filter.unwrap_or(params.mag_filter);
        params.wrap_s = p.wrap_s.unwrap_or(params.wrap_s);
        params.wrap_t = p.wrap_t.unwrap_or(params.wrap_t);

        let mut spec = OutputSpec::new(params).with_attachment(self.attachment);
        if p.keep_last_frame {
            spec = spec.keep_last_frame();
        }
        if p.output_last_frame {
            spec = spec.output_last_frame();
        }
        Ok(spec)
    }
}

/// Declared uniform value: a number or a 2 to 4 component vector
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamDecl {
    Scalar(f32),
    Vector(Vec<f32>),
}

impl ParamDecl {
    pub fn to_uniform(&self) -> Option<UniformValue> {
        match self {
            ParamDecl::Scalar(v) => Some(UniformValue::Float(*v)),
            ParamDecl::Vector(v) => match v.as_slice() {
                [x, y] => Some(UniformValue::Vec2(Vec2::new(*x, *y))),
                [x, y, z] => Some(UniformValue::Vec3(Vec3::new(*x, *y, *z))),
                [x, y, z, w] => Some(UniformValue::Vec4(Vec4::new(*x, *y, *z, *w))),
                _ => None,
            },
        }
    }
}

impl GraphDeclaration {
    pub fn from_json(json: &str) -> GraphResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Instantiate every declared node into `graph`
    pub fn build(&self, shaders: &ShaderLibrary, graph: &mut RenderGraph) -> GraphResult<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(self.nodes.len());
        for decl in &self.nodes {
            ids.push(graph.add_boxed(decl.instantiate(shaders)?)?);
        }
        if let Some(output) = &self.output {
            graph.set_output_node(Some(output));
        }
        log::info!("Built {} nodes from declaration", ids.len());
        Ok(ids)
    }
}

impl NodeDeclaration {
    /// Create the node this declaration describes
    pub fn instantiate(&self, shaders: &ShaderLibrary) -> GraphResult<Box<dyn Node>> {
        let mut node: Box<dyn Node> = match self.kind {
            NodeKindDecl::Filter => Box::new(self.filter(shaders)?),
            NodeKindDecl::Scene => Box::new(SceneNode::empty(&self.name)),
            NodeKindDecl::Texture => Box::new(TextureNode::new(&self.name, None)),
            NodeKindDecl::Group => {
                let mut group = GroupNode::new(&self.name);
                for child in &self.nodes {
                    group.add_boxed_child(child.instantiate(shaders)?)?;
                }
                Box::new(group)
            }
        };

        if !self.outputs.is_empty() && matches!(self.kind, NodeKindDecl::Texture | NodeKindDecl::Group) {
            return Err(GraphError::InvalidDeclaration(format!(
                "{:?} node '{}' cannot declare outputs",
                self.kind, self.name
            )));
        }
        if !self.nodes.is_empty() && self.kind != NodeKindDecl::Group {
            return Err(GraphError::InvalidDeclaration(format!(
                "only group nodes have children, '{}' is {:?}",
                self.name, self.kind
            )));
        }

        let core = node.core_mut();
        for (pin, input) in &self.inputs {
            core.set_input(pin, input.to_input_ref());
        }
        for (pin, group_pin) in &self.group_inputs {
            core.set_input(pin, InputRef::group_input(group_pin));
        }
        for (pin, output) in &self.outputs {
            core.set_output(pin, output.to_output_spec()?);
        }
        for (pin, group_pin) in &self.group_outputs {
            core.export_output(pin, group_pin);
        }
        Ok(node)
    }

    fn filter(&self, shaders: &ShaderLibrary) -> GraphResult<FilterNode> {
        let shader = self.shader.as_deref().ok_or_else(|| {
            GraphError::InvalidDeclaration(format!("filter node '{}' needs a shader", self.name))
        })?;
        let material = shaders
            .material(&self.name, shader)
            .ok_or_else(|| GraphError::UnknownShader {
                node: self.name.clone(),
                shader: shader.to_string(),
            })?;

        let mut filter = FilterNode::new(&self.name, material);
        for (name, value) in &self.parameters {
            let value = value.to_uniform().ok_or_else(|| {
                GraphError::InvalidDeclaration(format!(
                    "parameter '{}' of '{}' must be a number or a 2-4 component vector",
                    name, self.name
                ))
            })?;
            filter.set_parameter(name, value);
        }
        Ok(filter)
    }
}

/// Deserialize a JSON object into its entries in document order
fn ordered_map<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct OrderedVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, V>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_keep_document_order() {
        let decl: NodeDeclaration = serde_json::from_str(
            r#"{
                "name": "gbuffer", "type": "scene",
                "outputs": { "normal": {}, "albedo": {}, "depth": { "attachment": "DEPTH_ATTACHMENT" } }
            }"#,
        )
        .unwrap();
        let pins: Vec<_> = decl.outputs.iter().map(|(pin, _)| pin.as_str()).collect();
        assert_eq!(pins, ["normal", "albedo", "depth"]);
        assert_eq!(decl.outputs[2].1.attachment, AttachmentPoint::Depth);
    }

    #[test]
    fn test_input_forms() {
        let decl: NodeDeclaration = serde_json::from_str(
            r#"{
                "name": "blend", "shader": "blend",
                "inputs": {
                    "a": "scene",
                    "b": { "node": "scene", "pin": "depth" },
                    "c": { "node": "blend", "prevFrame": true }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(decl.inputs[0].1.to_input_ref(), InputRef::node("scene"));
        assert_eq!(
            decl.inputs[1].1.to_input_ref(),
            InputRef::node("scene").pin("depth")
        );
        assert_eq!(
            decl.inputs[2].1.to_input_ref(),
            InputRef::node("blend").prev_frame()
        );
    }

    #[test]
    fn test_size_expressions() {
        let scale = |expr: &str| match parse_size_expr(expr).unwrap() {
            SizeSpec::Viewport { scale } => scale,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(scale("viewport"), 1.0);
        assert_eq!(scale("viewport * 0.5"), 0.5);
        assert_eq!(scale("viewport/4"), 0.25);
        assert!(matches!(parse_size_expr("512"), Ok(SizeSpec::Fixed(512))));
        assert!(parse_size_expr("screen").is_err());
        assert!(parse_size_expr("viewport/0").is_err());
    }

    #[test]
    fn test_output_parameters() {
        let output: OutputDecl = serde_json::from_str(
            r#"{ "parameters": {
                "width": 256, "height": "viewport*0.5", "format": "RGBA16F",
                "minFilter": "nearest", "wrapS": "repeat", "outputLastFrame": true
            } }"#,
        )
        .unwrap();
        let spec = output.to_output_spec().unwrap();
        let desc = spec.params.resolve(800, 600, TextureFormat::Rgba8Unorm);
        assert_eq!((desc.width, desc.height), (256, 300));
        assert_eq!(desc.format, TextureFormat::Rgba16Float);
        assert_eq!(desc.min_filter, FilterMode::Nearest);
        assert_eq!(desc.wrap_s, WrapMode::Repeat);
        assert!(spec.keep_last_frame && spec.output_last_frame);
    }

    #[test]
    fn test_output_without_format_defers_to_graph_default() {
        let output: OutputDecl =
            serde_json::from_str(r#"{ "parameters": { "width": 64, "height": 64 } }"#).unwrap();
        let spec = output.to_output_spec().unwrap();
        assert_eq!(spec.params.format, None);
        let desc = spec.params.resolve(800, 600, TextureFormat::Rgba32Float);
        assert_eq!(desc.format, TextureFormat::Rgba32Float);
    }

    #[test]
    fn test_unknown_shader_is_an_error() {
        let decl = GraphDeclaration::from_json(
            r#"{ "nodes": [ { "name": "fx", "shader": "missing" } ] }"#,
        )
        .unwrap();
        let mut graph = RenderGraph::new();
        let result = decl.build(&ShaderLibrary::new(), &mut graph);
        assert!(matches!(result, Err(GraphError::UnknownShader { .. })));
    }

    #[test]
    fn test_parameter_vectors() {
        assert_eq!(
            ParamDecl::Vector(vec![1.0, 2.0]).to_uniform(),
            Some(UniformValue::Vec2(Vec2::new(1.0, 2.0)))
        );
        assert_eq!(ParamDecl::Vector(vec![1.0]).to_uniform(), None);
    }
}
