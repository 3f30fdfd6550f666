//! Temporal feedback

use crate::pipeline::postprocess::shaders;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::node::InputRef;
use crate::render_graph::nodes::FilterNode;
use crate::render_graph::resource::OutputSpec;
use crate::resources::ShaderLibrary;

/// Node blending `source` over its own previous frame.
///
/// `decay` is the weight of the previous frame. The node reads itself
/// through a previous-frame input, so its `color` output retains frames.
pub fn feedback_node(
    library: &ShaderLibrary,
    name: &str,
    source: impl Into<InputRef>,
    output: OutputSpec,
    decay: f32,
) -> GraphResult<FilterNode> {
    let material = library
        .material(name, shaders::FEEDBACK)
        .ok_or_else(|| GraphError::UnknownShader {
            node: name.to_string(),
            shader: shaders::FEEDBACK.to_string(),
        })?;

    Ok(FilterNode::new(name, material)
        .with_input("texture", source)
        .with_input("previous", InputRef::node(name).pin("color").prev_frame())
        .with_output("color", output.keep_last_frame())
        .with_parameter("decay", decay))
}

pub const FEEDBACK_SHADER: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let current = sample_texture(input.uv);
    let previous = sample_previous(input.uv);
    return mix(current, previous, u_decay().x);
}
"#;
