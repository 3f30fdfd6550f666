//! Tonemapping post-processing

use crate::pipeline::postprocess::shaders;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::node::InputRef;
use crate::render_graph::nodes::FilterNode;
use crate::resources::ShaderLibrary;

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TonemapOperator {
    Reinhard,
    #[default]
    Aces,
    Uncharted2,
    None,
}

impl TonemapOperator {
    /// Value of the shader's `operator` uniform
    pub fn shader_index(self) -> i32 {
        match self {
            TonemapOperator::Reinhard => 0,
            TonemapOperator::Aces => 1,
            TonemapOperator::Uncharted2 => 2,
            TonemapOperator::None => 3,
        }
    }
}

/// Terminal tonemapping node drawing `source` to the graph target
pub fn tonemap_node(
    library: &ShaderLibrary,
    name: &str,
    source: impl Into<InputRef>,
    operator: TonemapOperator,
    exposure: f32,
) -> GraphResult<FilterNode> {
    let material = library
        .material(name, shaders::TONEMAP)
        .ok_or_else(|| GraphError::UnknownShader {
            node: name.to_string(),
            shader: shaders::TONEMAP.to_string(),
        })?;

    Ok(FilterNode::new(name, material)
        .with_input("texture", source)
        .with_parameter("exposure", exposure)
        .with_parameter("gamma", 2.2_f32)
        .with_parameter("operator", operator.shader_index()))
}

pub const TONEMAPPING_SHADER: &str = r#"
fn aces_tonemap(color: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return saturate((color * (a * color + b)) / (color * (c * color + d) + e));
}

fn reinhard_tonemap(color: vec3<f32>) -> vec3<f32> {
    return color / (color + vec3<f32>(1.0));
}

fn uncharted2_partial(x: vec3<f32>) -> vec3<f32> {
    let a = 0.15;
    let b = 0.50;
    let c = 0.10;
    let d = 0.20;
    let e = 0.02;
    let f = 0.30;
    return ((x * (a * x + c * b) + d * e) / (x * (a * x + b) + d * f)) - e / f;
}

fn uncharted2_tonemap(color: vec3<f32>) -> vec3<f32> {
    let white = uncharted2_partial(vec3<f32>(11.2));
    return saturate(uncharted2_partial(color * 2.0) / white);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var color = sample_texture(input.uv).rgb;
    color = color * u_exposure().x;

    var mapped: vec3<f32>;
    switch i32(u_operator().x) {
        case 0: { mapped = reinhard_tonemap(color); }
        case 1: { mapped = aces_tonemap(color); }
        case 2: { mapped = uncharted2_tonemap(color); }
        default: { mapped = saturate(color); }
    }

    let gamma_corrected = pow(mapped, vec3<f32>(1.0 / u_gamma().x));
    return vec4<f32>(gamma_corrected, 1.0);
}
"#;
