//! Bloom post-processing effect

use crate::backend::types::TextureFormat;
use crate::pipeline::postprocess::shaders;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::group::GroupNode;
use crate::render_graph::node::InputRef;
use crate::render_graph::nodes::FilterNode;
use crate::render_graph::resource::{OutputSpec, RenderTargetParams};
use crate::resources::ShaderLibrary;
use glam::Vec2;

/// Bloom tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomSettings {
    /// Luminance above which pixels contribute
    pub threshold: f32,
    pub intensity: f32,
    /// Blur radius in texels of the downsampled target
    pub radius: f32,
    /// Size of the blur targets relative to the viewport
    pub scale: f32,
    pub format: TextureFormat,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            intensity: 0.5,
            radius: 1.0,
            scale: 0.5,
            format: TextureFormat::Rgba16Float,
        }
    }
}

/// Build a bloom group reading group input `texture` and exporting `color`.
///
/// Children: `bright` extracts highlights, `blur_h` and `blur_v` blur them at
/// reduced size and `composite` adds the result back over the source.
pub fn bloom_group(
    library: &ShaderLibrary,
    name: &str,
    source: impl Into<InputRef>,
    settings: BloomSettings,
) -> GraphResult<GroupNode> {
    let material = |node: &str, shader: &str| {
        library
            .material(node, shader)
            .ok_or_else(|| GraphError::UnknownShader {
                node: format!("{}/{}", name, node),
                shader: shader.to_string(),
            })
    };
    let reduced = || {
        OutputSpec::new(RenderTargetParams::scaled(settings.scale).with_format(settings.format))
    };

    let bright = FilterNode::new("bright", material("bright", shaders::BRIGHT_PASS)?)
        .with_input("texture", InputRef::group_input("texture"))
        .with_output("color", reduced())
        .with_parameter("threshold", settings.threshold);

    let blur_h = FilterNode::new("blur_h", material("blur_h", shaders::BLUR)?)
        .with_input("texture", "bright")
        .with_output("color", reduced())
        .with_parameter("direction", Vec2::X)
        .with_parameter("radius", settings.radius);

    let blur_v = FilterNode::new("blur_v", material("blur_v", shaders::BLUR)?)
        .with_input("texture", "blur_h")
        .with_output("color", reduced())
        .with_parameter("direction", Vec2::Y)
        .with_parameter("radius", settings.radius);

    let composite = FilterNode::new("composite", material("composite", shaders::BLOOM_COMPOSITE)?)
        .with_input("texture", InputRef::group_input("texture"))
        .with_input("bloom", "blur_v")
        .with_output(
            "color",
            OutputSpec::new(RenderTargetParams::default().with_format(settings.format)),
        )
        .with_group_output("color", "color")
        .with_parameter("intensity", settings.intensity);

    GroupNode::new(name)
        .with_input("texture", source)
        .with_child(bright)?
        .with_child(blur_h)?
        .with_child(blur_v)?
        .with_child(composite)
}

pub const BRIGHT_PASS_SHADER: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = sample_texture(input.uv);
    let luminance = dot(color.rgb, vec3<f32>(0.2126, 0.7152, 0.0722));
    let weight = max(luminance - u_threshold().x, 0.0) / max(luminance, 0.0001);
    return vec4<f32>(color.rgb * weight, 1.0);
}
"#;

pub const BLUR_SHADER: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var weights = array<f32, 5>(0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);
    let step = u_direction().xy * params.resolution.zw * u_radius().x;

    var result = sample_texture(input.uv).rgb * weights[0];
    for (var i = 1; i < 5; i++) {
        let offset = step * f32(i);
        result += sample_texture(input.uv + offset).rgb * weights[i];
        result += sample_texture(input.uv - offset).rgb * weights[i];
    }
    return vec4<f32>(result, 1.0);
}
"#;

pub const BLOOM_COMPOSITE_SHADER: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let base = sample_texture(input.uv);
    let bloom = sample_bloom(input.uv).rgb * u_intensity().x;
    return vec4<f32>(base.rgb + bloom, base.a);
}
"#;
