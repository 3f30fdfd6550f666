//! Post-processing effects
//!
//! Fragment sources follow the backend convention: a texture slot `foo` is
//! read with `sample_foo(uv)` and a uniform `bar` with `u_bar()`, which
//! returns its vec4 slot. `params.resolution` holds the target size in `xy`
//! and the texel size in `zw`.

mod bloom;
mod feedback;
mod tonemapping;

pub use bloom::{bloom_group, BloomSettings, BLOOM_COMPOSITE_SHADER, BLUR_SHADER, BRIGHT_PASS_SHADER};
pub use feedback::{feedback_node, FEEDBACK_SHADER};
pub use tonemapping::{tonemap_node, TonemapOperator, TONEMAPPING_SHADER};

use crate::backend::traits::{BackendResult, Renderer};
use crate::backend::types::ShaderDescriptor;
use crate::resources::ShaderLibrary;

/// Shader library names of the built-in effects
pub mod shaders {
    pub const COPY: &str = "copy";
    pub const BRIGHT_PASS: &str = "bright_pass";
    pub const BLUR: &str = "blur";
    pub const BLOOM_COMPOSITE: &str = "bloom_composite";
    pub const TONEMAP: &str = "tonemap";
    pub const FEEDBACK: &str = "feedback";
}

/// Common fullscreen quad shader
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}
"#;

pub const COPY_SHADER: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return sample_texture(input.uv);
}
"#;

/// Descriptors of every built-in effect shader, keyed by library name
pub fn builtin_shaders() -> Vec<(&'static str, ShaderDescriptor)> {
    vec![
        (
            shaders::COPY,
            ShaderDescriptor::new(shaders::COPY, COPY_SHADER).with_texture("texture"),
        ),
        (
            shaders::BRIGHT_PASS,
            ShaderDescriptor::new(shaders::BRIGHT_PASS, BRIGHT_PASS_SHADER)
                .with_texture("texture")
                .with_uniform("threshold"),
        ),
        (
            shaders::BLUR,
            ShaderDescriptor::new(shaders::BLUR, BLUR_SHADER)
                .with_texture("texture")
                .with_uniform("direction")
                .with_uniform("radius"),
        ),
        (
            shaders::BLOOM_COMPOSITE,
            ShaderDescriptor::new(shaders::BLOOM_COMPOSITE, BLOOM_COMPOSITE_SHADER)
                .with_texture("texture")
                .with_texture("bloom")
                .with_uniform("intensity"),
        ),
        (
            shaders::TONEMAP,
            ShaderDescriptor::new(shaders::TONEMAP, TONEMAPPING_SHADER)
                .with_texture("texture")
                .with_uniform("exposure")
                .with_uniform("gamma")
                .with_uniform("operator"),
        ),
        (
            shaders::FEEDBACK,
            ShaderDescriptor::new(shaders::FEEDBACK, FEEDBACK_SHADER)
                .with_texture("texture")
                .with_texture("previous")
                .with_uniform("decay"),
        ),
    ]
}

/// Compile every built-in effect shader into `library`
pub fn register_builtin_shaders(
    library: &mut ShaderLibrary,
    renderer: &mut dyn Renderer,
) -> BackendResult<()> {
    for (name, desc) in builtin_shaders() {
        library.register(renderer, name, desc)?;
    }
    Ok(())
}
