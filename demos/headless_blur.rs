//! Headless compositor demo
//!
//! Renders an animated gradient through bloom, a feedback trail and
//! tonemapping on the wgpu backend, then writes the last frame to a PNG.
//!
//! ```bash
//! cargo run --example headless_blur -- --frames 30 --output trail.png
//! cargo run --example headless_blur -- --graph my_graph.json
//! ```
//!
//! A `--graph` declaration must contain a `scene` node; the gradient is drawn
//! into it.

use clap::Parser;
use fx_compositor::backend::{ShaderDescriptor, TextureFormat};
use fx_compositor::pipeline::postprocess::{
    bloom_group, feedback_node, register_builtin_shaders, tonemap_node, BloomSettings,
    TonemapOperator,
};
use fx_compositor::render_graph::{OutputSpec, RenderTargetParams, SceneNode};
use fx_compositor::{GraphDeclaration, RenderGraph, ShaderLibrary, WgpuBackend};
use std::path::PathBuf;

const GRADIENT_SHADER: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let t = u_time().x;
    let center = vec2<f32>(0.5 + 0.3 * cos(t), 0.5 + 0.3 * sin(t));
    let glow = 0.02 / max(distance(input.uv, center), 0.001);
    return vec4<f32>(input.uv * 0.3 + vec2<f32>(glow), glow * 0.5, 1.0);
}
"#;

#[derive(Parser, Debug)]
#[command(about = "Render the compositor offscreen and save the result")]
struct Args {
    #[arg(long, default_value_t = 512)]
    width: u32,

    #[arg(long, default_value_t = 512)]
    height: u32,

    /// Number of frames to render before saving
    #[arg(long, default_value_t = 60)]
    frames: u32,

    #[arg(long, default_value = "compositor.png")]
    output: PathBuf,

    /// JSON graph declaration to use instead of the built-in chain
    #[arg(long)]
    graph: Option<PathBuf>,

    #[arg(long, default_value_t = 0.8)]
    threshold: f32,

    #[arg(long, default_value_t = 2.0)]
    radius: f32,

    /// Weight of the previous frame in the trail
    #[arg(long, default_value_t = 0.85)]
    decay: f32,
}

fn build_default_graph(library: &ShaderLibrary, args: &Args) -> fx_compositor::GraphResult<RenderGraph> {
    let mut graph = RenderGraph::new();
    graph.add_node(SceneNode::empty("scene").with_output(
        "color",
        OutputSpec::new(RenderTargetParams::new().with_format(TextureFormat::Rgba16Float)),
    ))?;
    graph.add_node(bloom_group(
        library,
        "bloom",
        "scene",
        BloomSettings {
            threshold: args.threshold,
            radius: args.radius,
            ..Default::default()
        },
    )?)?;
    graph.add_node(feedback_node(
        library,
        "trail",
        "bloom",
        OutputSpec::new(RenderTargetParams::new().with_format(TextureFormat::Rgba16Float)),
        args.decay,
    )?)?;
    graph.add_node(tonemap_node(
        library,
        "tonemap",
        "trail",
        TonemapOperator::Aces,
        1.0,
    )?)?;
    Ok(graph)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut renderer = WgpuBackend::new_headless(args.width, args.height)?;
    let mut library = ShaderLibrary::new();
    register_builtin_shaders(&mut library, &mut renderer)?;
    library.register(
        &mut renderer,
        "gradient",
        ShaderDescriptor::new("gradient", GRADIENT_SHADER).with_uniform("time"),
    )?;

    let mut graph = match &args.graph {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let mut graph = RenderGraph::new();
            GraphDeclaration::from_json(&json)?.build(&library, &mut graph)?;
            graph
        }
        None => build_default_graph(&library, &args)?,
    };

    let mut gradient = library
        .material("scene", "gradient")
        .ok_or("gradient shader missing")?;
    let scene = graph
        .node_as::<SceneNode>("scene")
        .ok_or("graph has no scene node")?;
    scene.set_draw(move |renderer, ctx, target| {
        gradient.set_uniform("time", ctx.frame as f32 * 0.1);
        renderer.render_fullscreen_quad(&gradient, target)
    });

    for _ in 0..args.frames {
        let stats = graph.render(&mut renderer, None)?;
        log::debug!(
            "frame {}: {} nodes, {} pool allocations",
            stats.frame,
            stats.nodes_rendered(),
            stats.pool_allocations
        );
    }
    let pool = graph.pool();
    log::info!(
        "Rendered {} frames with {} pooled textures",
        args.frames,
        pool.total_texture_count()
    );

    let pixels = renderer.read_output()?;
    image::save_buffer(
        &args.output,
        &pixels,
        args.width,
        args.height,
        image::ColorType::Rgba8,
    )?;
    log::info!("Saved {}", args.output.display());

    graph.dispose(&mut renderer);
    Ok(())
}
