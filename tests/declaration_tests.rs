//! Building and rendering graphs from JSON declarations.

mod common;

use common::{TestContext, VIEWPORT};
use fx_compositor::backend::TextureFormat;
use fx_compositor::render_graph::FilterNode;
use fx_compositor::resources::UniformValue;
use fx_compositor::{GraphDeclaration, GraphError, RenderGraph};

const GLOW_TRAIL: &str = r#"{
    "nodes": [
        { "name": "scene", "type": "scene", "outputs": { "color": {} } },
        {
            "name": "glow", "type": "group",
            "inputs": { "source": "scene" },
            "nodes": [
                {
                    "name": "bright", "shader": "bright_pass",
                    "groupInputs": { "texture": "source" },
                    "outputs": { "color": { "parameters": {
                        "width": "viewport/2", "height": "viewport/2", "format": "RGBA16F"
                    } } },
                    "parameters": { "threshold": 0.8 }
                },
                {
                    "name": "blur", "shader": "blur",
                    "inputs": { "texture": "bright" },
                    "outputs": { "color": { "parameters": {
                        "width": "viewport/2", "height": "viewport/2", "format": "RGBA16F"
                    } } },
                    "parameters": { "direction": [1, 0], "radius": 2 },
                    "groupOutputs": { "color": "color" }
                }
            ]
        },
        {
            "name": "trail", "shader": "feedback",
            "inputs": {
                "texture": "glow",
                "previous": { "node": "trail", "prevFrame": true }
            },
            "outputs": { "color": { "parameters": { "keepLastFrame": true } } },
            "parameters": { "decay": 0.9 }
        },
        {
            "name": "tonemap", "shader": "tonemap",
            "inputs": { "texture": "trail" },
            "parameters": { "exposure": 1.0, "gamma": 2.2, "operator": 1 }
        }
    ],
    "output": "tonemap"
}"#;

#[test]
fn test_declared_graph_renders() {
    let mut ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let ids = GraphDeclaration::from_json(GLOW_TRAIL)
        .unwrap()
        .build(&ctx.library, &mut graph)
        .unwrap();
    assert_eq!(ids.len(), 4);
    assert_eq!(graph.output_node(), Some("tonemap"));

    let stats = graph.render(&mut ctx.renderer, None).unwrap();
    assert_eq!(
        stats.rendered,
        ["scene", "glow/bright", "glow/blur", "trail", "tonemap"]
    );
    assert_eq!(stats.missing_links, 0);
    assert_eq!(stats.unused_pins, 0);
    assert_eq!(stats.feedback_reads, 1);

    let draws = ctx.renderer.take_draws();
    let blur = draws.iter().find(|d| d.material == "blur").unwrap();
    let desc = ctx.renderer.texture_desc(blur.color_target().unwrap()).unwrap();
    assert_eq!((desc.width, desc.height), (VIEWPORT / 2, VIEWPORT / 2));
    assert_eq!(desc.format, TextureFormat::Rgba16Float);
    assert_eq!(draws.last().unwrap().target, None);

    graph.render(&mut ctx.renderer, None).unwrap();
    assert!(graph.pin_info("trail", "color").unwrap().previous.is_some());
}

#[test]
fn test_declared_parameters_reach_the_material() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    GraphDeclaration::from_json(GLOW_TRAIL)
        .unwrap()
        .build(&ctx.library, &mut graph)
        .unwrap();

    let blur = graph.node_as::<FilterNode>("glow/blur").unwrap();
    assert_eq!(blur.parameter("radius"), Some(UniformValue::Float(2.0)));
    assert!(matches!(blur.parameter("direction"), Some(UniformValue::Vec2(_))));

    let trail = graph.node_as::<FilterNode>("trail").unwrap();
    trail.set_parameter("decay", 0.5_f32);
    assert_eq!(trail.parameter("decay"), Some(UniformValue::Float(0.5)));
}

#[test]
fn test_duplicate_names_are_rejected() {
    let ctx = TestContext::new();
    let decl = GraphDeclaration::from_json(
        r#"{ "nodes": [
            { "name": "scene", "type": "scene" },
            { "name": "scene", "type": "scene" }
        ] }"#,
    )
    .unwrap();
    let mut graph = RenderGraph::new();
    assert!(matches!(
        decl.build(&ctx.library, &mut graph),
        Err(GraphError::DuplicateNode(_))
    ));
}

#[test]
fn test_malformed_json_is_reported() {
    assert!(matches!(
        GraphDeclaration::from_json(r#"{ "nodes": [ { "type": "scene" } ] }"#),
        Err(GraphError::Json(_))
    ));
}
