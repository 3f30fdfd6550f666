//! Previous-frame reads: cycles, explicit prevFrame inputs and
//! outputLastFrame pins.

mod common;

use common::{scene, TestContext};
use fx_compositor::backend::{BackendError, TextureFormat};
use fx_compositor::pipeline::postprocess::feedback_node;
use fx_compositor::render_graph::{InputRef, OutputSpec};
use fx_compositor::{CompositorConfig, FeedbackPlaceholder, GraphError, RenderGraph};

fn feedback_graph(ctx: &TestContext) -> RenderGraph {
    let mut graph = RenderGraph::new();
    graph.add_node(scene("scene")).unwrap();
    graph
        .add_node(feedback_node(&ctx.library, "trail", "scene", OutputSpec::default(), 0.9).unwrap())
        .unwrap();
    graph.add_node(ctx.sink("out", "trail")).unwrap();
    graph
}

#[test]
fn test_self_feedback_reads_last_frame() {
    let mut ctx = TestContext::new();
    let mut graph = feedback_graph(&ctx);

    let first = graph.render(&mut ctx.renderer, None).unwrap();
    assert_eq!(first.rendered, ["scene", "trail", "out"]);
    assert_eq!(first.feedback_reads, 1);
    let draws = ctx.renderer.take_draws();
    let placeholder = draws[0].texture("previous").unwrap();
    assert!(ctx.renderer.cleared().contains(&placeholder));
    let first_output = draws[0].color_target();
    assert_ne!(Some(placeholder), first_output);

    for _ in 0..3 {
        graph.render(&mut ctx.renderer, None).unwrap();
    }
    let draws = ctx.renderer.take_draws();
    let trails: Vec<_> = draws.iter().filter(|d| d.material == "trail").collect();
    assert_eq!(trails[0].texture("previous"), first_output);
    for pair in trails.windows(2) {
        assert_eq!(pair[1].texture("previous"), pair[0].color_target());
    }
}

#[test]
fn test_retained_frame_stays_out_of_the_pool() {
    let mut ctx = TestContext::new();
    let mut graph = feedback_graph(&ctx);

    graph.render(&mut ctx.renderer, None).unwrap();
    let pin = graph.pin_info("trail", "color").unwrap();
    assert_eq!(pin.initial_references, 2);
    assert_eq!(pin.references, 0);
    assert_eq!(pin.current, None);
    assert!(pin.previous.is_some());
    assert_eq!(graph.pool().outstanding_count(), 1);

    for _ in 0..4 {
        let stats = graph.render(&mut ctx.renderer, None).unwrap();
        assert_eq!(stats.pool_allocations, 0);
    }
    assert_eq!(graph.pool().total_texture_count(), 3);
    assert_eq!(graph.pool().outstanding_count(), 1);
}

#[test]
fn test_cycle_terminates_with_previous_frame() {
    let mut ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    graph.add_node(ctx.copy("a", "b")).unwrap();
    graph.add_node(ctx.copy("b", "a")).unwrap();
    graph.add_node(ctx.sink("out", "b")).unwrap();

    let first = graph.render(&mut ctx.renderer, None).unwrap();
    assert_eq!(first.rendered, ["a", "b", "out"]);
    assert_eq!(first.feedback_reads, 1);
    let first_b = ctx
        .renderer
        .take_draws()
        .into_iter()
        .find(|d| d.material == "b")
        .and_then(|d| d.color_target());

    graph.render(&mut ctx.renderer, None).unwrap();
    let draws = ctx.renderer.take_draws();
    assert_eq!(draws[0].material, "a");
    assert_eq!(draws[0].texture("texture"), first_b);
}

#[test]
fn test_prev_frame_input_defers_its_producer() {
    let mut ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    graph.add_node(scene("scene")).unwrap();
    graph.add_node(ctx.copy("fx", "scene")).unwrap();
    graph
        .add_node(ctx.sink("out", InputRef::node("fx").prev_frame()))
        .unwrap();

    let first = graph.render(&mut ctx.renderer, None).unwrap();
    assert_eq!(first.rendered, ["out", "scene", "fx"]);
    let fx_output = graph.pin_info("fx", "color").unwrap().previous;
    assert!(fx_output.is_some());

    graph.render(&mut ctx.renderer, None).unwrap();
    let draws = ctx.renderer.take_draws();
    let out = draws.iter().filter(|d| d.material == "out").last().unwrap();
    assert_eq!(out.texture("texture"), fx_output);
}

#[test]
fn test_previous_frame_released_once_no_longer_read() {
    let mut ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    graph.add_node(scene("scene")).unwrap();
    graph.add_node(ctx.copy("fx", "scene")).unwrap();
    graph
        .add_node(ctx.sink("out", InputRef::node("fx").prev_frame()))
        .unwrap();

    for _ in 0..2 {
        graph.render(&mut ctx.renderer, None).unwrap();
    }
    assert!(graph.pin_info("fx", "color").unwrap().previous.is_some());
    assert_eq!(graph.pool().outstanding_count(), 1);

    graph.set_input("out", "texture", "fx").unwrap();
    for _ in 0..3 {
        let stats = graph.render(&mut ctx.renderer, None).unwrap();
        assert_eq!(stats.rendered, ["scene", "fx", "out"]);
        assert_eq!(stats.feedback_reads, 0);
    }
    assert_eq!(graph.pin_info("fx", "color").unwrap().previous, None);
    assert_eq!(graph.pool().outstanding_count(), 0);
}

#[test]
fn test_output_last_frame_serves_every_consumer_last_frame() {
    let mut ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    graph
        .add_node(fx_compositor::render_graph::SceneNode::empty("scene").with_output(
            "color",
            OutputSpec::default().output_last_frame(),
        ))
        .unwrap();
    graph.add_node(ctx.sink("out", "scene")).unwrap();

    let first = graph.render(&mut ctx.renderer, None).unwrap();
    assert_eq!(first.rendered, ["out", "scene"]);
    let retained = graph.pin_info("scene", "color").unwrap().previous;

    graph.render(&mut ctx.renderer, None).unwrap();
    let draws = ctx.renderer.take_draws();
    assert_eq!(draws.last().unwrap().texture("texture"), retained);
    assert_ne!(draws[0].texture("texture"), retained);
}

#[test]
fn test_placeholder_allocation_failure_is_a_render_failure() {
    let mut ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    graph
        .add_node(fx_compositor::render_graph::SceneNode::empty("scene").with_output(
            "color",
            OutputSpec::default().output_last_frame(),
        ))
        .unwrap();
    graph.add_node(ctx.sink("out", "scene")).unwrap();
    ctx.renderer.fail_texture_creation(true);

    match graph.render(&mut ctx.renderer, None) {
        Err(GraphError::RenderFailure { node, source }) => {
            assert_eq!(node, "scene");
            assert!(matches!(source, BackendError::TextureCreationFailed(_)));
        }
        other => panic!("expected a render failure, got {:?}", other.map(|s| s.rendered)),
    }
    assert_eq!(graph.pool().outstanding_count(), 0);
}

#[test]
fn test_failed_feedback_frame_is_not_retained() {
    let mut ctx = TestContext::new();
    let mut graph = feedback_graph(&ctx);
    graph.render(&mut ctx.renderer, None).unwrap();
    let first = graph.pin_info("trail", "color").unwrap().previous;
    assert!(first.is_some());

    ctx.renderer.fail_draws_with(Some("trail"));
    assert!(graph.render(&mut ctx.renderer, None).is_err());
    assert_eq!(graph.pin_info("trail", "color").unwrap().previous, first);
    assert_eq!(graph.pool().outstanding_count(), 1);

    ctx.renderer.fail_draws_with(None);
    ctx.renderer.take_draws();
    graph.render(&mut ctx.renderer, None).unwrap();
    let draws = ctx.renderer.take_draws();
    let trail = draws.iter().find(|d| d.material == "trail").unwrap();
    assert_eq!(trail.texture("previous"), first);
}

#[test]
fn test_fixed_placeholder_without_clear() {
    let config = CompositorConfig::new()
        .with_feedback_placeholder(FeedbackPlaceholder::Fixed {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
        })
        .with_clear_placeholder(false);
    let mut ctx = TestContext::new();
    let mut graph = RenderGraph::with_config(config);
    graph.add_node(scene("scene")).unwrap();
    graph
        .add_node(feedback_node(&ctx.library, "trail", "scene", OutputSpec::default(), 0.5).unwrap())
        .unwrap();
    graph.add_node(ctx.sink("out", "trail")).unwrap();

    graph.render(&mut ctx.renderer, None).unwrap();
    let placeholder = ctx.renderer.draws()[0].texture("previous").unwrap();
    let desc = ctx.renderer.texture_desc(placeholder).unwrap();
    assert_eq!((desc.width, desc.height), (1, 1));
    assert!(ctx.renderer.cleared().is_empty());
}
