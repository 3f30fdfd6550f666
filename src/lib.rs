//! FX Compositor - A node-based post-processing render graph
//!
//! Effects are nodes with named input and output pins. The graph evaluates
//! lazily from its output nodes, renders every reachable node once per
//! frame and recycles render targets through a texture pool as soon as
//! their last reader has run.
//!
//! # Features
//! - Pull evaluation with reference-counted render targets
//! - Previous-frame feedback through cycles or explicit `prev_frame` inputs
//! - Group nodes that package sub-graphs behind their own pins
//! - JSON graph declarations
//! - Backends: a headless wgpu renderer and a recording dummy for tests
//!
//! ```no_run
//! use fx_compositor::{DummyBackend, RenderGraph, ShaderLibrary};
//! use fx_compositor::pipeline::postprocess::{register_builtin_shaders, tonemap_node, TonemapOperator};
//! use fx_compositor::render_graph::{OutputSpec, SceneNode};
//!
//! let mut renderer = DummyBackend::new(1280, 720);
//! let mut library = ShaderLibrary::new();
//! register_builtin_shaders(&mut library, &mut renderer).unwrap();
//!
//! let mut graph = RenderGraph::new();
//! graph
//!     .add_node(SceneNode::empty("scene").with_output("color", OutputSpec::default()))
//!     .unwrap();
//! graph
//!     .add_node(tonemap_node(&library, "tonemap", "scene", TonemapOperator::Aces, 1.0).unwrap())
//!     .unwrap();
//! graph.render(&mut renderer, None).unwrap();
//! ```

pub mod backend;
pub mod config;
pub mod pipeline;
pub mod render_graph;
pub mod resources;

pub use backend::{DummyBackend, Renderer};
pub use config::{CompositorConfig, FeedbackPlaceholder};
pub use render_graph::{GraphDeclaration, GraphError, GraphResult, RenderGraph};
pub use resources::{Material, ShaderLibrary};

#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuBackend;
