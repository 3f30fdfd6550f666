//! Common utilities for compositor integration tests.

#![allow(dead_code)]

use fx_compositor::backend::DummyBackend;
use fx_compositor::pipeline::postprocess::{register_builtin_shaders, shaders};
use fx_compositor::render_graph::{FilterNode, InputRef, OutputSpec, SceneNode};
use fx_compositor::ShaderLibrary;

/// Viewport used by most tests. Power of two so mipmaps survive pooling.
pub const VIEWPORT: u32 = 256;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Dummy renderer with every built-in shader registered
pub struct TestContext {
    pub renderer: DummyBackend,
    pub library: ShaderLibrary,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_viewport(VIEWPORT, VIEWPORT)
    }

    pub fn with_viewport(width: u32, height: u32) -> Self {
        init_logging();
        let mut renderer = DummyBackend::new(width, height);
        let mut library = ShaderLibrary::new();
        register_builtin_shaders(&mut library, &mut renderer).unwrap();
        Self { renderer, library }
    }

    /// Copy filter reading `source` into a viewport sized `color` output
    pub fn copy(&self, name: &str, source: impl Into<InputRef>) -> FilterNode {
        self.copy_to(name, source, OutputSpec::default())
    }

    pub fn copy_to(&self, name: &str, source: impl Into<InputRef>, output: OutputSpec) -> FilterNode {
        self.sink(name, source).with_output("color", output)
    }

    /// Copy filter without outputs, drawing to the graph target
    pub fn sink(&self, name: &str, source: impl Into<InputRef>) -> FilterNode {
        FilterNode::new(name, self.library.material(name, shaders::COPY).unwrap())
            .with_input("texture", source)
    }

    /// Two-input composite filter
    pub fn composite(&self, name: &str, base: impl Into<InputRef>, bloom: impl Into<InputRef>) -> FilterNode {
        FilterNode::new(
            name,
            self.library.material(name, shaders::BLOOM_COMPOSITE).unwrap(),
        )
        .with_input("texture", base)
        .with_input("bloom", bloom)
    }
}

/// Host drawn node with a viewport sized `color` output
pub fn scene(name: &str) -> SceneNode {
    SceneNode::empty(name).with_output("color", OutputSpec::default())
}
