//! Backend abstraction layer
//!
//! Provides the `Renderer` trait the compositor drives, plus a recording
//! dummy implementation and a headless wgpu implementation.

pub mod dummy;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use dummy::DummyBackend;
pub use traits::*;
pub use types::*;
