//! Resource management
//!
//! Materials bind compiled shaders to the textures and uniforms a pass uses.

pub mod material;
pub mod shader_library;

pub use material::*;
pub use shader_library::ShaderLibrary;
