//! Leaf node kinds

mod filter;
mod scene;
mod texture;

pub use filter::FilterNode;
pub use scene::{DrawFn, SceneNode};
pub use texture::TextureNode;
