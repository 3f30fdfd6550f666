//! Ready-made compositor pipelines
//!
//! Shaders and node builders for common post-processing chains.

pub mod postprocess;
