//! Render Graph System
//!
//! Nodes are wired by name through input pins. Each frame the graph resolves
//! the wiring, counts how often every output is read and evaluates from the
//! output nodes backwards, recycling render targets through a shared pool.
//! Cycles are allowed and read the previous frame's texture.

pub mod declaration;
pub mod error;
pub mod executor;
pub mod graph;
pub mod group;
pub mod link;
pub mod node;
pub mod nodes;
pub mod pass;
pub mod pool;
pub mod resource;

pub use declaration::GraphDeclaration;
pub use error::{GraphError, GraphResult};
pub use executor::*;
pub use graph::*;
pub use group::{Boundary, GroupNode};
pub use link::{Link, LinkTable};
pub use node::{InputRef, Node, NodeCore, NodeId, NodeKey, NodeKind, NodeRef, NodeSet};
pub use nodes::*;
pub use pass::*;
pub use pool::*;
pub use resource::*;
