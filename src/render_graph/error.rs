//! Render graph errors

use crate::backend::traits::BackendError;
use thiserror::Error;

/// Render graph error type
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Node '{node}' input '{pin}' has no producer: {reason}")]
    MissingLink {
        node: String,
        pin: String,
        reason: String,
    },
    #[error("Node '{node}' cannot consume input '{pin}'")]
    UnusedPin { node: String, pin: String },
    #[error("Node '{node}' failed to render: {source}")]
    RenderFailure {
        node: String,
        #[source]
        source: BackendError,
    },
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),
    #[error("Node '{node}' has no output pin '{pin}'")]
    OutputNotFound { node: String, pin: String },
    #[error("Invalid graph declaration: {0}")]
    InvalidDeclaration(String),
    #[error("Unknown shader '{shader}' for node '{node}'")]
    UnknownShader { node: String, shader: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Failed to parse graph declaration: {0}")]
    Json(#[from] serde_json::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;
