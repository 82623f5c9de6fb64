//! Error types for connection construction

use nestconn_core::{CoreError, NodeId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NestError {
    #[error("Size mismatch: {0}")]
    SizeMismatch(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown parameter '{param}' for {model}")]
    UnknownParameter { model: String, param: String },

    #[error("Parameter '{param}' of {model} cannot be set here: {reason}")]
    ImmutableParameter {
        model: String,
        param: String,
        reason: String,
    },

    #[error("Missing dependency for {model}: {what}")]
    MissingDependency { model: String, what: String },

    #[error("Array parameter '{param}' has {actual} entries but {expected} connections are created")]
    LengthMismatch {
        param: String,
        expected: usize,
        actual: usize,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Target {target} ({model}) has no receptor port {port}")]
    UnknownReceptor {
        target: NodeId,
        model: String,
        port: usize,
    },

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Model already exists: {0}")]
    DuplicateModel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, NestError>;

impl NestError {
    pub fn unknown_parameter(model: impl Into<String>, param: impl Into<String>) -> Self {
        Self::UnknownParameter {
            model: model.into(),
            param: param.into(),
        }
    }

    pub fn immutable(
        model: impl Into<String>,
        param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ImmutableParameter {
            model: model.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_dependency(model: impl Into<String>, what: impl Into<String>) -> Self {
        Self::MissingDependency {
            model: model.into(),
            what: what.into(),
        }
    }
}
