use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Shape;

pub type Result<T, E = ShapeError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("invalid arguments: {0}")]
    Argument(String),

    #[error("input model not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid ONNX model: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot broadcast shapes {lhs} and {rhs}")]
    Broadcast { lhs: Shape, rhs: Shape },

    #[error("shape inference failed at node '{node}' ({op_type}): {reason}")]
    Inference {
        node: String,
        op_type: String,
        reason: String,
    },
}

impl ShapeError {
    pub fn format(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn broadcast(lhs: &Shape, rhs: &Shape) -> Self {
        Self::Broadcast {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        }
    }

    pub fn inference(node: &str, op_type: &str, reason: impl Into<String>) -> Self {
        Self::Inference {
            node: node.to_string(),
            op_type: op_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this failure kind. clap's own usage errors
    /// also exit with 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            ShapeError::Argument(_) => 2,
            ShapeError::FileNotFound { .. } | ShapeError::Read { .. } => 3,
            ShapeError::Format { .. } => 4,
            ShapeError::Write { .. } => 5,
            ShapeError::Broadcast { .. } | ShapeError::Inference { .. } => 6,
        }
    }
}
