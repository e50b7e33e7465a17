use std::fmt;

use crate::{DType, Shape};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorName(pub String);

impl fmt::Display for TensorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorRole {
    Input,
    Initializer,
    Intermediate,
    Output,
}

impl fmt::Display for TensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TensorRole::Input => "input",
            TensorRole::Initializer => "initializer",
            TensorRole::Intermediate => "intermediate",
            TensorRole::Output => "output",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TensorSpec {
    pub name: TensorName,
    pub role: TensorRole,
    pub dtype: Option<DType>,
    pub shape: Option<Shape>, // None = rank unknown
}

impl TensorSpec {
    pub fn is_resolved(&self) -> bool {
        self.dtype.is_some() && self.shape.is_some()
    }

    /// Bytes needed to hold the tensor, when its size and element width
    /// are both known.
    pub fn memory_usage(&self) -> Option<usize> {
        let numel = self.shape.as_ref()?.numel()?;
        numel.checked_mul(self.dtype?.byte_size()?)
    }
}

/// What a shape-inference run found.
#[derive(Clone, Debug, Default)]
pub struct InferenceReport {
    pub tensors: Vec<TensorSpec>,
    pub nodes: usize,
    pub resolved: usize,
    pub unresolved: Vec<TensorName>,
    /// Operator types that had no shape rule, in first-seen order.
    pub skipped_ops: Vec<String>,
    /// Nodes whose rule failed in lenient mode; their outputs keep the
    /// declared annotations.
    pub failures: Vec<String>,
}

impl InferenceReport {
    /// Bytes of graph inputs, intermediates and outputs with a known size.
    pub fn activation_bytes(&self) -> usize {
        self.tensors
            .iter()
            .filter(|t| t.role != TensorRole::Initializer)
            .filter_map(TensorSpec::memory_usage)
            .sum()
    }

    /// Bytes of initializers (weights) with a known size.
    pub fn parameter_bytes(&self) -> usize {
        self.tensors
            .iter()
            .filter(|t| t.role == TensorRole::Initializer)
            .filter_map(TensorSpec::memory_usage)
            .sum()
    }
}
