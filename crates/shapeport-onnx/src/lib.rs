//! Static shape inference over ONNX models.
//!
//! Reads a serialized `ModelProto`, propagates element types and shapes
//! through the main graph node by node, and writes the model back with
//! every inferred intermediate recorded in `value_info`.

mod attrs;
mod convert;
mod graph;
mod infer;
mod io;
mod ops;
mod values;

use shapeport_core::{ArtifactPaths, InferOptions, InferenceReport, Result, ShapeEngine};
use tracing::info;

pub use infer::infer_shapes;
pub use io::{load_model, save_model};

pub struct OnnxShapeEngine;

impl OnnxShapeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OnnxShapeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeEngine for OnnxShapeEngine {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn infer_path(&self, paths: &ArtifactPaths, options: &InferOptions) -> Result<InferenceReport> {
        infer_shapes_path(paths, options)
    }
}

/// Loads `paths.input`, infers shapes and saves the result to
/// `paths.output`. The output file is only touched once inference has
/// succeeded.
pub fn infer_shapes_path(paths: &ArtifactPaths, options: &InferOptions) -> Result<InferenceReport> {
    let mut model = load_model(paths.input())?;
    let report = infer_shapes(&mut model, options)?;
    save_model(paths.output(), &model)?;
    info!(
        input = %paths.input().display(),
        output = %paths.output().display(),
        nodes = report.nodes,
        resolved = report.resolved,
        unresolved = report.unresolved.len(),
        skipped = report.skipped_ops.len(),
        failed = report.failures.len(),
        "shape inference complete"
    );
    Ok(report)
}
