use crate::{ArtifactPaths, InferenceReport, Result};

/// Knobs of a shape-inference run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InferOptions {
    /// Unhandled operators and unresolvable outputs are errors.
    pub strict: bool,
    /// Operands that must share an element type are checked.
    pub check_type: bool,
    /// Propagate small constant integer tensors through shape arithmetic.
    pub data_prop: bool,
}

pub trait ShapeEngine {
    fn name(&self) -> &'static str;

    /// Reads the model at `paths.input`, annotates it and writes it to
    /// `paths.output`. Nothing is written when any earlier step fails.
    fn infer_path(&self, paths: &ArtifactPaths, options: &InferOptions) -> Result<InferenceReport>;
}
