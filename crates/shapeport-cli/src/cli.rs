use std::path::PathBuf;

use clap::Parser;
use shapeport_core::{ArtifactPaths, InferOptions, Result};

#[derive(Parser, Debug)]
#[command(
    name = "shape-infer",
    version,
    about = "Write a copy of an ONNX model with inferred tensor shapes"
)]
pub struct Cli {
    /// Path of the ONNX model to read
    #[arg(short, long, value_name = "PATH")]
    pub input: PathBuf,

    /// Path to write the shape-inferred model to
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Fail on operators without a shape rule or outputs left unresolved
    #[arg(long)]
    pub strict: bool,

    /// Check that operands agree on element type
    #[arg(long)]
    pub check_type: bool,

    /// Propagate constant shape values through shape arithmetic
    #[arg(long)]
    pub data_prop: bool,

    /// Print a per-tensor summary to stdout
    #[arg(long)]
    pub report: bool,

    /// Log filter (tracing directives, e.g. "debug" or "shapeport_onnx=debug")
    #[arg(long, default_value = "warn")]
    pub log: String,
}

impl Cli {
    pub fn paths(&self) -> Result<ArtifactPaths> {
        ArtifactPaths::new(&self.input, &self.output)
    }

    pub fn options(&self) -> InferOptions {
        InferOptions {
            strict: self.strict,
            check_type: self.check_type,
            data_prop: self.data_prop,
        }
    }
}
