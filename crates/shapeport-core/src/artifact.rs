use std::path::{Path, PathBuf};

use crate::{Result, ShapeError};

/// Where a model is read from and where its shape-annotated copy goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ArtifactPaths {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Result<Self> {
        let input = input.into();
        let output = output.into();
        if input.as_os_str().is_empty() {
            return Err(ShapeError::Argument("input path is empty".to_string()));
        }
        if output.as_os_str().is_empty() {
            return Err(ShapeError::Argument("output path is empty".to_string()));
        }
        Ok(Self { input, output })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}
