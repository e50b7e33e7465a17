use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use bytes::Bytes;
use prost::Message;
use shapeport_core::{Result, ShapeError};
use shapeport_proto::ModelProto;

/// Reads and decodes a serialized ONNX model. A model without a main graph
/// is rejected here so later stages can rely on it.
pub fn load_model(path: &Path) -> Result<ModelProto> {
    let data = fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ShapeError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => ShapeError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let model = ModelProto::decode(Bytes::from(data))
        .map_err(|err| ShapeError::format(path, err.to_string()))?;
    if model.graph.is_none() {
        return Err(ShapeError::format(path, "model has no graph"));
    }
    Ok(model)
}

pub fn save_model(path: &Path, model: &ModelProto) -> Result<()> {
    fs::write(path, model.encode_to_vec()).map_err(|source| ShapeError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let err = load_model(Path::new("/nonexistent/shapeport/model.onnx")).unwrap_err();
        assert!(matches!(err, ShapeError::FileNotFound { .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
