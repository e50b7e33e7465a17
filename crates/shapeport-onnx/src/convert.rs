use shapeport_core::{DType, Dim, Shape};
use shapeport_proto::onnx::tensor_shape_proto::{dimension, Dimension};
use shapeport_proto::onnx::type_proto;
use shapeport_proto::{TensorProto, TensorShapeProto, TypeProto, ValueInfoProto};

/// Element type and shape of one tensor as far as they are known.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct TensorInfo {
    pub dtype: Option<DType>,
    pub shape: Option<Shape>,
}

impl TensorInfo {
    pub(crate) fn new(dtype: Option<DType>, shape: Option<Shape>) -> Self {
        Self { dtype, shape }
    }
}

/// Tensor types only; sequences, maps and optionals carry no shape we track.
pub(crate) fn info_from_type(ty: &TypeProto) -> Option<TensorInfo> {
    let Some(type_proto::Value::TensorType(tensor)) = &ty.value else {
        return None;
    };
    Some(TensorInfo {
        dtype: DType::from_onnx(tensor.elem_type),
        shape: tensor.shape.as_ref().map(shape_from_proto),
    })
}

pub(crate) fn info_from_value_info(value_info: &ValueInfoProto) -> Option<TensorInfo> {
    value_info.r#type.as_ref().and_then(info_from_type)
}

pub(crate) fn info_from_initializer(tensor: &TensorProto) -> TensorInfo {
    let dims = tensor.dims.iter().map(|&d| match usize::try_from(d) {
        Ok(d) => Dim::Known(d),
        Err(_) => Dim::Unknown,
    });
    TensorInfo {
        dtype: DType::from_onnx(tensor.data_type),
        shape: Some(Shape::from_dims(dims)),
    }
}

fn shape_from_proto(shape: &TensorShapeProto) -> Shape {
    Shape::from_dims(shape.dim.iter().map(|d| match &d.value {
        Some(dimension::Value::DimValue(v)) if *v >= 0 => Dim::Known(*v as usize),
        Some(dimension::Value::DimParam(p)) if !p.is_empty() => Dim::Symbolic(p.clone()),
        _ => Dim::Unknown,
    }))
}

fn shape_to_proto(shape: &Shape) -> TensorShapeProto {
    TensorShapeProto {
        dim: shape
            .dims()
            .iter()
            .map(|d| Dimension {
                value: match d {
                    Dim::Known(v) => Some(dimension::Value::DimValue(*v as i64)),
                    Dim::Symbolic(p) => Some(dimension::Value::DimParam(p.clone())),
                    Dim::Unknown => None,
                },
                ..Default::default()
            })
            .collect(),
    }
}

/// Builds a tensor `TypeProto`. Callers only write tensors whose element
/// type is known.
pub(crate) fn type_from_info(info: &TensorInfo, dtype: DType) -> TypeProto {
    TypeProto {
        value: Some(type_proto::Value::TensorType(type_proto::Tensor {
            elem_type: dtype.to_onnx(),
            shape: info.shape.as_ref().map(shape_to_proto),
        })),
        ..Default::default()
    }
}

/// Rewrites the tensor type of `ty` in place, keeping dimension
/// denotations that were already present on the same axes.
pub(crate) fn update_type(ty: &mut TypeProto, info: &TensorInfo, dtype: DType) {
    let previous = match &ty.value {
        Some(type_proto::Value::TensorType(tensor)) => tensor.shape.clone(),
        _ => None,
    };
    let mut fresh = type_from_info(info, dtype);
    if let (Some(prev), Some(type_proto::Value::TensorType(tensor))) = (previous, &mut fresh.value)
    {
        if let Some(shape) = tensor.shape.as_mut() {
            if shape.dim.len() == prev.dim.len() {
                for (dim, old) in shape.dim.iter_mut().zip(prev.dim) {
                    dim.denotation = old.denotation;
                }
            }
        }
    }
    ty.value = fresh.value;
}
