use bytes::Bytes;
use shapeport_core::DType;
use shapeport_proto::onnx::tensor_proto::DataLocation;
use shapeport_proto::TensorProto;

/// Integer tensors larger than this are not tracked as constants.
const MAX_TRACKED_INTS: usize = 4096;
/// Float constants only matter as small parameter vectors (e.g. resize scales).
const MAX_TRACKED_FLOATS: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Values {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

/// A compile-time known tensor, kept for operators whose output shape
/// depends on input data (Reshape, Expand, Slice...).
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ConstValue {
    pub dtype: DType,
    pub dims: Vec<usize>,
    pub values: Values,
}

impl ConstValue {
    pub(crate) fn ints(dims: Vec<usize>, ints: Vec<i64>) -> Self {
        Self {
            dtype: DType::I64,
            dims,
            values: Values::Int(ints),
        }
    }

    pub(crate) fn vector(ints: Vec<i64>) -> Self {
        Self::ints(vec![ints.len()], ints)
    }

    pub(crate) fn scalar(v: i64) -> Self {
        Self::ints(Vec::new(), vec![v])
    }

    pub(crate) fn as_ints(&self) -> Option<&[i64]> {
        match &self.values {
            Values::Int(v) => Some(v),
            Values::Float(_) => None,
        }
    }

    pub(crate) fn as_floats(&self) -> Vec<f64> {
        match &self.values {
            Values::Int(v) => v.iter().map(|&x| x as f64).collect(),
            Values::Float(v) => v.clone(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match &self.values {
            Values::Int(v) => v.len(),
            Values::Float(v) => v.len(),
        }
    }

    /// Reads a tensor's payload. Only integer and float tensors stored
    /// inline are tracked.
    pub(crate) fn from_tensor(tensor: &TensorProto) -> Option<Self> {
        if tensor.data_location == DataLocation::External as i32 {
            return None;
        }
        let dtype = DType::from_onnx(tensor.data_type)?;
        let dims = tensor
            .dims
            .iter()
            .map(|&d| usize::try_from(d).ok())
            .collect::<Option<Vec<_>>>()?;
        let numel = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))?;

        let values = if dtype.is_integer() {
            if numel > MAX_TRACKED_INTS {
                return None;
            }
            Values::Int(int_payload(tensor, dtype)?)
        } else {
            if numel > MAX_TRACKED_FLOATS {
                return None;
            }
            Values::Float(float_payload(tensor, dtype)?)
        };

        let value = Self {
            dtype,
            dims,
            values,
        };
        (value.len() == numel).then_some(value)
    }
}

fn int_payload(tensor: &TensorProto, dtype: DType) -> Option<Vec<i64>> {
    if !tensor.raw_data.is_empty() {
        return raw_ints(&tensor.raw_data, dtype);
    }
    match dtype {
        DType::I64 => Some(tensor.int64_data.clone()),
        DType::U32 | DType::U64 => tensor
            .uint64_data
            .iter()
            .map(|&v| i64::try_from(v).ok())
            .collect(),
        _ => Some(tensor.int32_data.iter().map(|&v| v as i64).collect()),
    }
}

fn float_payload(tensor: &TensorProto, dtype: DType) -> Option<Vec<f64>> {
    if !tensor.raw_data.is_empty() {
        return raw_floats(&tensor.raw_data, dtype);
    }
    match dtype {
        DType::F32 => Some(tensor.float_data.iter().map(|&v| v as f64).collect()),
        DType::F64 => Some(tensor.double_data.clone()),
        _ => None,
    }
}

/// Little-endian integers; `None` when a u64 does not fit in i64.
fn raw_ints(bytes: &Bytes, dtype: DType) -> Option<Vec<i64>> {
    let width = dtype.byte_size()?;
    if !bytes.len().is_multiple_of(width) {
        return None;
    }
    bytes
        .chunks_exact(width)
        .map(|b| match dtype {
            DType::I64 => Some(i64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ])),
            DType::U64 => i64::try_from(u64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))
            .ok(),
            DType::I32 => Some(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64),
            DType::U32 => Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64),
            DType::I16 => Some(i16::from_le_bytes([b[0], b[1]]) as i64),
            DType::U16 => Some(u16::from_le_bytes([b[0], b[1]]) as i64),
            DType::I8 => Some(b[0] as i8 as i64),
            _ => Some(b[0] as i64),
        })
        .collect()
}

fn raw_floats(bytes: &Bytes, dtype: DType) -> Option<Vec<f64>> {
    match dtype {
        DType::F32 if bytes.len().is_multiple_of(4) => Some(
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
        ),
        DType::F64 if bytes.len().is_multiple_of(8) => Some(
            bytes
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
        ),
        _ => None,
    }
}
