use std::fmt;

use smallvec::SmallVec;

use crate::{Result, ShapeError};

/// Element type of an ONNX tensor. Discriminants are the
/// `TensorProto.DataType` wire values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    F32 = 1,
    U8 = 2,
    I8 = 3,
    U16 = 4,
    I16 = 5,
    I32 = 6,
    I64 = 7,
    String = 8,
    Bool = 9,
    F16 = 10,
    F64 = 11,
    U32 = 12,
    U64 = 13,
    Complex64 = 14,
    Complex128 = 15,
    BF16 = 16,
    F8E4M3FN = 17,
    F8E4M3FNUZ = 18,
    F8E5M2 = 19,
    F8E5M2FNUZ = 20,
    U4 = 21,
    I4 = 22,
}

impl DType {
    /// Maps an ONNX `elem_type`/`data_type` value. `0` (UNDEFINED) and
    /// unknown values yield `None`.
    pub fn from_onnx(raw: i32) -> Option<Self> {
        let dtype = match raw {
            1 => DType::F32,
            2 => DType::U8,
            3 => DType::I8,
            4 => DType::U16,
            5 => DType::I16,
            6 => DType::I32,
            7 => DType::I64,
            8 => DType::String,
            9 => DType::Bool,
            10 => DType::F16,
            11 => DType::F64,
            12 => DType::U32,
            13 => DType::U64,
            14 => DType::Complex64,
            15 => DType::Complex128,
            16 => DType::BF16,
            17 => DType::F8E4M3FN,
            18 => DType::F8E4M3FNUZ,
            19 => DType::F8E5M2,
            20 => DType::F8E5M2FNUZ,
            21 => DType::U4,
            22 => DType::I4,
            _ => return None,
        };
        Some(dtype)
    }

    pub fn to_onnx(self) -> i32 {
        self as i32
    }

    /// Storage size of one element. `None` for strings and the packed
    /// 4-bit types.
    pub fn byte_size(self) -> Option<usize> {
        match self {
            DType::Bool
            | DType::U8
            | DType::I8
            | DType::F8E4M3FN
            | DType::F8E4M3FNUZ
            | DType::F8E5M2
            | DType::F8E5M2FNUZ => Some(1),
            DType::U16 | DType::I16 | DType::F16 | DType::BF16 => Some(2),
            DType::F32 | DType::I32 | DType::U32 => Some(4),
            DType::F64 | DType::I64 | DType::U64 | DType::Complex64 => Some(8),
            DType::Complex128 => Some(16),
            DType::String | DType::U4 | DType::I4 => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::U8
                | DType::I8
                | DType::U16
                | DType::I16
                | DType::I32
                | DType::I64
                | DType::U32
                | DType::U64
                | DType::U4
                | DType::I4
        )
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "float32",
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::U16 => "uint16",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::String => "string",
            DType::Bool => "bool",
            DType::F16 => "float16",
            DType::F64 => "float64",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
            DType::BF16 => "bfloat16",
            DType::F8E4M3FN => "float8e4m3fn",
            DType::F8E4M3FNUZ => "float8e4m3fnuz",
            DType::F8E5M2 => "float8e5m2",
            DType::F8E5M2FNUZ => "float8e5m2fnuz",
            DType::U4 => "uint4",
            DType::I4 => "int4",
        };
        f.write_str(name)
    }
}

/// One axis of a tensor shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    Known(usize),
    /// Named dimension (`dim_param`), e.g. a batch size `N`.
    Symbolic(String),
    Unknown,
}

impl Dim {
    pub fn known(&self) -> Option<usize> {
        match self {
            Dim::Known(d) => Some(*d),
            _ => None,
        }
    }

    /// Combines two annotations of the same axis, keeping the more specific
    /// one. Two different known sizes do not merge.
    pub fn merge(&self, other: &Dim) -> Option<Dim> {
        match (self, other) {
            (Dim::Known(a), Dim::Known(b)) if a != b => None,
            (Dim::Known(_), _) => Some(self.clone()),
            (_, Dim::Known(_)) => Some(other.clone()),
            (Dim::Symbolic(_), _) => Some(self.clone()),
            (_, Dim::Symbolic(_)) => Some(other.clone()),
            (Dim::Unknown, Dim::Unknown) => Some(Dim::Unknown),
        }
    }
}

impl From<usize> for Dim {
    fn from(d: usize) -> Self {
        Dim::Known(d)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Known(d) => write!(f, "{d}"),
            Dim::Symbolic(name) => f.write_str(name),
            Dim::Unknown => f.write_str("?"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape(pub SmallVec<[Dim; 6]>);

impl Shape {
    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }

    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().map(Dim::Known).collect())
    }

    pub fn from_dims(dims: impl IntoIterator<Item = Dim>) -> Self {
        Self(dims.into_iter().collect())
    }

    /// A shape of the given rank with no size information.
    pub fn unknown(rank: usize) -> Self {
        Self(std::iter::repeat(Dim::Unknown).take(rank).collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    /// Element count, when every axis is known. A scalar holds one element.
    pub fn numel(&self) -> Option<usize> {
        self.0
            .iter()
            .try_fold(1usize, |acc, d| d.known().and_then(|d| acc.checked_mul(d)))
    }

    /// All sizes, when every axis is known.
    pub fn to_known(&self) -> Option<Vec<usize>> {
        self.0.iter().map(Dim::known).collect()
    }

    /// Numpy-style multidirectional broadcast.
    pub fn broadcast(&self, other: &Shape) -> Result<Shape> {
        let rank = self.rank().max(other.rank());
        let mut out = SmallVec::with_capacity(rank);
        for i in 0..rank {
            let a = axis_from_end(self, rank - 1 - i);
            let b = axis_from_end(other, rank - 1 - i);
            let dim = match (a, b) {
                (None, Some(d)) | (Some(d), None) => d.clone(),
                (Some(Dim::Known(1)), Some(d)) | (Some(d), Some(Dim::Known(1))) => d.clone(),
                (Some(Dim::Known(x)), Some(Dim::Known(y))) if x == y => Dim::Known(*x),
                (Some(Dim::Known(_)), Some(Dim::Known(_))) => {
                    return Err(ShapeError::broadcast(self, other));
                }
                (Some(Dim::Known(x)), Some(_)) | (Some(_), Some(Dim::Known(x))) => Dim::Known(*x),
                (Some(Dim::Symbolic(x)), Some(Dim::Symbolic(y))) if x == y => {
                    Dim::Symbolic(x.clone())
                }
                (Some(_), Some(_)) => Dim::Unknown,
                (None, None) => Dim::Unknown,
            };
            out.push(dim);
        }
        Ok(Shape(out))
    }

    /// Axis-wise merge of two annotations of the same tensor.
    pub fn merge(&self, other: &Shape) -> Option<Shape> {
        if self.rank() != other.rank() {
            return None;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.merge(b))
            .collect::<Option<SmallVec<_>>>()
            .map(Shape)
    }
}

fn axis_from_end(shape: &Shape, from_end: usize) -> Option<&Dim> {
    shape
        .rank()
        .checked_sub(from_end + 1)
        .map(|i| &shape.0[i])
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

/// Resolves a possibly negative axis against `rank`.
pub fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let rank = rank as i64;
    let axis = if axis < 0 { axis + rank } else { axis };
    (0..rank).contains(&axis).then_some(axis as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Dim {
        Dim::Symbolic(name.to_string())
    }

    #[test]
    fn broadcast_follows_numpy_rules() {
        let a = Shape::from_slice(&[8, 1, 6, 1]);
        let b = Shape::from_slice(&[7, 1, 5]);
        assert_eq!(a.broadcast(&b).unwrap(), Shape::from_slice(&[8, 7, 6, 5]));

        let scalar = Shape::scalar();
        assert_eq!(scalar.broadcast(&b).unwrap(), b);
    }

    #[test]
    fn broadcast_rejects_mismatched_sizes() {
        let a = Shape::from_slice(&[2, 3]);
        let b = Shape::from_slice(&[4, 3]);
        assert!(matches!(a.broadcast(&b), Err(ShapeError::Broadcast { .. })));
    }

    #[test]
    fn broadcast_keeps_symbols_when_possible() {
        let a = Shape::from_dims([sym("N"), Dim::Known(3)]);
        let b = Shape::from_dims([sym("N"), Dim::Known(1)]);
        assert_eq!(
            a.broadcast(&b).unwrap(),
            Shape::from_dims([sym("N"), Dim::Known(3)])
        );

        let c = Shape::from_dims([sym("M"), Dim::Known(3)]);
        assert_eq!(a.broadcast(&c).unwrap().dims()[0], Dim::Unknown);
    }

    #[test]
    fn merge_prefers_specific_dims() {
        let declared = Shape::from_dims([sym("N"), Dim::Unknown]);
        let inferred = Shape::from_dims([Dim::Unknown, Dim::Known(10)]);
        assert_eq!(
            declared.merge(&inferred),
            Some(Shape::from_dims([sym("N"), Dim::Known(10)]))
        );
        assert_eq!(
            Shape::from_slice(&[1, 2]).merge(&Shape::from_slice(&[1, 3])),
            None
        );
        assert_eq!(Shape::from_slice(&[1]).merge(&Shape::from_slice(&[1, 1])), None);
    }

    #[test]
    fn numel_requires_known_dims() {
        assert_eq!(Shape::from_slice(&[2, 3, 4]).numel(), Some(24));
        assert_eq!(Shape::scalar().numel(), Some(1));
        assert_eq!(Shape::from_dims([sym("N"), Dim::Known(4)]).numel(), None);
    }

    #[test]
    fn dtype_round_trips_wire_values() {
        for raw in 1..=22 {
            let dtype = DType::from_onnx(raw).unwrap();
            assert_eq!(dtype.to_onnx(), raw);
        }
        assert_eq!(DType::from_onnx(0), None);
        assert_eq!(DType::from_onnx(99), None);
    }

    #[test]
    fn normalize_axis_handles_negatives() {
        assert_eq!(normalize_axis(-1, 4), Some(3));
        assert_eq!(normalize_axis(2, 4), Some(2));
        assert_eq!(normalize_axis(4, 4), None);
        assert_eq!(normalize_axis(-5, 4), None);
    }
}
