use shapeport_core::{DType, Dim, Result, Shape};

use super::{shape_from_ints, Inferred, NodeCtx};
use crate::convert::{info_from_initializer, TensorInfo};
use crate::values::{ConstValue, Values};

/// Shape of X as a 1-D int64 tensor, optionally sliced by `start`/`end`.
pub(crate) fn shape(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(Some(DType::I64), Some(Shape::unknown(1))));
    };
    let rank = x.rank() as i64;
    let clamp = |v: i64| (if v < 0 { v + rank } else { v }).clamp(0, rank) as usize;
    let start = clamp(ctx.attrs.int_or("start", 0));
    let end = clamp(ctx.attrs.int_or("end", rank)).max(start);
    let dims = &x.dims()[start..end];

    let value = dims
        .iter()
        .map(|d| d.known().map(|d| d as i64))
        .collect::<Option<Vec<_>>>()
        .map(ConstValue::vector);
    Ok(Inferred::one(Some(DType::I64), Some(Shape::from_slice(&[dims.len()]))).with_value(value))
}

pub(crate) fn size(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let value = ctx
        .shape(0)
        .and_then(Shape::numel)
        .and_then(|n| i64::try_from(n).ok())
        .map(ConstValue::scalar);
    Ok(Inferred::one(Some(DType::I64), Some(Shape::scalar())).with_value(value))
}

/// Constant carries its payload in exactly one `value*` attribute.
pub(crate) fn constant(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let attrs = &ctx.attrs;
    if let Some(tensor) = attrs.tensor("value") {
        let info = info_from_initializer(tensor);
        return Ok(Inferred::many(vec![info]).with_value(ConstValue::from_tensor(tensor)));
    }
    if let Some(v) = attrs.int("value_int") {
        return Ok(Inferred::one(Some(DType::I64), Some(Shape::scalar()))
            .with_value(Some(ConstValue::scalar(v))));
    }
    if let Some(v) = attrs.ints("value_ints") {
        return Ok(Inferred::one(Some(DType::I64), Some(Shape::from_slice(&[v.len()])))
            .with_value(Some(ConstValue::vector(v.to_vec()))));
    }
    if let Some(v) = attrs.float("value_float") {
        let value = ConstValue {
            dtype: DType::F32,
            dims: Vec::new(),
            values: Values::Float(vec![v as f64]),
        };
        return Ok(Inferred::one(Some(DType::F32), Some(Shape::scalar())).with_value(Some(value)));
    }
    if let Some(v) = attrs.floats("value_floats") {
        let value = ConstValue {
            dtype: DType::F32,
            dims: vec![v.len()],
            values: Values::Float(v.iter().map(|&f| f as f64).collect()),
        };
        return Ok(Inferred::one(Some(DType::F32), Some(Shape::from_slice(&[v.len()])))
            .with_value(Some(value)));
    }
    if attrs.has("value_string") {
        return Ok(Inferred::one(Some(DType::String), Some(Shape::scalar())));
    }
    if let Some(strings) = ctx.node.attribute.iter().find(|a| a.name == "value_strings") {
        let n = strings.strings.len();
        return Ok(Inferred::one(Some(DType::String), Some(Shape::from_slice(&[n]))));
    }
    if attrs.has("sparse_value") {
        return Ok(Inferred::one(None, None));
    }
    Err(ctx.error("Constant has no value attribute"))
}

pub(crate) fn constant_of_shape(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let fill = ctx.attrs.tensor("value");
    let dtype = match fill {
        Some(t) => Some(
            DType::from_onnx(t.data_type)
                .ok_or_else(|| ctx.error(format!("unsupported fill type {}", t.data_type)))?,
        ),
        None => Some(DType::F32),
    };
    let Some(dims) = ctx.int_values(0) else {
        let rank = match ctx.shape(0).map(Shape::dims) {
            Some([Dim::Known(n)]) => Some(*n),
            _ => None,
        };
        return Ok(Inferred::one(dtype, rank.map(Shape::unknown)));
    };
    let shape = shape_from_ints(dims).ok_or_else(|| ctx.error("negative dimension in shape"))?;

    // Integer fills of shape-sized tensors feed later shape arithmetic.
    let value = fill
        .and_then(ConstValue::from_tensor)
        .zip(shape.numel())
        .and_then(|(fill, n)| match (fill.as_ints(), shape.to_known()) {
            (Some(&[v]), Some(dims)) if n <= 64 => Some(ConstValue::ints(dims, vec![v; n])),
            _ => None,
        });
    Ok(Inferred::one(dtype, Some(shape)).with_value(value))
}

pub(crate) fn eye_like(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = match ctx.attrs.int("dtype") {
        Some(d) => DType::from_onnx(d as i32),
        None => ctx.dtype(0),
    };
    if let Some(x) = ctx.shape(0) {
        if x.rank() != 2 {
            return Err(ctx.error(format!("EyeLike expects a 2-D input, got {x}")));
        }
    }
    Ok(Inferred::one(dtype, ctx.shape(0).cloned()))
}

/// Element count is `max(ceil((limit - start) / delta), 0)`.
pub(crate) fn range(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    ctx.check_same_dtype(&[0, 1, 2])?;
    let dtype = ctx.dtype(0);
    let scalar = |i: usize| ctx.value(i).filter(|v| v.len() == 1);
    let (Some(start), Some(limit), Some(delta)) = (scalar(0), scalar(1), scalar(2)) else {
        return Ok(Inferred::one(dtype, Some(Shape::unknown(1))));
    };

    if let (Some(&[s]), Some(&[l]), Some(&[d])) = (start.as_ints(), limit.as_ints(), delta.as_ints()) {
        if d == 0 {
            return Err(ctx.error("Range delta cannot be 0"));
        }
        let (span, step) = (i128::from(l) - i128::from(s), i128::from(d));
        let count = if step > 0 {
            (span + step - 1) / step
        } else {
            (span + step + 1) / step
        };
        let Ok(n) = usize::try_from(count.max(0)) else {
            return Ok(Inferred::one(dtype, Some(Shape::unknown(1))));
        };
        let value = (n <= 4096)
            .then(|| {
                (0..n as i128)
                    .map(|k| i64::try_from(i128::from(s) + k * step).ok())
                    .collect::<Option<Vec<_>>>()
            })
            .flatten()
            .map(|values| ConstValue {
                dtype: dtype.unwrap_or(DType::I64),
                dims: vec![n],
                values: Values::Int(values),
            });
        return Ok(Inferred::one(dtype, Some(Shape::from_slice(&[n]))).with_value(value));
    }

    let (s, l, d) = (start.as_floats()[0], limit.as_floats()[0], delta.as_floats()[0]);
    if d == 0.0 {
        return Err(ctx.error("Range delta cannot be 0"));
    }
    let n = ((l - s) / d).ceil().max(0.0);
    let dim = if n.is_finite() && n < usize::MAX as f64 {
        Dim::Known(n as usize)
    } else {
        Dim::Unknown
    };
    Ok(Inferred::one(dtype, Some(Shape::from_dims([dim]))))
}

/// Indices of non-zero elements: `[rank(X), nnz]`, nnz data dependent.
pub(crate) fn non_zero(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let shape = ctx
        .shape(0)
        .map(|x| Shape::from_dims([Dim::Known(x.rank()), Dim::Unknown]));
    Ok(Inferred::one(Some(DType::I64), shape))
}

pub(crate) fn top_k(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let shape = match ctx.shape(0) {
        Some(x) => {
            let axis = ctx.axis(ctx.attrs.int_or("axis", -1), x.rank())?;
            let k = match ctx.int_values(1) {
                Some(&[k]) => Some(k),
                _ if !ctx.has_input(1) => ctx.attrs.int("k"),
                _ => None,
            };
            let mut dims = x.dims().to_vec();
            dims[axis] = match (k, &dims[axis]) {
                (Some(k), Dim::Known(n)) if k < 0 || k as usize > *n => {
                    return Err(ctx.error(format!("k = {k} exceeds axis length {n}")));
                }
                (Some(k), _) => Dim::Known(k as usize),
                (None, _) => Dim::Unknown,
            };
            Some(Shape::from_dims(dims))
        }
        None => None,
    };
    Ok(Inferred::many(vec![
        TensorInfo::new(dtype, shape.clone()),
        TensorInfo::new(Some(DType::I64), shape),
    ]))
}

/// Inserts a `depth` axis at `axis` into the indices' shape.
pub(crate) fn one_hot(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(2);
    let Some(indices) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    let out_rank = indices.rank() + 1;
    let axis = ctx.axis(ctx.attrs.int_or("axis", -1), out_rank)?;
    let depth = ctx
        .value(1)
        .filter(|v| v.len() == 1)
        .and_then(|v| v.as_floats().first().copied())
        .map(|d| Dim::Known(d.max(0.0) as usize))
        .unwrap_or(Dim::Unknown);
    let mut dims = indices.dims().to_vec();
    dims.insert(axis, depth);
    Ok(Inferred::one(dtype, Some(Shape::from_dims(dims))))
}
