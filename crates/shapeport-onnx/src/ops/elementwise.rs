use shapeport_core::{DType, Dim, Result, Shape};

use super::{Inferred, NodeCtx};
use crate::convert::TensorInfo;
use crate::values::{ConstValue, Values};

pub(crate) fn unary(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    Ok(Inferred::one(ctx.dtype(0), ctx.shape(0).cloned()))
}

pub(crate) fn identity(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    Ok(unary(ctx)?.with_value(ctx.value(0).cloned()))
}

pub(crate) fn dropout(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let shape = ctx.shape(0).cloned();
    let mut outputs = vec![TensorInfo::new(ctx.dtype(0), shape.clone())];
    if ctx.output_count() > 1 {
        outputs.push(TensorInfo::new(Some(DType::Bool), shape));
    }
    Ok(Inferred::many(outputs))
}

/// Y keeps X's shape; training-mode running statistics have the shape of
/// the per-channel scale input.
pub(crate) fn batch_norm(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let mut outputs = vec![TensorInfo::new(ctx.dtype(0), ctx.shape(0).cloned())];
    for _ in 1..ctx.output_count() {
        outputs.push(TensorInfo::new(ctx.dtype(1), ctx.shape(1).cloned()));
    }
    Ok(Inferred::many(outputs))
}

/// Mean and InvStdDev outputs keep X's leading axes and collapse the
/// normalized ones to 1.
pub(crate) fn layer_norm(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let x = ctx.shape(0).cloned();
    let mut outputs = vec![TensorInfo::new(ctx.dtype(0), x.clone())];
    if ctx.output_count() > 1 {
        let stat_shape = match &x {
            Some(x) => {
                let axis = ctx.axis(ctx.attrs.int_or("axis", -1), x.rank())?;
                Some(Shape::from_dims(
                    x.dims()
                        .iter()
                        .enumerate()
                        .map(|(i, d)| if i < axis { d.clone() } else { Dim::Known(1) }),
                ))
            }
            None => None,
        };
        let stash = DType::from_onnx(ctx.attrs.int_or("stash_type", 1) as i32);
        for _ in 1..ctx.output_count() {
            outputs.push(TensorInfo::new(stash, stat_shape.clone()));
        }
    }
    Ok(Inferred::many(outputs))
}

fn broadcast_inputs(ctx: &NodeCtx<'_>, inputs: impl IntoIterator<Item = usize>) -> Result<Option<Shape>> {
    let mut out: Option<Shape> = None;
    for i in inputs {
        let Some(shape) = ctx.shape(i) else {
            return Ok(None);
        };
        out = Some(match out {
            Some(acc) => acc
                .broadcast(shape)
                .map_err(|e| ctx.error(e.to_string()))?,
            None => shape.clone(),
        });
    }
    Ok(out)
}

/// Add, Sub, Mul, Div. Integer operands known at inference time are
/// folded so shape arithmetic (e.g. `Shape -> Mul -> Reshape`) resolves.
pub(crate) fn arithmetic(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    ctx.check_same_dtype(&[0, 1])?;
    let shape = broadcast_inputs(ctx, 0..2)?;
    let folded = match (ctx.value(0), ctx.value(1)) {
        (Some(a), Some(b)) => fold_ints(&ctx.node.op_type, a, b),
        _ => None,
    };
    Ok(Inferred::one(ctx.dtype(0).or(ctx.dtype(1)), shape).with_value(folded))
}

fn fold_ints(op: &str, a: &ConstValue, b: &ConstValue) -> Option<ConstValue> {
    let (xs, ys) = (a.as_ints()?, b.as_ints()?);
    let (dims, n) = if xs.len() >= ys.len() {
        (a.dims.clone(), xs.len())
    } else {
        (b.dims.clone(), ys.len())
    };
    if !(xs.len() == ys.len() || xs.len() == 1 || ys.len() == 1) {
        return None;
    }
    let at = |v: &[i64], i: usize| if v.len() == 1 { v[0] } else { v[i] };
    let out = (0..n)
        .map(|i| {
            let (x, y) = (at(xs, i), at(ys, i));
            match op {
                "Add" => x.checked_add(y),
                "Sub" => x.checked_sub(y),
                "Mul" => x.checked_mul(y),
                "Div" => x.checked_div(y),
                _ => None,
            }
        })
        .collect::<Option<Vec<_>>>()?;
    Some(ConstValue {
        dtype: a.dtype,
        dims,
        values: Values::Int(out),
    })
}

/// Exponent may have a different element type than the base.
pub(crate) fn pow(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let shape = broadcast_inputs(ctx, 0..2)?;
    Ok(Inferred::one(ctx.dtype(0), shape))
}

pub(crate) fn variadic(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let inputs: Vec<usize> = (0..ctx.input_count()).filter(|&i| ctx.has_input(i)).collect();
    ctx.check_same_dtype(&inputs)?;
    let shape = broadcast_inputs(ctx, inputs.iter().copied())?;
    let dtype = inputs.iter().find_map(|&i| ctx.dtype(i));
    Ok(Inferred::one(dtype, shape))
}

pub(crate) fn comparison(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    ctx.check_same_dtype(&[0, 1])?;
    let shape = broadcast_inputs(ctx, 0..2)?;
    Ok(Inferred::one(Some(DType::Bool), shape))
}

pub(crate) fn where_(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    ctx.check_same_dtype(&[1, 2])?;
    let shape = broadcast_inputs(ctx, 0..3)?;
    Ok(Inferred::one(ctx.dtype(1).or(ctx.dtype(2)), shape))
}

pub(crate) fn cast(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let to = ctx
        .attrs
        .int("to")
        .ok_or_else(|| ctx.error("missing required attribute 'to'"))?;
    let dtype = DType::from_onnx(to as i32)
        .ok_or_else(|| ctx.error(format!("unsupported target element type {to}")))?;
    Ok(Inferred::one(Some(dtype), ctx.shape(0).cloned()).with_value(cast_value(ctx.value(0), dtype)))
}

pub(crate) fn cast_like(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(1);
    let value = dtype.and_then(|d| cast_value(ctx.value(0), d));
    Ok(Inferred::one(dtype, ctx.shape(0).cloned()).with_value(value))
}

fn cast_value(value: Option<&ConstValue>, to: DType) -> Option<ConstValue> {
    let value = value?;
    let values = if to.is_integer() {
        Values::Int(match &value.values {
            Values::Int(v) => v.clone(),
            Values::Float(v) => v.iter().map(|&x| x as i64).collect(),
        })
    } else if matches!(to, DType::F32 | DType::F64) {
        Values::Float(value.as_floats())
    } else {
        return None;
    };
    Some(ConstValue {
        dtype: to,
        dims: value.dims.clone(),
        values,
    })
}
