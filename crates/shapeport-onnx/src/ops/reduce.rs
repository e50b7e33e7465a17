use shapeport_core::{DType, Dim, Result, Shape};

use super::{Inferred, NodeCtx};

fn reduced(x: &Shape, axes: &[usize], keepdims: bool) -> Shape {
    Shape::from_dims(x.dims().iter().enumerate().filter_map(|(i, d)| {
        if !axes.contains(&i) {
            Some(d.clone())
        } else if keepdims {
            Some(Dim::Known(1))
        } else {
            None
        }
    }))
}

/// Reduce* family. Axes come from the attribute (older opsets) or input 1;
/// no axes means all of them unless `noop_with_empty_axes` is set.
pub(crate) fn reduce(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let keepdims = ctx.attrs.int_or("keepdims", 1) != 0;
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    let axes: Vec<usize> = match ctx.ints_from("axes", 1) {
        Some(axes) if !axes.is_empty() => axes
            .iter()
            .map(|&a| ctx.axis(a, x.rank()))
            .collect::<Result<_>>()?,
        None if ctx.has_input(1) => {
            let shape = keepdims.then(|| Shape::unknown(x.rank()));
            return Ok(Inferred::one(dtype, shape));
        }
        _ if ctx.attrs.int_or("noop_with_empty_axes", 0) != 0 => {
            return Ok(Inferred::one(dtype, Some(x.clone())));
        }
        _ => (0..x.rank()).collect(),
    };
    Ok(Inferred::one(dtype, Some(reduced(x, &axes, keepdims))))
}

pub(crate) fn arg_reduce(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let keepdims = ctx.attrs.int_or("keepdims", 1) != 0;
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(Some(DType::I64), None));
    };
    let axis = ctx.axis(ctx.attrs.int_or("axis", 0), x.rank())?;
    Ok(Inferred::one(Some(DType::I64), Some(reduced(x, &[axis], keepdims))))
}
