use shapeport_core::{normalize_axis, Dim, Result, Shape};

use super::{shape_from_ints, Inferred, NodeCtx};
use crate::convert::TensorInfo;
use crate::values::{ConstValue, Values};

/// Rank promised by a 1-D shape-like input whose length is known even
/// when its contents are not.
fn rank_of_shape_input(ctx: &NodeCtx<'_>, i: usize) -> Option<usize> {
    match ctx.shape(i)?.dims() {
        [Dim::Known(n)] => Some(*n),
        _ => None,
    }
}

fn product(dims: &[Dim]) -> Option<usize> {
    dims.iter()
        .try_fold(1usize, |acc, d| d.known().and_then(|d| acc.checked_mul(d)))
}

/// Moves a constant's payload under a new shape.
fn reshaped_value(value: Option<&ConstValue>, dims: &Shape) -> Option<ConstValue> {
    let value = value?;
    let dims = dims.to_known()?;
    let numel = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))?;
    (numel == value.len()).then(|| ConstValue {
        dims,
        ..value.clone()
    })
}

pub(crate) fn reshape(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(target) = ctx.ints_from("shape", 1) else {
        let shape = rank_of_shape_input(ctx, 1).map(Shape::unknown);
        return Ok(Inferred::one(dtype, shape));
    };
    let allow_zero = ctx.attrs.int_or("allowzero", 0) != 0;
    let input = ctx.shape(0);

    if target.iter().filter(|&&d| d == -1).count() > 1 {
        return Err(ctx.error("at most one target dimension may be -1"));
    }

    let mut out: Vec<Dim> = Vec::with_capacity(target.len());
    let mut infer_at = None;
    for (i, &d) in target.iter().enumerate() {
        out.push(match d {
            -1 => {
                infer_at = Some(i);
                Dim::Unknown
            }
            0 if !allow_zero => match input.and_then(|s| s.dims().get(i)) {
                Some(d) => d.clone(),
                None if input.is_some() => {
                    return Err(ctx.error(format!("target dim {i} copies a missing input axis")));
                }
                None => Dim::Unknown,
            },
            d if d >= 0 => Dim::Known(d as usize),
            d => return Err(ctx.error(format!("invalid target dimension {d}"))),
        });
    }

    if let Some(at) = infer_at {
        let total = input.and_then(Shape::numel);
        let rest = product(&out[..at])
            .zip(product(&out[at + 1..]))
            .and_then(|(a, b)| a.checked_mul(b));
        if let (Some(total), Some(rest)) = (total, rest) {
            if rest == 0 || total % rest != 0 {
                return Err(ctx.error(format!(
                    "cannot reshape {} elements into {target:?}",
                    total
                )));
            }
            out[at] = Dim::Known(total / rest);
        }
    }

    let shape = Shape::from_dims(out);
    if let (Some(total), Some(n)) = (input.and_then(Shape::numel), shape.numel()) {
        if total != n {
            return Err(ctx.error(format!(
                "cannot reshape {} elements into {shape}",
                total
            )));
        }
    }
    let value = reshaped_value(ctx.value(0), &shape);
    Ok(Inferred::one(dtype, Some(shape)).with_value(value))
}

pub(crate) fn flatten(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, Some(Shape::unknown(2))));
    };
    let rank = x.rank() as i64;
    let axis = ctx.attrs.int_or("axis", 1);
    if axis < -rank || axis > rank {
        return Err(ctx.error(format!("axis {axis} is out of range for rank {rank}")));
    }
    let axis = if axis < 0 { axis + rank } else { axis } as usize;
    let to_dim = |dims: &[Dim]| product(dims).map(Dim::Known).unwrap_or(Dim::Unknown);
    let shape = Shape::from_dims([to_dim(&x.dims()[..axis]), to_dim(&x.dims()[axis..])]);
    Ok(Inferred::one(dtype, Some(shape)))
}

pub(crate) fn transpose(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    let perm: Vec<usize> = match ctx.attrs.ints("perm") {
        Some(p) => p
            .iter()
            .map(|&a| ctx.axis(a, x.rank()))
            .collect::<Result<_>>()?,
        None => (0..x.rank()).rev().collect(),
    };
    let mut seen = vec![false; x.rank()];
    if perm.len() != x.rank() || perm.iter().any(|&a| std::mem::replace(&mut seen[a], true)) {
        return Err(ctx.error(format!("perm {perm:?} is not a permutation of rank {}", x.rank())));
    }
    let shape = Shape::from_dims(perm.iter().map(|&a| x.dims()[a].clone()));
    Ok(Inferred::one(dtype, Some(shape)))
}

pub(crate) fn squeeze(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    let axes = match ctx.ints_from("axes", 1) {
        Some(axes) => axes
            .iter()
            .map(|&a| ctx.axis(a, x.rank()))
            .collect::<Result<Vec<_>>>()?,
        None if ctx.has_input(1) => {
            return Ok(Inferred::one(dtype, None));
        }
        None => {
            if x.dims().iter().any(|d| d.known().is_none()) {
                return Ok(Inferred::one(dtype, None));
            }
            x.dims()
                .iter()
                .enumerate()
                .filter(|(_, d)| **d == Dim::Known(1))
                .map(|(i, _)| i)
                .collect()
        }
    };
    for &a in &axes {
        if let Dim::Known(d) = x.dims()[a] {
            if d != 1 {
                return Err(ctx.error(format!("cannot squeeze axis {a} of size {d}")));
            }
        }
    }
    let shape = Shape::from_dims(
        x.dims()
            .iter()
            .enumerate()
            .filter(|(i, _)| !axes.contains(i))
            .map(|(_, d)| d.clone()),
    );
    let value = reshaped_value(ctx.value(0), &shape);
    Ok(Inferred::one(dtype, Some(shape)).with_value(value))
}

pub(crate) fn unsqueeze(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let (Some(x), Some(axes)) = (ctx.shape(0), ctx.ints_from("axes", 1)) else {
        return Ok(Inferred::one(dtype, None));
    };
    let out_rank = x.rank() + axes.len();
    let mut axes = axes
        .iter()
        .map(|&a| ctx.axis(a, out_rank))
        .collect::<Result<Vec<_>>>()?;
    axes.sort_unstable();
    if axes.windows(2).any(|w| w[0] == w[1]) {
        return Err(ctx.error("axes must not repeat"));
    }
    let mut rest = x.dims().iter();
    let shape = Shape::from_dims((0..out_rank).map(|i| {
        if axes.binary_search(&i).is_ok() {
            Dim::Known(1)
        } else {
            rest.next().cloned().unwrap_or(Dim::Unknown)
        }
    }));
    let value = reshaped_value(ctx.value(0), &shape);
    Ok(Inferred::one(dtype, Some(shape)).with_value(value))
}

pub(crate) fn concat(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let inputs: Vec<usize> = (0..ctx.input_count()).filter(|&i| ctx.has_input(i)).collect();
    ctx.check_same_dtype(&inputs)?;
    let dtype = inputs.iter().find_map(|&i| ctx.dtype(i));
    let axis = ctx
        .attrs
        .int("axis")
        .ok_or_else(|| ctx.error("missing required attribute 'axis'"))?;

    let shapes: Option<Vec<&Shape>> = inputs.iter().map(|&i| ctx.shape(i)).collect();
    let Some(shapes) = shapes.filter(|s| !s.is_empty()) else {
        let rank = inputs.iter().find_map(|&i| ctx.shape(i)).map(Shape::rank);
        return Ok(Inferred::one(dtype, rank.map(Shape::unknown)));
    };
    let rank = shapes[0].rank();
    if shapes.iter().any(|s| s.rank() != rank) {
        return Err(ctx.error("all inputs must have the same rank"));
    }
    let axis = ctx.axis(axis, rank)?;

    let mut out: Vec<Dim> = shapes[0].dims().to_vec();
    let mut total = Some(0usize);
    for shape in &shapes {
        for (i, d) in shape.dims().iter().enumerate() {
            if i == axis {
                total = total.zip(d.known()).and_then(|(a, b)| a.checked_add(b));
            } else {
                out[i] = out[i].merge(d).ok_or_else(|| {
                    ctx.error(format!("inputs disagree on axis {i}: {} vs {d}", out[i]))
                })?;
            }
        }
    }
    out[axis] = total.map(Dim::Known).unwrap_or(Dim::Unknown);

    let values: Option<Vec<i64>> = if rank == 1 {
        inputs
            .iter()
            .map(|&i| ctx.int_values(i).map(<[i64]>::to_vec))
            .collect::<Option<Vec<_>>>()
            .map(|v| v.concat())
    } else {
        None
    };
    Ok(Inferred::one(dtype, Some(Shape::from_dims(out))).with_value(values.map(ConstValue::vector)))
}

pub(crate) fn split(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let n = ctx.output_count();
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::many(vec![TensorInfo::new(dtype, None); n]));
    };
    let axis = ctx.axis(ctx.attrs.int_or("axis", 0), x.rank())?;

    let sizes: Option<Vec<usize>> = match ctx.ints_from("split", 1) {
        Some(split) => {
            if split.len() != n || split.iter().any(|&s| s < 0) {
                return Err(ctx.error(format!("split {split:?} does not match {n} outputs")));
            }
            let sizes: Vec<usize> = split.iter().map(|&s| s as usize).collect();
            if let Dim::Known(len) = x.dims()[axis] {
                let total = sizes.iter().try_fold(0usize, |acc, &s| acc.checked_add(s));
                if total != Some(len) {
                    return Err(ctx.error(format!("split {split:?} does not sum to {len}")));
                }
            }
            Some(sizes)
        }
        None if ctx.has_input(1) => None,
        None => match x.dims()[axis] {
            Dim::Known(len) => {
                let chunk = len.div_ceil(n.max(1));
                Some(
                    (0..n)
                        .map(|i| chunk.min(len.saturating_sub(i.saturating_mul(chunk))))
                        .collect(),
                )
            }
            _ => None,
        },
    };

    let outputs = (0..n)
        .map(|i| {
            let mut dims = x.dims().to_vec();
            dims[axis] = sizes
                .as_ref()
                .map(|s| Dim::Known(s[i]))
                .unwrap_or(Dim::Unknown);
            TensorInfo::new(dtype, Some(Shape::from_dims(dims)))
        })
        .collect();
    Ok(Inferred::many(outputs))
}

/// Clamped `[start, end)` length along one axis, ONNX slice semantics.
/// Computed in i128 so extreme bounds and steps cannot overflow.
fn slice_len(dim: usize, start: i64, end: i64, step: i64) -> usize {
    let Some((first, end)) = slice_bounds(dim, start, end, step) else {
        return 0;
    };
    let step = i128::from(step);
    let len = if step > 0 {
        (end - first + step - 1) / step
    } else {
        (first - end - step - 1) / -step
    };
    usize::try_from(len.max(0)).unwrap_or(0)
}

/// First index visited and the clamped exclusive end, or `None` for an
/// empty axis.
fn slice_bounds(dim: usize, start: i64, end: i64, step: i64) -> Option<(i128, i128)> {
    if dim == 0 {
        return None;
    }
    let dim = dim as i128;
    let wrap = |v: i64| {
        let v = i128::from(v);
        if v < 0 {
            v + dim
        } else {
            v
        }
    };
    Some(if step > 0 {
        (wrap(start).clamp(0, dim), wrap(end).clamp(0, dim))
    } else {
        (wrap(start).clamp(0, dim - 1), wrap(end).clamp(-1, dim - 1))
    })
}

pub(crate) fn slice(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    let (Some(starts), Some(ends)) = (ctx.ints_from("starts", 1), ctx.ints_from("ends", 2))
    else {
        return Ok(Inferred::one(dtype, Some(Shape::unknown(x.rank()))));
    };
    if starts.len() != ends.len() {
        return Err(ctx.error("starts and ends must have the same length"));
    }
    let axes = match ctx.ints_from("axes", 3) {
        Some(axes) => axes,
        None if ctx.has_input(3) => {
            return Ok(Inferred::one(dtype, Some(Shape::unknown(x.rank()))));
        }
        None => (0..starts.len() as i64).collect(),
    };
    let steps = match ctx.ints_from("steps", 4) {
        Some(steps) => steps,
        None if ctx.has_input(4) => {
            return Ok(Inferred::one(dtype, Some(Shape::unknown(x.rank()))));
        }
        None => vec![1; starts.len()],
    };
    if axes.len() != starts.len() || steps.len() != starts.len() {
        return Err(ctx.error("axes and steps must match starts in length"));
    }

    let mut dims = x.dims().to_vec();
    let mut ranges = Vec::with_capacity(axes.len());
    for (k, &axis) in axes.iter().enumerate() {
        let axis = ctx.axis(axis, x.rank())?;
        if steps[k] == 0 {
            return Err(ctx.error("slice step cannot be 0"));
        }
        dims[axis] = match dims[axis] {
            Dim::Known(len) => Dim::Known(slice_len(len, starts[k], ends[k], steps[k])),
            _ => Dim::Unknown,
        };
        ranges.push((axis, starts[k], ends[k], steps[k]));
    }

    let value = match (ctx.int_values(0), x.rank()) {
        (Some(data), 1) => slice_values(data, &ranges).map(ConstValue::vector),
        _ => None,
    };
    Ok(Inferred::one(dtype, Some(Shape::from_dims(dims))).with_value(value))
}

fn slice_values(data: &[i64], ranges: &[(usize, i64, i64, i64)]) -> Option<Vec<i64>> {
    let &[(0, start, end, step)] = ranges else {
        return None;
    };
    let count = slice_len(data.len(), start, end, step);
    let Some((first, _)) = slice_bounds(data.len(), start, end, step) else {
        return Some(Vec::new());
    };
    (0..count as i128)
        .map(|k| {
            let at = usize::try_from(first + k * i128::from(step)).ok()?;
            data.get(at).copied()
        })
        .collect()
}

pub(crate) fn gather(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let (Some(data), Some(indices)) = (ctx.shape(0), ctx.shape(1)) else {
        return Ok(Inferred::one(dtype, None));
    };
    if data.rank() == 0 {
        return Err(ctx.error("cannot gather from a scalar"));
    }
    let axis = ctx.axis(ctx.attrs.int_or("axis", 0), data.rank())?;
    let dims = data.dims()[..axis]
        .iter()
        .chain(indices.dims())
        .chain(&data.dims()[axis + 1..])
        .cloned();
    let shape = Shape::from_dims(dims);

    let value = match (ctx.value(0), ctx.value(1), data.rank()) {
        (Some(source), Some(idx), 1) => {
            source
                .as_ints()
                .zip(idx.as_ints())
                .and_then(|(values, picks)| {
                    let picked = picks
                        .iter()
                        .map(|&i| normalize_axis(i, values.len()).map(|i| values[i]))
                        .collect::<Option<Vec<_>>>()?;
                    Some(ConstValue {
                        dtype: source.dtype,
                        dims: idx.dims.clone(),
                        values: Values::Int(picked),
                    })
                })
        }
        _ => None,
    };
    Ok(Inferred::one(dtype, Some(shape)).with_value(value))
}

pub(crate) fn expand(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(target) = ctx.int_values(1).and_then(shape_from_ints) else {
        let rank = rank_of_shape_input(ctx, 1)
            .zip(ctx.shape(0).map(Shape::rank))
            .map(|(a, b)| a.max(b));
        return Ok(Inferred::one(dtype, rank.map(Shape::unknown)));
    };
    let shape = match ctx.shape(0) {
        Some(x) => x.broadcast(&target).map_err(|e| ctx.error(e.to_string()))?,
        None => return Ok(Inferred::one(dtype, None)),
    };
    Ok(Inferred::one(dtype, Some(shape)))
}

pub(crate) fn tile(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    let Some(repeats) = ctx.int_values(1) else {
        return Ok(Inferred::one(dtype, Some(Shape::unknown(x.rank()))));
    };
    if repeats.len() != x.rank() || repeats.iter().any(|&r| r < 0) {
        return Err(ctx.error(format!("repeats {repeats:?} do not match rank {}", x.rank())));
    }
    let shape = Shape::from_dims(x.dims().iter().zip(repeats).map(|(d, &r)| match d {
        Dim::Known(n) => usize::try_from(r)
            .ok()
            .and_then(|r| n.checked_mul(r))
            .map(Dim::Known)
            .unwrap_or(Dim::Unknown),
        _ if r == 1 => d.clone(),
        _ => Dim::Unknown,
    }));
    Ok(Inferred::one(dtype, Some(shape)))
}

pub(crate) fn pad(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    let rank = x.rank();
    let Some(pads) = ctx.ints_from("pads", 1) else {
        return Ok(Inferred::one(dtype, Some(Shape::unknown(rank))));
    };
    let axes: Vec<usize> = match ctx.int_values(3) {
        Some(axes) => axes
            .iter()
            .map(|&a| ctx.axis(a, rank))
            .collect::<Result<_>>()?,
        None if ctx.has_input(3) => {
            return Ok(Inferred::one(dtype, Some(Shape::unknown(rank))));
        }
        None => (0..rank).collect(),
    };
    let n = axes.len();
    if pads.len() != 2 * n {
        return Err(ctx.error(format!("expected {} pad values, got {}", 2 * n, pads.len())));
    }

    let mut dims = x.dims().to_vec();
    for (k, &axis) in axes.iter().enumerate() {
        let extra = i128::from(pads[k]) + i128::from(pads[k + n]);
        dims[axis] = match dims[axis] {
            Dim::Known(len) => {
                let padded = len as i128 + extra;
                if padded < 0 {
                    return Err(ctx.error(format!("padding removes more than axis {axis} holds")));
                }
                usize::try_from(padded).map(Dim::Known).unwrap_or(Dim::Unknown)
            }
            ref d if extra == 0 => d.clone(),
            _ => Dim::Unknown,
        };
    }
    Ok(Inferred::one(dtype, Some(Shape::from_dims(dims))))
}

/// Resize (sizes or scales input) and the older Upsample (scales input or
/// attribute). Since opset 18 `axes` limits sizes and scales to a subset
/// of the input axes.
pub(crate) fn resize(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    let rank = x.rank();
    let axes: Vec<usize> = match ctx.attrs.ints("axes") {
        Some(axes) => axes
            .iter()
            .map(|&a| ctx.axis(a, rank))
            .collect::<Result<_>>()?,
        None => (0..rank).collect(),
    };

    let (scales_at, sizes_at) = match (ctx.node.op_type.as_str(), ctx.input_count()) {
        ("Resize", 2) => (1, None), // opset 10: X, scales
        ("Resize", _) => (2, Some(3)),
        _ => (1, None),
    };

    let mut dims = x.dims().to_vec();
    if let Some(sizes) = sizes_at.and_then(|i| ctx.int_values(i)) {
        if sizes.len() != axes.len() {
            return Err(ctx.error(format!(
                "sizes {sizes:?} do not match {} resized axes",
                axes.len()
            )));
        }
        let sizes = shape_from_ints(sizes).ok_or_else(|| ctx.error("negative size"))?;
        let stretch = ctx.attrs.string("keep_aspect_ratio_policy").unwrap_or("stretch") == "stretch";
        for (&axis, size) in axes.iter().zip(sizes.dims()) {
            dims[axis] = if stretch { size.clone() } else { Dim::Unknown };
        }
        return Ok(Inferred::one(dtype, Some(Shape::from_dims(dims))));
    }

    let scales: Option<Vec<f64>> = match ctx.value(scales_at) {
        Some(v) if v.len() > 0 => Some(v.as_floats()),
        _ => ctx
            .attrs
            .floats("scales")
            .map(|s| s.iter().map(|&f| f as f64).collect()),
    };
    let Some(scales) = scales else {
        return Ok(Inferred::one(dtype, Some(Shape::unknown(rank))));
    };
    if scales.len() != axes.len() {
        return Err(ctx.error(format!(
            "scales {scales:?} do not match {} resized axes",
            axes.len()
        )));
    }
    for (&axis, &s) in axes.iter().zip(&scales) {
        dims[axis] = match &dims[axis] {
            Dim::Known(n) => Dim::Known((*n as f64 * s).floor().max(0.0) as usize),
            d if s == 1.0 => d.clone(),
            _ => Dim::Unknown,
        };
    }
    Ok(Inferred::one(dtype, Some(Shape::from_dims(dims))))
}

/// Block edge and block area.
fn blocksize(ctx: &NodeCtx<'_>) -> Result<(usize, usize)> {
    ctx.attrs
        .int("blocksize")
        .filter(|&b| b > 0)
        .and_then(|b| usize::try_from(b).ok())
        .and_then(|b| Some((b, b.checked_mul(b)?)))
        .ok_or_else(|| ctx.error("blocksize must be a positive integer"))
}

fn nchw<'s>(ctx: &NodeCtx<'_>, x: &'s Shape) -> Result<&'s [Dim]> {
    if x.rank() != 4 {
        return Err(ctx.error(format!("expected a 4-D input, got {x}")));
    }
    Ok(x.dims())
}

pub(crate) fn depth_to_space(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let (b, area) = blocksize(ctx)?;
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, Some(Shape::unknown(4))));
    };
    let d = nchw(ctx, x)?;
    let channels = match d[1] {
        Dim::Known(c) if c % area == 0 => Dim::Known(c / area),
        Dim::Known(c) => {
            return Err(ctx.error(format!("{c} channels are not divisible by blocksize^2")));
        }
        _ => Dim::Unknown,
    };
    let scale = |dim: &Dim| {
        dim.known()
            .and_then(|v| v.checked_mul(b))
            .map(Dim::Known)
            .unwrap_or(Dim::Unknown)
    };
    let shape = Shape::from_dims([d[0].clone(), channels, scale(&d[2]), scale(&d[3])]);
    Ok(Inferred::one(dtype, Some(shape)))
}

pub(crate) fn space_to_depth(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let (b, area) = blocksize(ctx)?;
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, Some(Shape::unknown(4))));
    };
    let d = nchw(ctx, x)?;
    let shrink = |dim: &Dim| -> Result<Dim> {
        match dim {
            Dim::Known(v) if v % b == 0 => Ok(Dim::Known(v / b)),
            Dim::Known(v) => Err(ctx.error(format!("spatial size {v} is not divisible by {b}"))),
            _ => Ok(Dim::Unknown),
        }
    };
    let channels = d[1]
        .known()
        .and_then(|c| c.checked_mul(area))
        .map(Dim::Known)
        .unwrap_or(Dim::Unknown);
    let shape = Shape::from_dims([d[0].clone(), channels, shrink(&d[2])?, shrink(&d[3])?]);
    Ok(Inferred::one(dtype, Some(shape)))
}

#[cfg(test)]
mod tests {
    use shapeport_core::{DType, Dim, Shape};

    use super::slice_len;
    use crate::ops::testing::{f32_input, i64_input, int, ints, string, Case};
    use crate::values::{ConstValue, Values};

    #[test]
    fn reshape_copies_and_infers() {
        let case = Case::new("Reshape", 2, 1)
            .input(0, f32_input(&[2, 3, 4]))
            .input(1, i64_input(&[3]))
            .value(1, ConstValue::vector(vec![0, -1, 2]));
        assert_eq!(case.shape(), Some(Shape::from_slice(&[2, 6, 2])));
    }

    #[test]
    fn reshape_rejects_bad_targets() {
        let two_wildcards = Case::new("Reshape", 2, 1)
            .input(0, f32_input(&[2, 3]))
            .value(1, ConstValue::vector(vec![-1, -1]));
        assert!(two_wildcards.run().is_err());

        let wrong_count = Case::new("Reshape", 2, 1)
            .input(0, f32_input(&[2, 3]))
            .value(1, ConstValue::vector(vec![4, 2]));
        assert!(wrong_count.run().is_err());
    }

    #[test]
    fn reshape_with_unknown_target_keeps_rank() {
        let case = Case::new("Reshape", 2, 1)
            .input(0, f32_input(&[2, 3]))
            .input(1, i64_input(&[3]));
        assert_eq!(case.shape(), Some(Shape::unknown(3)));
    }

    #[test]
    fn flatten_splits_at_axis() {
        let case = Case::new("Flatten", 1, 1)
            .attr(int("axis", 1))
            .input(0, f32_input(&[1, 512, 7, 7]));
        assert_eq!(case.shape(), Some(Shape::from_slice(&[1, 25088])));

        let at_zero = Case::new("Flatten", 1, 1)
            .attr(int("axis", 0))
            .input(0, f32_input(&[2, 3]));
        assert_eq!(at_zero.shape(), Some(Shape::from_slice(&[1, 6])));
    }

    #[test]
    fn transpose_defaults_to_reversal() {
        let case = Case::new("Transpose", 1, 1).input(0, f32_input(&[2, 3, 4]));
        assert_eq!(case.shape(), Some(Shape::from_slice(&[4, 3, 2])));

        let perm = Case::new("Transpose", 1, 1)
            .attr(ints("perm", &[0, 2, 3, 1]))
            .input(0, f32_input(&[1, 3, 8, 9]));
        assert_eq!(perm.shape(), Some(Shape::from_slice(&[1, 8, 9, 3])));

        let repeated = Case::new("Transpose", 1, 1)
            .attr(ints("perm", &[0, 0]))
            .input(0, f32_input(&[1, 3]));
        assert!(repeated.run().is_err());
    }

    #[test]
    fn squeeze_and_unsqueeze() {
        let squeeze = Case::new("Squeeze", 1, 1).input(0, f32_input(&[1, 3, 1, 5]));
        assert_eq!(squeeze.shape(), Some(Shape::from_slice(&[3, 5])));

        let bad = Case::new("Squeeze", 1, 1)
            .attr(ints("axes", &[1]))
            .input(0, f32_input(&[1, 3]));
        assert!(bad.run().is_err());

        let unsqueeze = Case::new("Unsqueeze", 2, 1)
            .input(0, f32_input(&[3, 4]))
            .value(1, ConstValue::vector(vec![0, -1]));
        assert_eq!(unsqueeze.shape(), Some(Shape::from_slice(&[1, 3, 4, 1])));
    }

    #[test]
    fn concat_sums_axis() {
        let case = Case::new("Concat", 3, 1)
            .attr(int("axis", 1))
            .input(0, f32_input(&[1, 64, 56, 56]))
            .input(1, f32_input(&[1, 32, 56, 56]))
            .input(2, f32_input(&[1, 32, 56, 56]));
        assert_eq!(case.shape(), Some(Shape::from_slice(&[1, 128, 56, 56])));

        let mismatch = Case::new("Concat", 2, 1)
            .attr(int("axis", 0))
            .input(0, f32_input(&[1, 4]))
            .input(1, f32_input(&[1, 5]));
        assert!(mismatch.run().is_err());
    }

    #[test]
    fn concat_propagates_shape_vectors() {
        let case = Case::new("Concat", 2, 1)
            .attr(int("axis", 0))
            .input(0, i64_input(&[1]))
            .input(1, i64_input(&[1]))
            .value(0, ConstValue::vector(vec![1]))
            .value(1, ConstValue::vector(vec![-1]));
        let out = case.run().unwrap();
        assert_eq!(out.value(0).and_then(ConstValue::as_ints), Some(&[1, -1][..]));
    }

    #[test]
    fn split_even_and_explicit() {
        let even = Case::new("Split", 1, 3)
            .attr(int("axis", 1))
            .input(0, f32_input(&[1, 9]));
        let out = even.run().unwrap();
        for o in &out.outputs {
            assert_eq!(o.shape, Some(Shape::from_slice(&[1, 3])));
        }

        let overflowing = Case::new("Split", 2, 3)
            .input(0, f32_input(&[10]))
            .value(1, ConstValue::vector(vec![i64::MAX, i64::MAX, 12]));
        assert!(overflowing.run().is_err());

        let explicit = Case::new("Split", 2, 2)
            .input(0, f32_input(&[10, 2]))
            .value(1, ConstValue::vector(vec![7, 3]));
        let out = explicit.run().unwrap();
        assert_eq!(out.outputs[1].shape, Some(Shape::from_slice(&[3, 2])));
    }

    #[test]
    fn slice_lengths_follow_clamping() {
        assert_eq!(slice_len(10, 0, 3, 1), 3);
        assert_eq!(slice_len(10, -3, i64::MAX, 1), 3);
        assert_eq!(slice_len(10, 1, 1000, 2), 5);
        assert_eq!(slice_len(10, -1, i64::MIN, -1), 10);
        assert_eq!(slice_len(10, 5, 2, 1), 0);
    }

    #[test]
    fn slice_with_constant_bounds() {
        let case = Case::new("Slice", 4, 1)
            .input(0, f32_input(&[1, 3, 224, 224]))
            .value(1, ConstValue::vector(vec![0]))
            .value(2, ConstValue::vector(vec![112]))
            .value(3, ConstValue::vector(vec![2]));
        assert_eq!(case.shape(), Some(Shape::from_slice(&[1, 3, 112, 224])));
    }

    #[test]
    fn gather_inserts_index_shape() {
        let case = Case::new("Gather", 2, 1)
            .attr(int("axis", 0))
            .input(0, f32_input(&[30522, 768]))
            .input(1, i64_input(&[1, 128]));
        assert_eq!(case.shape(), Some(Shape::from_slice(&[1, 128, 768])));
    }

    #[test]
    fn gather_picks_shape_entries() {
        let case = Case::new("Gather", 2, 1)
            .input(0, i64_input(&[4]))
            .input(1, i64_input(&[]))
            .value(0, ConstValue::vector(vec![1, 3, 224, 224]))
            .value(1, ConstValue::scalar(0));
        let out = case.run().unwrap();
        assert_eq!(out.outputs[0].shape, Some(Shape::scalar()));
        let picked = out.value(0).unwrap();
        assert!(picked.dims.is_empty());
        assert_eq!(picked.as_ints(), Some(&[1][..]));
    }

    #[test]
    fn expand_and_tile() {
        let expand = Case::new("Expand", 2, 1)
            .input(0, f32_input(&[3, 1]))
            .value(1, ConstValue::vector(vec![2, 1, 6]));
        assert_eq!(expand.shape(), Some(Shape::from_slice(&[2, 3, 6])));

        let tile = Case::new("Tile", 2, 1)
            .input(0, f32_input(&[2, 3]))
            .value(1, ConstValue::vector(vec![2, 2]));
        assert_eq!(tile.shape(), Some(Shape::from_slice(&[4, 6])));
    }

    #[test]
    fn pad_grows_axes() {
        let case = Case::new("Pad", 2, 1)
            .input(0, f32_input(&[1, 3, 4, 4]))
            .value(1, ConstValue::vector(vec![0, 0, 1, 2, 0, 0, 1, 2]));
        assert_eq!(case.shape(), Some(Shape::from_slice(&[1, 3, 6, 8])));
    }

    #[test]
    fn resize_by_scales_and_sizes() {
        let scales = Case::new("Resize", 3, 1)
            .input(0, f32_input(&[1, 3, 16, 16]))
            .value(
                2,
                ConstValue {
                    dtype: shapeport_core::DType::F32,
                    dims: vec![4],
                    values: crate::values::Values::Float(vec![1.0, 1.0, 2.0, 2.0]),
                },
            );
        assert_eq!(scales.shape(), Some(Shape::from_slice(&[1, 3, 32, 32])));

        let sizes = Case::new("Resize", 4, 1)
            .input(0, f32_input(&[1, 3, 16, 16]))
            .value(3, ConstValue::vector(vec![1, 3, 20, 24]));
        assert_eq!(sizes.shape(), Some(Shape::from_slice(&[1, 3, 20, 24])));
    }

    #[test]
    fn depth_to_space_round_trip_shapes() {
        let d2s = Case::new("DepthToSpace", 1, 1)
            .attr(int("blocksize", 2))
            .input(0, f32_input(&[1, 12, 5, 5]));
        assert_eq!(d2s.shape(), Some(Shape::from_slice(&[1, 3, 10, 10])));

        let s2d = Case::new("SpaceToDepth", 1, 1)
            .attr(int("blocksize", 2))
            .input(0, f32_input(&[1, 3, 10, 10]));
        assert_eq!(s2d.shape(), Some(Shape::from_slice(&[1, 12, 5, 5])));
    }

    #[test]
    fn unknown_dims_survive_reshape_copy() {
        let case = Case::new("Reshape", 2, 1)
            .input(
                0,
                Some(crate::convert::TensorInfo::new(
                    Some(shapeport_core::DType::F32),
                    Some(Shape::from_dims([Dim::Symbolic("N".into()), Dim::Known(4), Dim::Known(4)])),
                )),
            )
            .value(1, ConstValue::vector(vec![0, 16]));
        assert_eq!(
            case.shape(),
            Some(Shape::from_dims([Dim::Symbolic("N".into()), Dim::Known(16)]))
        );
    }

    #[test]
    fn slice_survives_extreme_steps() {
        assert_eq!(slice_len(10, 0, 10, i64::MAX), 1);
        assert_eq!(slice_len(10, 9, i64::MIN, i64::MIN), 1);
        assert_eq!(slice_len(10, i64::MIN, i64::MAX, 1), 10);
        assert_eq!(slice_len(0, 0, 5, i64::MIN), 0);

        let case = Case::new("Slice", 5, 1)
            .input(0, i64_input(&[4]))
            .value(0, ConstValue::vector(vec![1, 2, 3, 4]))
            .value(1, ConstValue::vector(vec![-1]))
            .value(2, ConstValue::vector(vec![i64::MIN]))
            .value(3, ConstValue::vector(vec![0]))
            .value(4, ConstValue::vector(vec![i64::MIN]));
        let out = case.run().unwrap();
        assert_eq!(out.outputs[0].shape, Some(Shape::from_slice(&[1])));
        assert_eq!(out.value(0).and_then(ConstValue::as_ints), Some(&[4][..]));
    }

    #[test]
    fn oversized_dims_become_unknown() {
        let tile = Case::new("Tile", 2, 1)
            .input(0, f32_input(&[4]))
            .value(1, ConstValue::vector(vec![i64::MAX]));
        assert_eq!(tile.shape(), Some(Shape::unknown(1)));

        let pad = Case::new("Pad", 2, 1)
            .input(0, f32_input(&[4]))
            .value(1, ConstValue::vector(vec![i64::MAX, i64::MAX]));
        assert_eq!(pad.shape(), Some(Shape::unknown(1)));

        let concat = Case::new("Concat", 2, 1)
            .attr(int("axis", 0))
            .input(0, f32_input(&[usize::MAX]))
            .input(1, f32_input(&[1]));
        assert_eq!(concat.shape(), Some(Shape::unknown(1)));

        let reshape = Case::new("Reshape", 2, 1)
            .input(0, f32_input(&[usize::MAX, 2]))
            .value(1, ConstValue::vector(vec![-1, 3]));
        assert_eq!(reshape.shape(), Some(Shape::from_dims([Dim::Unknown, Dim::Known(3)])));

        let huge_block = Case::new("DepthToSpace", 1, 1)
            .attr(int("blocksize", i64::MAX))
            .input(0, f32_input(&[1, 4, 2, 2]));
        assert!(huge_block.run().is_err());
    }

    #[test]
    fn gather_keeps_source_dtype() {
        let case = Case::new("Gather", 2, 1)
            .input(
                0,
                Some(crate::convert::TensorInfo::new(
                    Some(DType::I32),
                    Some(Shape::from_slice(&[3])),
                )),
            )
            .input(1, i64_input(&[1]))
            .value(
                0,
                ConstValue {
                    dtype: DType::I32,
                    dims: vec![3],
                    values: Values::Int(vec![7, 8, 9]),
                },
            )
            .value(1, ConstValue::vector(vec![-1]));
        let out = case.run().unwrap();
        let picked = out.value(0).unwrap();
        assert_eq!(picked.dtype, DType::I32);
        assert_eq!(picked.as_ints(), Some(&[9][..]));
    }

    #[test]
    fn resize_limited_to_axes() {
        let sizes = Case::new("Resize", 4, 1)
            .attr(ints("axes", &[2, 3]))
            .input(0, f32_input(&[1, 3, 16, 16]))
            .value(3, ConstValue::vector(vec![32, 24]));
        assert_eq!(sizes.shape(), Some(Shape::from_slice(&[1, 3, 32, 24])));

        let scales = Case::new("Resize", 3, 1)
            .attr(ints("axes", &[-1]))
            .input(0, f32_input(&[1, 3, 16, 16]))
            .value(
                2,
                ConstValue {
                    dtype: DType::F32,
                    dims: vec![1],
                    values: Values::Float(vec![0.5]),
                },
            );
        assert_eq!(scales.shape(), Some(Shape::from_slice(&[1, 3, 16, 8])));

        let not_stretched = Case::new("Resize", 4, 1)
            .attr(ints("axes", &[2, 3]))
            .attr(string("keep_aspect_ratio_policy", "not_larger"))
            .input(0, f32_input(&[1, 3, 16, 16]))
            .value(3, ConstValue::vector(vec![32, 24]));
        assert_eq!(
            not_stretched.shape(),
            Some(Shape::from_dims([
                Dim::Known(1),
                Dim::Known(3),
                Dim::Unknown,
                Dim::Unknown
            ]))
        );

        let mismatched = Case::new("Resize", 4, 1)
            .attr(ints("axes", &[2, 3]))
            .input(0, f32_input(&[1, 3, 16, 16]))
            .value(3, ConstValue::vector(vec![1, 3, 32, 32]));
        assert!(mismatched.run().is_err());
    }
}
