//! Convolution and pooling over `[N, C, D1, ..., Dn]` inputs.

use shapeport_core::{DType, Dim, Result, Shape};

use super::{Inferred, NodeCtx};
use crate::convert::TensorInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AutoPad {
    NotSet,
    SameUpper,
    SameLower,
    Valid,
}

/// Window geometry shared by Conv, ConvTranspose and the pools.
struct Window {
    kernel: Vec<Option<usize>>,
    strides: Vec<usize>,
    dilations: Vec<usize>,
    pads: Vec<usize>, // begins then ends
    auto_pad: AutoPad,
    ceil_mode: bool,
}

impl Window {
    fn read(ctx: &NodeCtx<'_>, kernel: Vec<Option<usize>>) -> Result<Self> {
        let n = kernel.len();
        let auto_pad = match ctx.attrs.string("auto_pad").unwrap_or("NOTSET") {
            "NOTSET" | "" => AutoPad::NotSet,
            "SAME_UPPER" => AutoPad::SameUpper,
            "SAME_LOWER" => AutoPad::SameLower,
            "VALID" => AutoPad::Valid,
            other => return Err(ctx.error(format!("unknown auto_pad '{other}'"))),
        };
        let strides = positive_list(ctx, "strides", n)?;
        let dilations = positive_list(ctx, "dilations", n)?;
        let pads = match ctx.attrs.ints("pads") {
            Some(p) if p.len() == 2 * n && p.iter().all(|&x| x >= 0) => {
                p.iter().map(|&x| x as usize).collect()
            }
            Some(p) => {
                return Err(ctx.error(format!(
                    "pads must hold {} non-negative values, got {p:?}",
                    2 * n
                )))
            }
            None => vec![0; 2 * n],
        };
        Ok(Self {
            kernel,
            strides,
            dilations,
            pads,
            auto_pad,
            ceil_mode: ctx.attrs.int_or("ceil_mode", 0) != 0,
        })
    }

    fn effective_kernel(&self, i: usize) -> Option<usize> {
        let k = self.kernel[i]?;
        (k.max(1) - 1).checked_mul(self.dilations[i])?.checked_add(1)
    }

    /// Output extent of spatial axis `i` for a forward window.
    fn forward(&self, i: usize, input: &Dim) -> Dim {
        let stride = self.strides[i];
        match self.auto_pad {
            AutoPad::SameUpper | AutoPad::SameLower => match input {
                Dim::Known(x) => Dim::Known(x.div_ceil(stride)),
                _ => Dim::Unknown,
            },
            AutoPad::Valid => match (input, self.effective_kernel(i)) {
                (Dim::Known(x), Some(k)) if *x >= k => Dim::Known((x - k + 1).div_ceil(stride)),
                _ => Dim::Unknown,
            },
            AutoPad::NotSet => match input {
                Dim::Known(x) => self.explicit(i, *x).map(Dim::Known).unwrap_or(Dim::Unknown),
                _ => Dim::Unknown,
            },
        }
    }

    /// Output extent under explicit pads; `None` when the window does not
    /// fit or the extent overflows.
    fn explicit(&self, i: usize, x: usize) -> Option<usize> {
        let n = self.kernel.len();
        let stride = self.strides[i];
        let k = self.effective_kernel(i)?;
        let leading = x.checked_add(self.pads[i])?;
        let span = leading.checked_add(self.pads[i + n])?.checked_sub(k)?;
        let mut out = if self.ceil_mode {
            span.div_ceil(stride) + 1
        } else {
            span / stride + 1
        };
        // The last window must start inside the input or left padding.
        if self.ceil_mode && (out - 1).checked_mul(stride).is_none_or(|start| start >= leading) {
            out -= 1;
        }
        Some(out)
    }
}

fn positive_list(ctx: &NodeCtx<'_>, name: &str, n: usize) -> Result<Vec<usize>> {
    match ctx.attrs.ints(name) {
        Some(v) if v.len() == n && v.iter().all(|&x| x > 0) => {
            Ok(v.iter().map(|&x| x as usize).collect())
        }
        Some(v) => Err(ctx.error(format!(
            "{name} must hold {n} positive values, got {v:?}"
        ))),
        None => Ok(vec![1; n]),
    }
}

fn kernel_from_attr(ctx: &NodeCtx<'_>) -> Option<Vec<Option<usize>>> {
    ctx.attrs
        .ints("kernel_shape")
        .map(|k| k.iter().map(|&x| usize::try_from(x).ok()).collect())
}

fn kernel_from_weight(weight: Option<&Shape>, spatial: usize) -> Vec<Option<usize>> {
    match weight {
        Some(w) if w.rank() == spatial + 2 => w.dims()[2..].iter().map(Dim::known).collect(),
        _ => vec![None; spatial],
    }
}

/// Spatial rank from X, falling back to W.
fn spatial_rank(ctx: &NodeCtx<'_>) -> Result<Option<usize>> {
    let rank = ctx.shape(0).or(ctx.shape(1)).map(Shape::rank);
    match rank {
        Some(r) if r < 3 => Err(ctx.error(format!(
            "expected an input of rank >= 3 ([N, C, spatial...]), got rank {r}"
        ))),
        Some(r) => Ok(Some(r - 2)),
        None => Ok(None),
    }
}

fn batch_dim(x: Option<&Shape>) -> Dim {
    x.map(|s| s.dims()[0].clone()).unwrap_or(Dim::Unknown)
}

pub(crate) fn conv(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    ctx.check_same_dtype(&[0, 1])?;
    let dtype = ctx.dtype(0).or(ctx.dtype(1));
    let Some(spatial) = spatial_rank(ctx)? else {
        return Ok(Inferred::one(dtype, None));
    };
    let x = ctx.shape(0);
    let w = ctx.shape(1);

    if let (Some(x), Some(w)) = (x, w) {
        let group = ctx.attrs.int_or("group", 1).max(1) as usize;
        if let (Some(Dim::Known(c)), Some(Dim::Known(wc))) = (x.dims().get(1), w.dims().get(1)) {
            if wc.checked_mul(group) != Some(*c) {
                return Err(ctx.error(format!(
                    "input has {c} channels but weight expects {wc} x group {group}"
                )));
            }
        }
    }

    let kernel = kernel_from_attr(ctx).unwrap_or_else(|| kernel_from_weight(w, spatial));
    if kernel.len() != spatial {
        return Err(ctx.error("kernel_shape rank does not match input"));
    }
    let window = Window::read(ctx, kernel)?;

    let mut out = vec![
        batch_dim(x),
        w.and_then(|w| w.dims().first().cloned())
            .unwrap_or(Dim::Unknown),
    ];
    for i in 0..spatial {
        out.push(match x {
            Some(x) => window.forward(i, &x.dims()[i + 2]),
            None => Dim::Unknown,
        });
    }
    Ok(Inferred::one(dtype, Some(Shape::from_dims(out))))
}

pub(crate) fn conv_transpose(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    ctx.check_same_dtype(&[0, 1])?;
    let dtype = ctx.dtype(0).or(ctx.dtype(1));
    let Some(spatial) = spatial_rank(ctx)? else {
        return Ok(Inferred::one(dtype, None));
    };
    let x = ctx.shape(0);
    let w = ctx.shape(1);
    let group = ctx.attrs.int_or("group", 1).max(1) as usize;

    let kernel = kernel_from_attr(ctx).unwrap_or_else(|| kernel_from_weight(w, spatial));
    if kernel.len() != spatial {
        return Err(ctx.error("kernel_shape rank does not match input"));
    }
    let window = Window::read(ctx, kernel)?;
    let output_padding = match ctx.attrs.ints("output_padding") {
        Some(p) if p.len() == spatial => p.iter().map(|&v| v.max(0) as usize).collect(),
        _ => vec![0; spatial],
    };

    let channels = match w.and_then(|w| w.dims().get(1)) {
        Some(Dim::Known(c)) => c.checked_mul(group).map(Dim::Known).unwrap_or(Dim::Unknown),
        _ => Dim::Unknown,
    };
    let mut out = vec![batch_dim(x), channels];

    if let Some(explicit) = ctx.attrs.ints("output_shape") {
        // May list spatial dims only or the full shape.
        let tail = &explicit[explicit.len().saturating_sub(spatial)..];
        out.extend(tail.iter().map(|&d| match usize::try_from(d) {
            Ok(d) => Dim::Known(d),
            Err(_) => Dim::Unknown,
        }));
        return Ok(Inferred::one(dtype, Some(Shape::from_dims(out))));
    }

    for i in 0..spatial {
        let input = x.map(|x| &x.dims()[i + 2]);
        let stride = window.strides[i];
        let dim = match (input, window.effective_kernel(i)) {
            (Some(Dim::Known(len)), Some(k)) => match window.auto_pad {
                AutoPad::SameUpper | AutoPad::SameLower => len.checked_mul(stride),
                _ => stride
                    .checked_mul((*len).max(1) - 1)
                    .and_then(|v| v.checked_add(output_padding[i]))
                    .and_then(|v| v.checked_add(k))
                    .and_then(|full| {
                        full.checked_sub(window.pads[i].checked_add(window.pads[i + spatial])?)
                    }),
            },
            _ => None,
        };
        out.push(dim.map(Dim::Known).unwrap_or(Dim::Unknown));
    }
    Ok(Inferred::one(dtype, Some(Shape::from_dims(out))))
}

pub(crate) fn pool(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    if x.rank() < 3 {
        return Err(ctx.error(format!("expected rank >= 3, got {x}")));
    }
    let spatial = x.rank() - 2;
    let kernel = kernel_from_attr(ctx)
        .ok_or_else(|| ctx.error("missing required attribute 'kernel_shape'"))?;
    if kernel.len() != spatial {
        return Err(ctx.error(format!(
            "kernel_shape has {} axes, input has {spatial} spatial axes",
            kernel.len()
        )));
    }
    let window = Window::read(ctx, kernel)?;

    let mut out = vec![x.dims()[0].clone(), x.dims()[1].clone()];
    out.extend((0..spatial).map(|i| window.forward(i, &x.dims()[i + 2])));
    let shape = Shape::from_dims(out);

    let mut outputs = vec![TensorInfo::new(dtype, Some(shape.clone()))];
    if ctx.output_count() > 1 {
        outputs.push(TensorInfo::new(Some(DType::I64), Some(shape)));
    }
    Ok(Inferred::many(outputs))
}

pub(crate) fn global_pool(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    let dtype = ctx.dtype(0);
    let Some(x) = ctx.shape(0) else {
        return Ok(Inferred::one(dtype, None));
    };
    if x.rank() < 2 {
        return Err(ctx.error(format!("expected rank >= 2, got {x}")));
    }
    let shape = Shape::from_dims(
        x.dims()
            .iter()
            .enumerate()
            .map(|(i, d)| if i < 2 { d.clone() } else { Dim::Known(1) }),
    );
    Ok(Inferred::one(dtype, Some(shape)))
}
