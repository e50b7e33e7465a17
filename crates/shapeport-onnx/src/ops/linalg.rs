use shapeport_core::{Dim, Result, Shape};

use super::{Inferred, NodeCtx};

fn check_inner(ctx: &NodeCtx<'_>, k1: &Dim, k2: &Dim) -> Result<()> {
    if let (Dim::Known(a), Dim::Known(b)) = (k1, k2) {
        if a != b {
            return Err(ctx.error(format!(
                "incompatible inner dimensions {a} and {b}"
            )));
        }
    }
    Ok(())
}

/// Numpy matmul: 1-D operands are promoted and the promoted axis dropped
/// again; leading axes broadcast.
pub(crate) fn matmul(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    ctx.check_same_dtype(&[0, 1])?;
    let dtype = ctx.dtype(0).or(ctx.dtype(1));
    let (Some(a), Some(b)) = (ctx.shape(0), ctx.shape(1)) else {
        return Ok(Inferred::one(dtype, None));
    };
    if a.rank() == 0 || b.rank() == 0 {
        return Err(ctx.error("MatMul operands must have rank >= 1"));
    }

    let mut a = a.dims().to_vec();
    let mut b = b.dims().to_vec();
    let a_vector = a.len() == 1;
    let b_vector = b.len() == 1;
    if a_vector {
        a.insert(0, Dim::Known(1));
    }
    if b_vector {
        b.push(Dim::Known(1));
    }

    let (m, k1) = (&a[a.len() - 2], &a[a.len() - 1]);
    let (k2, n) = (&b[b.len() - 2], &b[b.len() - 1]);
    check_inner(ctx, k1, k2)?;

    let batch_a = Shape::from_dims(a[..a.len() - 2].iter().cloned());
    let batch_b = Shape::from_dims(b[..b.len() - 2].iter().cloned());
    let batch = batch_a
        .broadcast(&batch_b)
        .map_err(|e| ctx.error(e.to_string()))?;

    let mut out = batch.dims().to_vec();
    if !a_vector {
        out.push(m.clone());
    }
    if !b_vector {
        out.push(n.clone());
    }
    Ok(Inferred::one(dtype, Some(Shape::from_dims(out))))
}

/// Y = alpha * A' * B' + beta * C, output `[M, N]`.
pub(crate) fn gemm(ctx: &NodeCtx<'_>) -> Result<Inferred> {
    ctx.check_same_dtype(&[0, 1])?;
    let dtype = ctx.dtype(0).or(ctx.dtype(1));
    let (Some(a), Some(b)) = (ctx.shape(0), ctx.shape(1)) else {
        return Ok(Inferred::one(dtype, Some(Shape::unknown(2))));
    };
    if a.rank() != 2 || b.rank() != 2 {
        return Err(ctx.error(format!(
            "Gemm expects 2-D operands, got {a} and {b}"
        )));
    }
    let (m, k1) = if ctx.attrs.int_or("transA", 0) != 0 {
        (&a.dims()[1], &a.dims()[0])
    } else {
        (&a.dims()[0], &a.dims()[1])
    };
    let (k2, n) = if ctx.attrs.int_or("transB", 0) != 0 {
        (&b.dims()[1], &b.dims()[0])
    } else {
        (&b.dims()[0], &b.dims()[1])
    };
    check_inner(ctx, k1, k2)?;
    Ok(Inferred::one(dtype, Some(Shape::from_dims([m.clone(), n.clone()]))))
}

#[cfg(test)]
mod tests {
    use shapeport_core::{Dim, Shape};

    use crate::convert::TensorInfo;
    use crate::ops::testing::{f32_input, int, Case};

    #[test]
    fn matmul_batches_broadcast() {
        let case = Case::new("MatMul", 2, 1)
            .input(0, f32_input(&[8, 1, 3, 4]))
            .input(1, f32_input(&[5, 4, 6]));
        assert_eq!(case.shape(), Some(Shape::from_slice(&[8, 5, 3, 6])));
    }

    #[test]
    fn matmul_promotes_vectors() {
        let vec_mat = Case::new("MatMul", 2, 1)
            .input(0, f32_input(&[4]))
            .input(1, f32_input(&[2, 4, 6]));
        assert_eq!(vec_mat.shape(), Some(Shape::from_slice(&[2, 6])));

        let mat_vec = Case::new("MatMul", 2, 1)
            .input(0, f32_input(&[3, 4]))
            .input(1, f32_input(&[4]));
        assert_eq!(mat_vec.shape(), Some(Shape::from_slice(&[3])));
    }

    #[test]
    fn matmul_checks_inner_dims() {
        let case = Case::new("MatMul", 2, 1)
            .input(0, f32_input(&[3, 4]))
            .input(1, f32_input(&[5, 6]));
        assert!(case.run().is_err());
    }

    #[test]
    fn matmul_keeps_symbolic_batch() {
        let case = Case::new("MatMul", 2, 1)
            .input(
                0,
                Some(TensorInfo::new(
                    f32_input(&[]).and_then(|t| t.dtype),
                    Some(Shape::from_dims([Dim::Symbolic("N".into()), Dim::Known(128)])),
                )),
            )
            .input(1, f32_input(&[128, 10]));
        assert_eq!(
            case.shape(),
            Some(Shape::from_dims([Dim::Symbolic("N".into()), Dim::Known(10)]))
        );
    }

    #[test]
    fn gemm_honours_transpose_flags() {
        let case = Case::new("Gemm", 3, 1)
            .attr(int("transB", 1))
            .input(0, f32_input(&[1, 2048]))
            .input(1, f32_input(&[1000, 2048]))
            .input(2, f32_input(&[1000]));
        assert_eq!(case.shape(), Some(Shape::from_slice(&[1, 1000])));

        let bad = Case::new("Gemm", 2, 1)
            .input(0, f32_input(&[1, 2048]))
            .input(1, f32_input(&[1000, 2048]));
        assert!(bad.run().is_err());
    }
}
