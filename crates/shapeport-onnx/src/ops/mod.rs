//! Per-operator shape rules.
//!
//! A rule sees the node, its attributes and whatever is known about its
//! inputs, and returns what it can tell about each output. Unknown inputs
//! are not errors: the rule returns less information and the tensor stays
//! unresolved. Contradictions (incompatible dims, bad attributes) are.

mod conv;
mod elementwise;
mod linalg;
mod producers;
mod reduce;
mod shape_ops;

use shapeport_core::{normalize_axis, DType, InferOptions, Result, Shape, ShapeError};
use shapeport_proto::NodeProto;

use crate::attrs::Attrs;
use crate::convert::TensorInfo;
use crate::values::ConstValue;

pub(crate) type Rule = fn(&NodeCtx<'_>) -> Result<Inferred>;

pub(crate) struct NodeCtx<'a> {
    pub node: &'a NodeProto,
    pub attrs: Attrs<'a>,
    pub options: &'a InferOptions,
    inputs: Vec<Option<TensorInfo>>,
    values: Vec<Option<ConstValue>>,
}

impl<'a> NodeCtx<'a> {
    pub(crate) fn new(
        node: &'a NodeProto,
        options: &'a InferOptions,
        inputs: Vec<Option<TensorInfo>>,
        values: Vec<Option<ConstValue>>,
    ) -> Self {
        Self {
            node,
            attrs: Attrs::new(&node.attribute),
            options,
            inputs,
            values,
        }
    }

    /// An input slot is present when it is listed with a non-empty name.
    pub(crate) fn has_input(&self, i: usize) -> bool {
        self.node.input.get(i).is_some_and(|n| !n.is_empty())
    }

    pub(crate) fn input_count(&self) -> usize {
        self.node.input.len()
    }

    pub(crate) fn output_count(&self) -> usize {
        self.node.output.len()
    }

    pub(crate) fn input(&self, i: usize) -> Option<&TensorInfo> {
        self.inputs.get(i).and_then(Option::as_ref)
    }

    pub(crate) fn shape(&self, i: usize) -> Option<&Shape> {
        self.input(i).and_then(|t| t.shape.as_ref())
    }

    pub(crate) fn dtype(&self, i: usize) -> Option<DType> {
        self.input(i).and_then(|t| t.dtype)
    }

    pub(crate) fn value(&self, i: usize) -> Option<&ConstValue> {
        self.values.get(i).and_then(Option::as_ref)
    }

    pub(crate) fn int_values(&self, i: usize) -> Option<&[i64]> {
        self.value(i).and_then(ConstValue::as_ints)
    }

    /// Integer list taken from attribute `name` or, for newer opsets that
    /// moved it to an input, from input `i`.
    pub(crate) fn ints_from(&self, name: &str, i: usize) -> Option<Vec<i64>> {
        if let Some(ints) = self.attrs.ints(name) {
            return Some(ints.to_vec());
        }
        if self.has_input(i) {
            return self.int_values(i).map(<[i64]>::to_vec);
        }
        None
    }

    pub(crate) fn error(&self, reason: impl Into<String>) -> ShapeError {
        ShapeError::inference(&self.node.name, &self.node.op_type, reason)
    }

    pub(crate) fn axis(&self, axis: i64, rank: usize) -> Result<usize> {
        normalize_axis(axis, rank)
            .ok_or_else(|| self.error(format!("axis {axis} is out of range for rank {rank}")))
    }

    /// Under `check_type`, the listed inputs must share an element type.
    pub(crate) fn check_same_dtype(&self, inputs: &[usize]) -> Result<()> {
        if !self.options.check_type {
            return Ok(());
        }
        let mut seen: Option<DType> = None;
        for &i in inputs {
            match (seen, self.dtype(i)) {
                (Some(a), Some(b)) if a != b => {
                    return Err(self.error(format!(
                        "input {i} has element type {b}, expected {a}"
                    )));
                }
                (None, Some(b)) => seen = Some(b),
                _ => {}
            }
        }
        Ok(())
    }
}

/// Per-output findings of one rule.
#[derive(Debug, Default)]
pub(crate) struct Inferred {
    pub outputs: Vec<TensorInfo>,
    pub values: Vec<Option<ConstValue>>,
}

impl Inferred {
    pub(crate) fn one(dtype: Option<DType>, shape: Option<Shape>) -> Self {
        Self {
            outputs: vec![TensorInfo::new(dtype, shape)],
            values: Vec::new(),
        }
    }

    pub(crate) fn many(outputs: Vec<TensorInfo>) -> Self {
        Self {
            outputs,
            values: Vec::new(),
        }
    }

    pub(crate) fn with_value(mut self, value: Option<ConstValue>) -> Self {
        self.values = vec![value];
        self
    }

    pub(crate) fn output(&self, i: usize) -> Option<&TensorInfo> {
        self.outputs.get(i)
    }

    pub(crate) fn value(&self, i: usize) -> Option<&ConstValue> {
        self.values.get(i).and_then(Option::as_ref)
    }
}

/// Shape rule for a default-domain operator.
pub(crate) fn rule_for(op_type: &str) -> Option<Rule> {
    let rule: Rule = match op_type {
        "Relu" | "LeakyRelu" | "PRelu" | "Sigmoid" | "HardSigmoid" | "HardSwish" | "Tanh"
        | "Elu" | "Selu" | "Gelu" | "Softplus" | "Softsign" | "Exp" | "Log" | "Sqrt"
        | "Reciprocal" | "Neg" | "Abs" | "Floor" | "Ceil" | "Round" | "Erf" | "Sin" | "Cos"
        | "Not" | "Clip" | "Softmax" | "LogSoftmax" | "LRN" | "InstanceNormalization"
        | "Sign" | "Mish" | "Celu" | "ThresholdedRelu" => elementwise::unary,
        "Identity" => elementwise::identity,
        "Dropout" => elementwise::dropout,
        "BatchNormalization" => elementwise::batch_norm,
        "LayerNormalization" => elementwise::layer_norm,
        "Add" | "Sub" | "Mul" | "Div" => elementwise::arithmetic,
        "Pow" => elementwise::pow,
        "Mod" | "Max" | "Min" | "Sum" | "Mean" => elementwise::variadic,
        "And" | "Or" | "Xor" | "Equal" | "Less" | "Greater" | "LessOrEqual"
        | "GreaterOrEqual" => elementwise::comparison,
        "Where" => elementwise::where_,
        "Cast" => elementwise::cast,
        "CastLike" => elementwise::cast_like,
        "MatMul" => linalg::matmul,
        "Gemm" => linalg::gemm,
        "Conv" => conv::conv,
        "ConvTranspose" => conv::conv_transpose,
        "MaxPool" | "AveragePool" | "LpPool" => conv::pool,
        "GlobalAveragePool" | "GlobalMaxPool" | "GlobalLpPool" => conv::global_pool,
        "Reshape" => shape_ops::reshape,
        "Flatten" => shape_ops::flatten,
        "Transpose" => shape_ops::transpose,
        "Squeeze" => shape_ops::squeeze,
        "Unsqueeze" => shape_ops::unsqueeze,
        "Concat" => shape_ops::concat,
        "Split" => shape_ops::split,
        "Slice" => shape_ops::slice,
        "Gather" => shape_ops::gather,
        "Expand" => shape_ops::expand,
        "Tile" => shape_ops::tile,
        "Pad" => shape_ops::pad,
        "Resize" | "Upsample" => shape_ops::resize,
        "DepthToSpace" => shape_ops::depth_to_space,
        "SpaceToDepth" => shape_ops::space_to_depth,
        "ReduceMean" | "ReduceSum" | "ReduceMax" | "ReduceMin" | "ReduceProd" | "ReduceL1"
        | "ReduceL2" | "ReduceLogSumExp" | "ReduceSumSquare" => reduce::reduce,
        "ArgMax" | "ArgMin" => reduce::arg_reduce,
        "Shape" => producers::shape,
        "Size" => producers::size,
        "Constant" => producers::constant,
        "ConstantOfShape" => producers::constant_of_shape,
        "EyeLike" => producers::eye_like,
        "Range" => producers::range,
        "NonZero" => producers::non_zero,
        "TopK" => producers::top_k,
        "OneHot" => producers::one_hot,
        _ => return None,
    };
    Some(rule)
}

/// Shape with every axis known, from a list of integers.
pub(crate) fn shape_from_ints(ints: &[i64]) -> Option<Shape> {
    ints.iter()
        .map(|&d| usize::try_from(d).ok())
        .collect::<Option<Vec<_>>>()
        .map(|dims| Shape::from_slice(&dims))
}

#[cfg(test)]
pub(crate) mod testing {
    use shapeport_core::{DType, InferOptions, Shape};
    use shapeport_proto::onnx::attribute_proto::AttributeType;
    use shapeport_proto::{AttributeProto, NodeProto};

    use super::{rule_for, Inferred, NodeCtx};
    use crate::convert::TensorInfo;
    use crate::values::ConstValue;

    pub(crate) fn ints(name: &str, v: &[i64]) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Ints as i32,
            ints: v.to_vec(),
            ..Default::default()
        }
    }

    pub(crate) fn int(name: &str, v: i64) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Int as i32,
            i: v,
            ..Default::default()
        }
    }

    pub(crate) fn string(name: &str, v: &str) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::String as i32,
            s: v.to_string().into(),
            ..Default::default()
        }
    }

    pub(crate) fn f32_input(dims: &[usize]) -> Option<TensorInfo> {
        Some(TensorInfo::new(Some(DType::F32), Some(Shape::from_slice(dims))))
    }

    pub(crate) fn i64_input(dims: &[usize]) -> Option<TensorInfo> {
        Some(TensorInfo::new(Some(DType::I64), Some(Shape::from_slice(dims))))
    }

    /// Single test harness for rules: `inputs` pairs a tensor description
    /// with an optional constant value.
    pub(crate) struct Case {
        pub node: NodeProto,
        pub options: InferOptions,
        pub inputs: Vec<Option<TensorInfo>>,
        pub values: Vec<Option<ConstValue>>,
    }

    impl Case {
        pub(crate) fn new(op_type: &str, n_inputs: usize, n_outputs: usize) -> Self {
            Self {
                node: NodeProto {
                    name: format!("{op_type}_0"),
                    op_type: op_type.to_string(),
                    input: (0..n_inputs).map(|i| format!("in{i}")).collect(),
                    output: (0..n_outputs).map(|i| format!("out{i}")).collect(),
                    ..Default::default()
                },
                options: InferOptions::default(),
                inputs: vec![None; n_inputs],
                values: vec![None; n_inputs],
            }
        }

        pub(crate) fn attr(mut self, attr: AttributeProto) -> Self {
            self.node.attribute.push(attr);
            self
        }

        pub(crate) fn input(mut self, i: usize, info: Option<TensorInfo>) -> Self {
            self.inputs[i] = info;
            self
        }

        pub(crate) fn value(mut self, i: usize, value: ConstValue) -> Self {
            self.values[i] = Some(value);
            self
        }

        pub(crate) fn run(&self) -> shapeport_core::Result<Inferred> {
            let rule = rule_for(&self.node.op_type).expect("rule registered");
            let ctx = NodeCtx::new(
                &self.node,
                &self.options,
                self.inputs.clone(),
                self.values.clone(),
            );
            rule(&ctx)
        }

        pub(crate) fn shape(&self) -> Option<Shape> {
            self.run().expect("rule succeeds").outputs[0].shape.clone()
        }
    }
}
