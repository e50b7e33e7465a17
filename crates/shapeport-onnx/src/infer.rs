use std::collections::{HashMap, HashSet};

use shapeport_core::{
    DType, InferOptions, InferenceReport, Result, ShapeError, TensorName, TensorRole, TensorSpec,
};
use shapeport_proto::{GraphProto, ModelProto, NodeProto, ValueInfoProto};
use tracing::{debug, warn};

use crate::convert::{
    info_from_initializer, info_from_value_info, type_from_info, update_type, TensorInfo,
};
use crate::graph::topological_order;
use crate::ops::{rule_for, NodeCtx, Rule};
use crate::values::ConstValue;

/// What is known about every named tensor while the pass runs.
#[derive(Default)]
struct TensorTable {
    infos: HashMap<String, TensorInfo>,
    values: HashMap<String, ConstValue>,
}

impl TensorTable {
    fn seed(graph: &GraphProto) -> Self {
        let mut table = Self::default();
        for vi in graph.input.iter().chain(&graph.value_info).chain(&graph.output) {
            if let Some(info) = info_from_value_info(vi) {
                table.refine(&vi.name, info);
            }
        }
        for init in &graph.initializer {
            table.refine(&init.name, info_from_initializer(init));
            if let Some(value) = ConstValue::from_tensor(init) {
                table.values.insert(init.name.clone(), value);
            }
        }
        table
    }

    /// Seeding tolerates disagreeing declarations; the later one wins.
    fn refine(&mut self, name: &str, info: TensorInfo) {
        let merged = match self.infos.get(name) {
            Some(prev) => merge_info(prev, &info).unwrap_or(info),
            None => info,
        };
        self.infos.insert(name.to_string(), merged);
    }

    fn info(&self, name: &str) -> Option<&TensorInfo> {
        self.infos.get(name)
    }
}

/// Combines an existing annotation with a newly inferred one. `None` when
/// they contradict each other.
fn merge_info(existing: &TensorInfo, inferred: &TensorInfo) -> Option<TensorInfo> {
    let dtype = match (existing.dtype, inferred.dtype) {
        (Some(a), Some(b)) if a != b => return None,
        (a, b) => a.or(b),
    };
    let shape = match (&existing.shape, &inferred.shape) {
        (Some(a), Some(b)) => Some(a.merge(b)?),
        (a, b) => a.clone().or_else(|| b.clone()),
    };
    Some(TensorInfo { dtype, shape })
}

fn is_default_domain(domain: &str) -> bool {
    domain.is_empty() || domain == "ai.onnx"
}

fn op_label(node: &NodeProto) -> String {
    if is_default_domain(&node.domain) {
        node.op_type.clone()
    } else {
        format!("{}::{}", node.domain, node.op_type)
    }
}

/// Runs shape inference over the main graph of `model`, writing inferred
/// types back into `value_info` and the graph outputs.
pub fn infer_shapes(model: &mut ModelProto, options: &InferOptions) -> Result<InferenceReport> {
    let Some(graph) = model.graph.as_mut() else {
        return Err(ShapeError::format("<in-memory model>", "model has no graph"));
    };

    let mut table = TensorTable::seed(graph);
    let order = topological_order(&graph.node)?;
    let mut skipped_ops: Vec<String> = Vec::new();
    let mut failures: Vec<String> = Vec::new();

    for idx in order {
        let node = &graph.node[idx];
        let rule = is_default_domain(&node.domain)
            .then(|| rule_for(&node.op_type))
            .flatten();
        let Some(rule) = rule else {
            let label = op_label(node);
            if options.strict {
                return Err(ShapeError::inference(
                    &node.name,
                    &node.op_type,
                    format!("no shape rule for operator {label}"),
                ));
            }
            if !skipped_ops.contains(&label) {
                warn!(op = %label, "no shape rule, outputs left as declared");
                skipped_ops.push(label);
            }
            continue;
        };

        match node_updates(node, rule, &table, options) {
            Ok(updates) => {
                for (out, info, value) in updates {
                    if let Some(value) = value {
                        table.values.insert(out.clone(), value);
                    }
                    table.infos.insert(out, info);
                }
            }
            Err(err) if options.strict => return Err(err),
            Err(err) => {
                warn!(
                    node = %node.name,
                    op = %node.op_type,
                    error = %err,
                    "shape inference failed, outputs left as declared"
                );
                failures.push(err.to_string());
            }
        }
    }

    write_back(graph, &table);
    let mut report = build_report(graph, &table, skipped_ops);
    report.failures = failures;
    Ok(report)
}

type Update = (String, TensorInfo, Option<ConstValue>);

/// Runs `rule` on one node and merges its outputs with what the table
/// already holds. Nothing is applied unless every output merges.
fn node_updates(
    node: &NodeProto,
    rule: Rule,
    table: &TensorTable,
    options: &InferOptions,
) -> Result<Vec<Update>> {
    let inputs = node
        .input
        .iter()
        .map(|name| table.info(name).cloned())
        .collect();
    let values = node
        .input
        .iter()
        .map(|name| table.values.get(name).cloned())
        .collect();
    let ctx = NodeCtx::new(node, options, inputs, values);
    let inferred = rule(&ctx)?;

    let keep_values = options.data_prop || node.op_type == "Constant";
    let mut updates = Vec::with_capacity(node.output.len());
    for (i, out) in node.output.iter().enumerate() {
        if out.is_empty() {
            continue;
        }
        let fresh = inferred.output(i).cloned().unwrap_or_default();
        let merged = match table.info(out) {
            Some(prev) => merge_info(prev, &fresh).ok_or_else(|| {
                ctx.error(format!(
                    "inferred {} for '{out}' contradicts declared {}",
                    describe(&fresh),
                    describe(prev)
                ))
            })?,
            None => fresh,
        };
        if options.strict && (merged.dtype.is_none() || merged.shape.is_none()) {
            return Err(ctx.error(format!("could not resolve output '{out}'")));
        }
        debug!(node = %node.name, op = %node.op_type, output = %out, info = %describe(&merged), "inferred");
        let value = inferred.value(i).filter(|_| keep_values).cloned();
        updates.push((out.clone(), merged, value));
    }
    Ok(updates)
}

fn describe(info: &TensorInfo) -> String {
    let dtype = info.dtype.map(|d| d.to_string()).unwrap_or_else(|| "?".into());
    let shape = info.shape.as_ref().map(|s| s.to_string()).unwrap_or_else(|| "*".into());
    format!("{dtype}{shape}")
}

fn write_back(graph: &mut GraphProto, table: &TensorTable) {
    let outputs: HashSet<String> = graph.output.iter().map(|o| o.name.clone()).collect();
    let inputs: HashSet<String> = graph
        .input
        .iter()
        .map(|i| i.name.clone())
        .chain(graph.initializer.iter().map(|t| t.name.clone()))
        .collect();

    let mut existing: HashMap<String, usize> = graph
        .value_info
        .iter()
        .enumerate()
        .map(|(i, vi)| (vi.name.clone(), i))
        .collect();

    let intermediates: Vec<String> = graph
        .node
        .iter()
        .flat_map(|n| n.output.iter())
        .filter(|o| !o.is_empty() && !outputs.contains(*o) && !inputs.contains(*o))
        .cloned()
        .collect();

    for name in intermediates {
        let Some((info, dtype)) = typed(table, &name) else {
            continue;
        };
        match existing.get(&name) {
            Some(&i) => {
                let vi = &mut graph.value_info[i];
                update_type(vi.r#type.get_or_insert_with(Default::default), info, dtype);
            }
            None => {
                existing.insert(name.clone(), graph.value_info.len());
                graph.value_info.push(ValueInfoProto {
                    name,
                    r#type: Some(type_from_info(info, dtype)),
                    ..Default::default()
                });
            }
        }
    }

    for out in &mut graph.output {
        if let Some((info, dtype)) = typed(table, &out.name) {
            update_type(out.r#type.get_or_insert_with(Default::default), info, dtype);
        }
    }
}

/// Only tensors with a known element type can be written as a tensor type.
fn typed<'t>(table: &'t TensorTable, name: &str) -> Option<(&'t TensorInfo, DType)> {
    let info = table.info(name)?;
    Some((info, info.dtype?))
}

fn build_report(graph: &GraphProto, table: &TensorTable, skipped_ops: Vec<String>) -> InferenceReport {
    let initializers: HashSet<&str> = graph.initializer.iter().map(|t| t.name.as_str()).collect();
    let outputs: HashSet<&str> = graph.output.iter().map(|o| o.name.as_str()).collect();

    let entries = graph
        .input
        .iter()
        .filter(|i| !initializers.contains(i.name.as_str()))
        .map(|i| (i.name.as_str(), TensorRole::Input))
        .chain(
            graph
                .initializer
                .iter()
                .map(|t| (t.name.as_str(), TensorRole::Initializer)),
        )
        .chain(
            graph
                .node
                .iter()
                .flat_map(|n| n.output.iter())
                .filter(|o| !o.is_empty() && !outputs.contains(o.as_str()))
                .map(|o| (o.as_str(), TensorRole::Intermediate)),
        )
        .chain(graph.output.iter().map(|o| (o.name.as_str(), TensorRole::Output)));

    let mut seen = HashSet::new();
    let mut report = InferenceReport {
        nodes: graph.node.len(),
        skipped_ops,
        ..Default::default()
    };
    for (name, role) in entries {
        if !seen.insert(name) {
            continue;
        }
        let info = table.info(name).cloned().unwrap_or_default();
        let spec = TensorSpec {
            name: TensorName(name.to_string()),
            role,
            dtype: info.dtype,
            shape: info.shape,
        };
        if spec.is_resolved() {
            report.resolved += 1;
        } else {
            report.unresolved.push(spec.name.clone());
        }
        report.tensors.push(spec);
    }
    report
}
