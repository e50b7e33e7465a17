use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use shapeport_core::{Result, ShapeError};
use shapeport_proto::NodeProto;

/// Orders nodes so that every producer precedes its consumers. Among
/// ready nodes the one listed first in the file goes first, so an already
/// sorted graph keeps its order.
pub(crate) fn topological_order(nodes: &[NodeProto]) -> Result<Vec<usize>> {
    let mut producer: HashMap<&str, usize> = HashMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        for out in node.output.iter().filter(|o| !o.is_empty()) {
            producer.insert(out.as_str(), idx);
        }
    }

    let mut in_degree = vec![0usize; nodes.len()];
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (idx, node) in nodes.iter().enumerate() {
        let mut deps: Vec<usize> = node
            .input
            .iter()
            .filter_map(|name| producer.get(name.as_str()).copied())
            .collect();
        deps.sort_unstable();
        deps.dedup();
        for dep in deps {
            in_degree[idx] += 1;
            consumers[dep].push(idx);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(idx);
        for &next in &consumers[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() < nodes.len() {
        let stuck = in_degree
            .iter()
            .position(|&d| d > 0)
            .map(|idx| &nodes[idx])
            .map(|n| (n.name.as_str(), n.op_type.as_str()))
            .unwrap_or_default();
        return Err(ShapeError::inference(
            stuck.0,
            stuck.1,
            "graph contains a cycle",
        ));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, inputs: &[&str], outputs: &[&str]) -> NodeProto {
        NodeProto {
            name: name.to_string(),
            op_type: "Identity".to_string(),
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output: outputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn sorted_graph_keeps_order() {
        let nodes = vec![node("a", &["x"], &["t1"]), node("b", &["t1"], &["t2"])];
        assert_eq!(topological_order(&nodes).unwrap(), vec![0, 1]);
    }

    #[test]
    fn reorders_consumers_after_producers() {
        let nodes = vec![
            node("c", &["t2", "t1"], &["y"]),
            node("b", &["t1"], &["t2"]),
            node("a", &["x"], &["t1"]),
        ];
        assert_eq!(topological_order(&nodes).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn rejects_cycles() {
        let nodes = vec![node("a", &["t2"], &["t1"]), node("b", &["t1"], &["t2"])];
        let err = topological_order(&nodes).unwrap_err();
        assert!(matches!(err, ShapeError::Inference { .. }));
        assert!(err.to_string().contains("cycle"));
    }
}
