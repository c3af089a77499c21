//! Graph clean-up passes
//!
//! Run ahead of quantization so that only live weights get rewritten:
//! identity forwarding, dead node elimination and unused initializer removal.

use std::collections::{HashMap, HashSet};

use super::proto::ModelProto;

/// Counts of what the optimizer removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// `Identity` nodes bypassed
    pub identities_removed: usize,
    /// Nodes whose outputs were never consumed
    pub dead_nodes_removed: usize,
    /// Initializers no node referenced
    pub initializers_removed: usize,
}

/// Run all passes in order
pub fn optimize(model: &mut ModelProto) -> OptimizeReport {
    let mut report = OptimizeReport::default();
    if model.graph.is_none() {
        return report;
    }
    report.identities_removed = eliminate_identities(model);
    report.dead_nodes_removed = eliminate_dead_nodes(model);
    report.initializers_removed = prune_initializers(model);
    report
}

/// Forward the input of every `Identity` whose output is not a graph output
pub fn eliminate_identities(model: &mut ModelProto) -> usize {
    let Some(graph) = model.graph.as_mut() else {
        return 0;
    };
    let graph_outputs: HashSet<&str> = graph.output.iter().map(|o| o.name.as_str()).collect();

    let mut forward: HashMap<String, String> = HashMap::new();
    let mut kept = Vec::with_capacity(graph.node.len());
    for node in graph.node.drain(..) {
        let bypass = node.op_type == "Identity"
            && node.input.len() == 1
            && node.output.len() == 1
            && !graph_outputs.contains(node.output[0].as_str());
        if bypass {
            let source = forward
                .get(&node.input[0])
                .cloned()
                .unwrap_or_else(|| node.input[0].clone());
            forward.insert(node.output[0].clone(), source);
        } else {
            kept.push(node);
        }
    }

    let removed = forward.len();
    for node in &mut kept {
        for input in &mut node.input {
            if let Some(source) = forward.get(input) {
                *input = source.clone();
            }
        }
    }
    graph.node = kept;
    removed
}

/// Drop nodes that do not contribute to any graph output
pub fn eliminate_dead_nodes(model: &mut ModelProto) -> usize {
    let Some(graph) = model.graph.as_mut() else {
        return 0;
    };
    let mut live: HashSet<String> = graph.output.iter().map(|o| o.name.clone()).collect();
    let mut keep = vec![false; graph.node.len()];

    for (idx, node) in graph.node.iter().enumerate().rev() {
        if node.output.iter().any(|o| live.contains(o)) {
            keep[idx] = true;
            live.extend(node.input.iter().filter(|i| !i.is_empty()).cloned());
        }
    }

    let before = graph.node.len();
    let mut flags = keep.into_iter();
    graph.node.retain(|_| flags.next().unwrap_or(false));
    before - graph.node.len()
}

/// Drop initializers no node consumes
pub fn prune_initializers(model: &mut ModelProto) -> usize {
    let Some(graph) = model.graph.as_mut() else {
        return 0;
    };
    let used: HashSet<&str> = graph
        .node
        .iter()
        .flat_map(|n| n.input.iter().map(String::as_str))
        .chain(graph.output.iter().map(|o| o.name.as_str()))
        .collect();

    let before = graph.initializer.len();
    let kept: Vec<_> = graph
        .initializer
        .drain(..)
        .filter(|t| used.contains(t.name.as_str()))
        .collect();
    graph.initializer = kept;
    before - graph.initializer.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onnx::{DataType, Dim, GraphBuilder};

    fn model_with_identity_and_dead_branch() -> ModelProto {
        let mut g = GraphBuilder::new("g", 15);
        g.input("x", DataType::Float, &Dim::fixed(&[2]));
        let w = g.const_f32("w", &[2], &[1.0, 2.0]);
        g.const_f32("unused", &[2], &[3.0, 4.0]);
        let id = g.unary("Identity", "x");
        let y = g.mul(&id, &w);
        g.unary("Relu", &id);
        g.rename(&y, "y");
        g.output("y", DataType::Float, &Dim::fixed(&[2]));
        g.build_model(vec![])
    }

    #[test]
    fn test_optimize_removes_identity_dead_node_and_initializer() {
        let mut model = model_with_identity_and_dead_branch();
        let report = optimize(&mut model);
        assert_eq!(report.identities_removed, 1);
        assert_eq!(report.dead_nodes_removed, 1);
        assert_eq!(report.initializers_removed, 1);

        let graph = model.graph.unwrap();
        assert_eq!(graph.node.len(), 1);
        assert_eq!(graph.node[0].op_type, "Mul");
        assert_eq!(graph.node[0].input[0], "x");
    }

    #[test]
    fn test_identity_feeding_graph_output_is_kept() {
        let mut g = GraphBuilder::new("g", 15);
        g.input("x", DataType::Float, &Dim::fixed(&[2]));
        let y = g.unary("Identity", "x");
        g.rename(&y, "y");
        g.output("y", DataType::Float, &Dim::fixed(&[2]));
        let mut model = g.build_model(vec![]);

        assert_eq!(eliminate_identities(&mut model), 0);
        assert_eq!(model.graph.unwrap().node.len(), 1);
    }

    #[test]
    fn test_chained_identities_forward_to_source() {
        let mut g = GraphBuilder::new("g", 15);
        g.input("x", DataType::Float, &Dim::fixed(&[2]));
        let a = g.unary("Identity", "x");
        let b = g.unary("Identity", &a);
        let y = g.unary("Relu", &b);
        g.rename(&y, "y");
        g.output("y", DataType::Float, &Dim::fixed(&[2]));
        let mut model = g.build_model(vec![]);

        assert_eq!(eliminate_identities(&mut model), 2);
        let graph = model.graph.unwrap();
        assert_eq!(graph.node.len(), 1);
        assert_eq!(graph.node[0].input[0], "x");
    }

    #[test]
    fn test_optimize_without_graph_is_noop() {
        let mut model = ModelProto::default();
        assert_eq!(optimize(&mut model), OptimizeReport::default());
    }
}
