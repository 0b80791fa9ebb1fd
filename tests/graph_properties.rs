//! Property tests for graph ordering invariants.

mod common;

use common::{new_log, TrackingAction};
use proptest::prelude::*;
use provision_core::graph::{Graph, GraphBuilder, NodeId, NodeSpec};
use provision_core::orchestration::{Coordinator, ExecutionOptions, RunContext};
use std::collections::HashMap;
use std::sync::Arc;

/// Random DAGs: a node count plus a subset of forward edges. Edges only
/// point from lower to higher indices, so every generated graph is acyclic
/// by construction.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..max_nodes).prop_flat_map(|nodes| {
        let pairs: Vec<(usize, usize)> = (0..nodes)
            .flat_map(|from| ((from + 1)..nodes).map(move |to| (from, to)))
            .collect();
        let upper = pairs.len();
        (
            Just(nodes),
            proptest::sample::subsequence(pairs, 0..=upper),
        )
    })
}

fn node_name(index: usize) -> String {
    format!("node-{index}")
}

fn build_graph(nodes: usize, edges: &[(usize, usize)], log: &common::ExecutionLog) -> Graph {
    let mut dependencies: HashMap<usize, Vec<String>> = HashMap::new();
    for (from, to) in edges {
        dependencies.entry(*to).or_default().push(node_name(*from));
    }

    let mut builder = GraphBuilder::new();
    for index in 0..nodes {
        let name = node_name(index);
        let mut spec = NodeSpec::new(name.as_str(), TrackingAction::ok(&name, log));
        if let Some(deps) = dependencies.get(&index) {
            spec = spec.depends_on(deps.iter().map(String::as_str));
        }
        builder.add(spec);
    }
    builder.build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every generated DAG admits a topological order consistent with its
    /// edges.
    #[test]
    fn topological_sort_respects_every_edge((nodes, edges) in dag_strategy(12)) {
        let log = new_log();
        let graph = build_graph(nodes, &edges, &log);
        let order = graph.topological_sort().unwrap();
        prop_assert_eq!(order.len(), nodes);

        let position: HashMap<&NodeId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        for (from, to) in &edges {
            let from_id = NodeId::new(node_name(*from));
            let to_id = NodeId::new(node_name(*to));
            prop_assert!(position[&from_id] < position[&to_id]);
        }
    }

    /// The coordinator never starts a node before all of its predecessors
    /// have finished, for any DAG and any parallelism bound.
    #[test]
    fn execution_order_respects_predecessors(
        (nodes, edges) in dag_strategy(10),
        max_parallel in 1usize..6,
    ) {
        let log = new_log();
        let graph = build_graph(nodes, &edges, &log);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let report = runtime.block_on(async {
            Coordinator::new(ExecutionOptions {
                max_parallel,
                ..Default::default()
            })
            .run(&graph, Arc::new(RunContext::new()))
            .await
        });

        prop_assert!(report.is_success());

        let order = log.lock().clone();
        prop_assert_eq!(order.len(), nodes);
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        for (from, to) in &edges {
            let from_name = node_name(*from);
            let to_name = node_name(*to);
            prop_assert!(position[from_name.as_str()] < position[to_name.as_str()]);
        }
    }
}
