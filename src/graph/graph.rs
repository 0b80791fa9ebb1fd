use super::node::{NodeId, NodeSpec, NoopAction};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Node {node} depends on undeclared node {dependency}")]
    UnknownDependency { node: NodeId, dependency: NodeId },

    #[error("Node {0} depends on itself")]
    SelfDependency(NodeId),

    #[error("Dependency cycle involving nodes: {0:?}")]
    CycleDetected(Vec<NodeId>),
}

impl From<GraphError> for crate::error::ProvisionError {
    fn from(error: GraphError) -> Self {
        crate::error::ProvisionError::InvalidConfiguration {
            field: "graph".to_string(),
            reason: error.to_string(),
        }
    }
}

/// The full set of provisioning nodes plus their predecessor edges.
///
/// Construction validates the three structural invariants: unique ids,
/// every predecessor resolves to a declared node, and acyclicity. A valid
/// graph always admits a topological order.
#[derive(Clone)]
pub struct Graph {
    nodes: Vec<NodeSpec>,
    index: HashMap<NodeId, usize>,
}

impl Graph {
    /// Build and validate a graph from node declarations.
    pub fn new(nodes: Vec<NodeSpec>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), position).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        let graph = Self { nodes, index };
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            for dependency in &node.depends_on {
                if *dependency == node.id {
                    return Err(GraphError::SelfDependency(node.id.clone()));
                }
                if !self.index.contains_key(dependency) {
                    return Err(GraphError::UnknownDependency {
                        node: node.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        // Kahn's algorithm doubles as the cycle check
        self.topological_sort().map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.iter()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|node| &node.id)
    }

    /// Direct dependents of a node (nodes declaring it as a predecessor).
    pub fn dependents(&self, id: &NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.depends_on.contains(id))
            .map(|node| node.id.clone())
            .collect()
    }

    /// Every node reachable from `id` via dependent edges. These are the
    /// nodes that must not run once `id` has failed.
    pub fn descendants(&self, id: &NodeId) -> HashSet<NodeId> {
        let mut reached = HashSet::new();
        let mut frontier = VecDeque::from(self.dependents(id));
        while let Some(current) = frontier.pop_front() {
            if reached.insert(current.clone()) {
                frontier.extend(self.dependents(&current));
            }
        }
        reached
    }

    /// Topological order via Kahn's algorithm, deterministic in declaration
    /// order. Returns the ids still holding edges when a cycle blocks
    /// completion.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: HashMap<&NodeId, usize> = self
            .nodes
            .iter()
            .map(|node| (&node.id, node.depends_on.len()))
            .collect();

        let mut queue: VecDeque<&NodeId> = self
            .nodes
            .iter()
            .filter(|node| node.depends_on.is_empty())
            .map(|node| &node.id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            for node in &self.nodes {
                if node.depends_on.contains(id) {
                    let degree = in_degree.get_mut(&node.id).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(&node.id);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let remaining: Vec<NodeId> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.clone())
                .collect();
            return Err(GraphError::CycleDetected(remaining));
        }
        Ok(order)
    }

    /// The symmetric teardown graph: edges reversed, each node carrying its
    /// teardown action (a no-op when none was declared). Guards carry over
    /// so a pruned subtree stays pruned during destroy.
    pub fn teardown_graph(&self) -> Result<Graph, GraphError> {
        let mut reversed_edges: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in &self.nodes {
            for dependency in &node.depends_on {
                reversed_edges
                    .entry(dependency.clone())
                    .or_default()
                    .push(node.id.clone());
            }
        }

        let nodes = self
            .nodes
            .iter()
            .map(|node| NodeSpec {
                id: node.id.clone(),
                depends_on: reversed_edges.remove(&node.id).unwrap_or_default(),
                guard: node.guard.clone(),
                action: node
                    .teardown
                    .clone()
                    .unwrap_or_else(|| Arc::new(NoopAction)),
                teardown: None,
            })
            .collect();

        Graph::new(nodes)
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").field("nodes", &self.nodes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::NoopAction;
    use std::sync::Arc;

    fn node(id: &str, deps: &[&str]) -> NodeSpec {
        NodeSpec::new(id, Arc::new(NoopAction)).depends_on(deps.iter().copied())
    }

    #[test]
    fn test_topological_sort_respects_edges() {
        let graph = Graph::new(vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
        ])
        .unwrap();

        let order = graph.topological_sort().unwrap();
        let position =
            |id: &str| order.iter().position(|n| n.as_str() == id).unwrap();
        assert!(position("a") < position("b"));
        assert!(position("a") < position("c"));
        assert!(position("b") < position("d"));
        assert!(position("c") < position("d"));
    }

    #[test]
    fn test_cycle_detection() {
        let result = Graph::new(vec![node("a", &["b"]), node("b", &["a"])]);
        assert!(matches!(result, Err(GraphError::CycleDetected(_))));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let result = Graph::new(vec![node("a", &["ghost"])]);
        match result {
            Err(GraphError::UnknownDependency { node, dependency }) => {
                assert_eq!(node.as_str(), "a");
                assert_eq!(dependency.as_str(), "ghost");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let result = Graph::new(vec![node("a", &[]), node("a", &[])]);
        assert!(matches!(result, Err(GraphError::DuplicateNode(_))));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let result = Graph::new(vec![node("a", &["a"])]);
        assert!(matches!(result, Err(GraphError::SelfDependency(_))));
    }

    #[test]
    fn test_descendants_are_transitive() {
        let graph = Graph::new(vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["b"]),
            node("d", &[]),
        ])
        .unwrap();

        let descendants = graph.descendants(&NodeId::new("a"));
        assert!(descendants.contains(&NodeId::new("b")));
        assert!(descendants.contains(&NodeId::new("c")));
        assert!(!descendants.contains(&NodeId::new("d")));
        assert!(!descendants.contains(&NodeId::new("a")));
    }

    #[test]
    fn test_teardown_graph_reverses_edges() {
        let graph = Graph::new(vec![node("a", &[]), node("b", &["a"])]).unwrap();
        let teardown = graph.teardown_graph().unwrap();
        assert_eq!(
            teardown.node(&NodeId::new("a")).unwrap().depends_on,
            vec![NodeId::new("b")]
        );
        assert!(teardown.node(&NodeId::new("b")).unwrap().depends_on.is_empty());
    }
}
