use super::graph::{Graph, GraphError};
use super::node::NodeSpec;

/// Fluent construction for provisioning graphs.
///
/// Every "run X after Y" relationship must be a declared edge here; node
/// declaration order carries no scheduling meaning beyond tie-breaking the
/// topological sort.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<NodeSpec>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: NodeSpec) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        Graph::new(self.nodes)
    }
}
