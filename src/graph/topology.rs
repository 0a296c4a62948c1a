//! Topological analysis of pipelines.
//!
//! Provides:
//! - Topological sorting (dependencies first)
//! - The ordered upstream closure of a stage, used for request propagation
//! - Execution depth and connected-component analysis

use crate::core::error::{GraphError, GraphResult, NodeId};
use crate::graph::structure::Pipeline;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// Analyzer for pipeline topology.
pub struct TopologyAnalyzer<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Create a new analyzer for the given pipeline.
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Build a petgraph view restricted to `nodes`.
    fn graph_of(&self, nodes: &[NodeId]) -> DiGraph<NodeId, usize> {
        let mut graph = DiGraph::with_capacity(nodes.len(), self.pipeline.connection_count());
        let indices: HashMap<NodeId, NodeIndex> =
            nodes.iter().map(|&id| (id, graph.add_node(id))).collect();
        for conn in self.pipeline.connections() {
            if let (Some(&from), Some(&to)) =
                (indices.get(&conn.from.node_id), indices.get(&conn.to.node_id))
            {
                graph.add_edge(from, to, conn.to.port);
            }
        }
        graph
    }

    fn sort(&self, nodes: &[NodeId]) -> GraphResult<Vec<NodeId>> {
        let graph = self.graph_of(nodes);
        toposort(&graph, None)
            .map(|order| order.into_iter().map(|index| graph[index]).collect())
            .map_err(|cycle| GraphError::CycleDetected {
                nodes: vec![graph[cycle.node_id()]],
            })
    }

    /// Get the topological sort order.
    ///
    /// Returns stages in an order where producers come before consumers.
    pub fn topological_sort(&self) -> GraphResult<Vec<NodeId>> {
        let nodes: Vec<NodeId> = self.pipeline.node_ids().collect();
        self.sort(&nodes)
    }

    /// The stage and everything upstream of it, producers first.
    pub fn upstream_order(&self, node_id: NodeId) -> GraphResult<Vec<NodeId>> {
        self.pipeline.get_node(node_id)?;
        let mut nodes = self.pipeline.get_upstream(node_id);
        nodes.push(node_id);
        self.sort(&nodes)
    }

    /// Check if the pipeline has any cycles.
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Get the execution depth of a stage.
    ///
    /// Depth 0 = source stages (no dependencies)
    /// Higher depth = longer chain of producers
    pub fn node_depth(&self, node_id: NodeId) -> GraphResult<usize> {
        let order = self.upstream_order(node_id)?;
        let mut depth: HashMap<NodeId, usize> = HashMap::new();
        for id in order {
            let d = self
                .pipeline
                .connections_to(id)
                .filter_map(|conn| depth.get(&conn.from.node_id))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, d);
        }
        Ok(depth.get(&node_id).copied().unwrap_or(0))
    }

    /// Find all disconnected sub-pipelines.
    pub fn find_subgraphs(&self) -> Vec<HashSet<NodeId>> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut subgraphs = Vec::new();

        for node_id in self.pipeline.node_ids() {
            if !visited.contains(&node_id) {
                let subgraph = self.flood_fill(node_id);
                visited.extend(&subgraph);
                subgraphs.push(subgraph);
            }
        }

        subgraphs
    }

    /// Flood fill to find all connected stages (ignoring edge direction).
    fn flood_fill(&self, start: NodeId) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                for conn in self.pipeline.connections_from(current) {
                    queue.push_back(conn.to.node_id);
                }
                for conn in self.pipeline.connections_to(current) {
                    queue.push_back(conn.from.node_id);
                }
            }
        }

        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stage::{PassthroughStage, ProcessingStage};

    fn stage() -> Box<dyn ProcessingStage> {
        Box::new(PassthroughStage)
    }

    fn position(order: &[NodeId], id: NodeId) -> usize {
        order.iter().position(|&n| n == id).unwrap()
    }

    #[test]
    fn test_topological_sort() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_stage(stage());
        let b = pipeline.add_stage(stage());
        let c = pipeline.add_stage(stage());

        pipeline.connect(b, 0, c, 0).unwrap();
        pipeline.connect(a, 0, b, 0).unwrap();

        let sorted = TopologyAnalyzer::new(&pipeline).topological_sort().unwrap();
        assert!(position(&sorted, a) < position(&sorted, b));
        assert!(position(&sorted, b) < position(&sorted, c));
    }

    #[test]
    fn test_upstream_order_excludes_unrelated() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_stage(stage());
        let b = pipeline.add_stage(stage());
        let other = pipeline.add_stage(stage());
        pipeline.connect(a, 0, b, 0).unwrap();

        let analyzer = TopologyAnalyzer::new(&pipeline);
        assert_eq!(analyzer.upstream_order(b).unwrap(), vec![a, b]);
        assert_eq!(analyzer.upstream_order(other).unwrap(), vec![other]);
        assert_eq!(analyzer.node_depth(b).unwrap(), 1);
        assert!(!analyzer.has_cycle());
    }

    #[test]
    fn test_find_subgraphs() {
        let mut pipeline = Pipeline::new();
        let a1 = pipeline.add_stage(stage());
        let a2 = pipeline.add_stage(stage());
        let b1 = pipeline.add_stage(stage());
        let b2 = pipeline.add_stage(stage());

        pipeline.connect(a1, 0, a2, 0).unwrap();
        pipeline.connect(b1, 0, b2, 0).unwrap();

        let subgraphs = TopologyAnalyzer::new(&pipeline).find_subgraphs();
        assert_eq!(subgraphs.len(), 2);
    }
}
