//! The workflow graph handed to the director.
//!
//! Nodes are pattern jobs, data sources, data sinks, or foreign entities
//! (anything else found in the container; the director rejects those before
//! running). Edges connect node names; for dual-input patterns the edge
//! declaration order fixes which stream is the left input.

use fdp_common::ValidationError;
use serde::{Deserialize, Serialize};

use crate::io::{DataSinkSpec, DataSourceSpec};
use crate::pattern::PatternJob;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphNode {
    Pattern(PatternJob),
    Source(DataSourceSpec),
    Sink(DataSinkSpec),
    /// An entity that is neither a pattern job nor an I/O actor. Kept in the
    /// graph so validation can name it precisely.
    Foreign {
        name: String,
        class: String,
        is_composite: bool,
        has_director: bool,
    },
}

impl GraphNode {
    pub fn name(&self) -> &str {
        match self {
            GraphNode::Pattern(job) => &job.name,
            GraphNode::Source(spec) => &spec.name,
            GraphNode::Sink(spec) => &spec.name,
            GraphNode::Foreign { name, .. } => name,
        }
    }
}

/// A directed record flow between two named nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: GraphNode) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn connect(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push(GraphEdge {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn pattern_jobs(&self) -> impl Iterator<Item = &PatternJob> {
        self.nodes.iter().filter_map(|n| match n {
            GraphNode::Pattern(job) => Some(job),
            _ => None,
        })
    }

    pub fn sources(&self) -> impl Iterator<Item = &DataSourceSpec> {
        self.nodes.iter().filter_map(|n| match n {
            GraphNode::Source(spec) => Some(spec),
            _ => None,
        })
    }

    pub fn sinks(&self) -> impl Iterator<Item = &DataSinkSpec> {
        self.nodes.iter().filter_map(|n| match n {
            GraphNode::Sink(spec) => Some(spec),
            _ => None,
        })
    }

    /// Upstream node names of `name`, in edge declaration order. For a
    /// dual-input pattern the first entry is the left input.
    pub fn upstream(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.to == name)
            .map(|e| e.from.as_str())
            .collect()
    }

    pub fn downstream(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == name)
            .map(|e| e.to.as_str())
            .collect()
    }

    /// Check that every edge endpoint names a known node.
    pub fn validate_edges(&self) -> Result<(), ValidationError> {
        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if self.node(endpoint).is_none() {
                    return Err(ValidationError::UnknownGraphNode(endpoint.clone()));
                }
            }
        }
        Ok(())
    }

    /// Nodes in dependency order (Kahn's algorithm). Ties resolve in node
    /// declaration order, so the result is deterministic.
    pub fn topological_order(&self) -> Result<Vec<&GraphNode>, ValidationError> {
        self.validate_edges()?;

        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| self.upstream(n.name()).len())
            .collect();
        let mut ordered = Vec::with_capacity(self.nodes.len());
        let mut placed = vec![false; self.nodes.len()];

        while ordered.len() < self.nodes.len() {
            let next = match (0..self.nodes.len()).find(|&i| !placed[i] && in_degree[i] == 0) {
                Some(i) => i,
                None => {
                    let stuck = self
                        .nodes
                        .iter()
                        .zip(&placed)
                        .find(|(_, done)| !**done)
                        .map(|(n, _)| n.name().to_string())
                        .unwrap_or_default();
                    return Err(ValidationError::CyclicGraph(stuck));
                }
            };
            placed[next] = true;
            let name = self.nodes[next].name();
            for (i, node) in self.nodes.iter().enumerate() {
                if !placed[i] && self.upstream(node.name()).contains(&name) {
                    // One decrement per edge from `name` to this node.
                    let count = self
                        .edges
                        .iter()
                        .filter(|e| e.from == name && e.to == node.name())
                        .count();
                    in_degree[i] = in_degree[i].saturating_sub(count);
                }
            }
            ordered.push(&self.nodes[next]);
        }
        Ok(ordered)
    }
}
